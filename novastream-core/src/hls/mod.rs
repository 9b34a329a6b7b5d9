//! HLS output handling: box parsing for seek realignment, playlist
//! rewriting, and the file-serving/GC logic (spec.md §4.7).

pub mod isobmff;
pub mod playlist;
pub mod server;

pub use isobmff::read_actual_start_offset;
pub use playlist::{rewrite_playlist, PlaylistContext};
pub use server::{mime_for, HlsServer};
