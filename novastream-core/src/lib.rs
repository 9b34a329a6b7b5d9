//! NovaStream HLS Transcoding Session Manager (spec.md §1–§9).
//!
//! The seven components of spec.md §2, leaves first: [`probe::ProbeCache`],
//! [`probe::Prober`], [`source::SourceAdapter`], [`throttle::ThrottleProxy`],
//! [`transcode::TranscodePipeline`], [`session::SessionManager`], and
//! [`hls::HlsServer`]. `provider` and `remuxer` hold the two external
//! collaborator contracts (spec.md §6) this crate only ever consumes.

pub mod config;
pub mod error;
pub mod hls;
pub mod probe;
pub mod provider;
pub mod remuxer;
pub mod session;
pub mod source;
pub mod subtitle;
pub mod throttle;
pub mod transcode;

pub use config::NovaConfig;
pub use error::{NovaError, Result};
pub use provider::{DirectUrlProvider, ProviderResponse, RangeRequest, StreamProvider};
pub use remuxer::{CommandRemuxer, Remuxer};
pub use session::{Session, SessionManager, SessionParams, SessionStatus};
