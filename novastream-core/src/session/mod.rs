//! The `Session` entity and `SessionManager` registry (spec.md §3, §4.6).

pub mod manager;
pub mod types;

pub use manager::SessionManager;
pub use types::{
    RecoveryReason, Session, SessionParams, SessionState, SessionStatus, StatusSnapshot, VideoFlags,
};
