//! Application state shared across handlers (spec.md §4.6/§9): a thin
//! wrapper around the core's [`SessionManager`], mirroring the teacher's
//! `AppState` (`hls-vod-server/src/state.rs`) without duplicating anything
//! the manager already owns (registry, janitor, probe cache).

use crate::config::ServerConfig;
use novastream_core::SessionManager;
use std::sync::Arc;

pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, config: ServerConfig) -> Self {
        Self { manager, config }
    }
}
