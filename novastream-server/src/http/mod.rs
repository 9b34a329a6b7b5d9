//! HTTP server module: Axum router and the spec.md §6 route handlers.

pub mod dto;
pub mod handlers;

use axum::http::{header, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router for the seven routes of spec.md §6 plus the
/// `/healthz` and `/version` ambient-ops routes.
///
/// Grounded in the teacher's `create_router`
/// (`hls-server/src/http/routes.rs`): `CorsLayer::new().allow_origin(Any)`
/// plus `TraceLayer`, applied uniformly since the playlist/segment/subtitle
/// routes are the ones a browser-embedded player actually calls cross-origin.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::RANGE, header::CONTENT_TYPE, header::ORIGIN])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/version", get(handlers::version_check))
        .route("/hls/sessions", post(handlers::create_session))
        .route("/hls/{id}/stream.m3u8", get(handlers::get_playlist))
        .route("/hls/{id}/subtitles", get(handlers::get_subtitles))
        .route("/hls/{id}/keepalive", post(handlers::keep_alive))
        .route("/hls/{id}/seek", post(handlers::seek))
        .route("/hls/{id}/status", get(handlers::status))
        .route("/hls/{id}", delete(handlers::cleanup))
        .route("/hls/{id}/{segment}", get(handlers::get_segment))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use novastream_core::{NovaError, ProviderResponse, RangeRequest, Result, SessionManager};
    use async_trait::async_trait;

    struct UnusedProvider;

    #[async_trait]
    impl novastream_core::StreamProvider for UnusedProvider {
        async fn stream(&self, _req: RangeRequest) -> Result<ProviderResponse> {
            Err(NovaError::Provider("not used in router tests".to_string()))
        }
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = novastream_core::NovaConfig::default();
        config.base_dir = dir.path().to_string_lossy().into_owned();
        let manager = SessionManager::new(
            config,
            Arc::new(UnusedProvider),
            None,
            Arc::new(novastream_core::CommandRemuxer::new("true", "true")),
        )
        .unwrap();

        let state = Arc::new(AppState::new(manager, ServerConfig::default()));
        let _router = create_router(state);
    }
}
