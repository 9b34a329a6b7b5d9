//! NovaStream HLS Transcoding Session Manager — HTTP surface (spec.md §6).
//!
//! Wires the library's [`SessionManager`] to an Axum router and serves it.
//! Grounded in the teacher's `main.rs` (`hls-vod-server/src/main.rs`):
//! `tracing_subscriber` registry init, config-path-from-argv-or-default, then
//! build state, build router, bind, and `axum::serve`.

mod config;
mod error;
mod http;
mod provider;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::http::create_router;
use crate::provider::HttpStreamProvider;
use crate::state::AppState;
use novastream_core::{CommandRemuxer, SessionManager};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const APP_NAME: &str = "novastream-server";

#[tokio::main]
async fn main() {
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = ServerConfig::load_or_default(&config_path);
    tracing::info!(?config, "configuration loaded");

    let provider = Arc::new(HttpStreamProvider::new());
    let remuxer = Arc::new(CommandRemuxer::new("ffprobe", "ffmpeg"));

    let manager = match SessionManager::new(config.core.clone(), provider, None, remuxer) {
        Ok(manager) => manager,
        Err(e) => {
            tracing::error!(error = %e, "failed to start session manager");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .expect("configured host/port form a valid socket address");

    let state = Arc::new(AppState::new(manager, config));
    let app = create_router(state);

    tracing::info!(%addr, "starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {addr}: {e}"));
    axum::serve(listener, app).await.expect("server error");
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "novastream_server=info,novastream_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
