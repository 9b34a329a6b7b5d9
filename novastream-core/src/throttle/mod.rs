//! Local HTTP proxy that sits between the remuxer and a direct-HTTP source
//! so the remuxer can issue Range requests while this process controls
//! download speed (spec.md §4.4).

use crate::config::ThrottleConfig;
use crate::error::{NovaError, Result};
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use base64::Engine;
use bytes::Bytes;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;
use url::Url;

/// Anything that can report the two numbers the throttle algorithm needs.
/// Implemented by `session::Session` — kept as a trait here so this module
/// doesn't depend on the session module (dependency runs the other way:
/// `TranscodePipeline` wires a `ThrottleProxy` using a session as the
/// `BufferState`).
pub trait BufferState: Send + Sync {
    /// `MaxSegmentRequested`, or `-1` if the player hasn't reported one yet.
    fn max_segment_requested(&self) -> i64;
    /// The highest segment sequence number currently present on disk, or
    /// `-1` if none has been written yet.
    fn highest_existing_segment(&self) -> i64;
}

struct ProxyState {
    target: Url,
    http: reqwest::Client,
    buffer: Arc<dyn BufferState>,
    config: ThrottleConfig,
    current_delay_ms: AtomicU64,
    last_log_millis: AtomicI64,
    started_at: Instant,
}

/// A running loopback proxy instance. Dropping/`close`ing it stops the
/// listener and the throttle-decision tick task.
pub struct ThrottleProxy {
    local_url: String,
    server_task: tokio::task::JoinHandle<()>,
    tick_task: tokio::task::JoinHandle<()>,
}

impl ThrottleProxy {
    /// Start listening on an ephemeral loopback port and begin ticking
    /// throttle decisions for `target` against `buffer`. Returns the local
    /// URL the remuxer should read from instead of `target` directly.
    pub async fn start(
        target_url: &str,
        buffer: Arc<dyn BufferState>,
        config: ThrottleConfig,
    ) -> Result<Self> {
        let target = Url::parse(target_url)
            .map_err(|e| NovaError::Config(format!("invalid throttle target URL: {e}")))?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| NovaError::Config(e.to_string()))?;

        let state = Arc::new(ProxyState {
            target,
            http,
            buffer,
            config: config.clone(),
            current_delay_ms: AtomicU64::new(0),
            last_log_millis: AtomicI64::new(i64::MIN),
            started_at: Instant::now(),
        });

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(NovaError::Io)?;
        let local_addr = listener.local_addr().map_err(NovaError::Io)?;
        let local_url = format!("http://{local_addr}");

        let app = Router::new()
            .route("/{*path}", any(forward))
            .route("/", any(forward))
            .with_state(state.clone());

        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let tick_state = state.clone();
        let tick_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_state.config.tick_interval);
            loop {
                interval.tick().await;
                tick_state.recompute_delay();
            }
        });

        Ok(Self {
            local_url,
            server_task,
            tick_task,
        })
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    pub fn close(self) {
        self.server_task.abort();
        self.tick_task.abort();
    }
}

impl ProxyState {
    /// Throttle algorithm (spec.md §4.4): once the remuxer is more than `T`
    /// segments ahead of what's been requested, impose a growing delay on
    /// upstream reads, capped at `max_delay_ms`.
    fn recompute_delay(&self) {
        let requested = self.buffer.max_segment_requested();
        let highest = self.buffer.highest_existing_segment();
        let threshold = self.config.buffer_ahead_threshold;

        let delay_ms = if requested >= 0 && highest - requested > threshold {
            let buffer_ahead = highest - requested;
            let over = (buffer_ahead - threshold) as u64;
            (self.config.base_delay_ms + self.config.per_segment_delay_ms * over)
                .min(self.config.max_delay_ms)
        } else {
            0
        };

        self.current_delay_ms.store(delay_ms, Ordering::Relaxed);

        if delay_ms > 0 {
            self.maybe_log(delay_ms, highest - requested.max(0));
        }
    }

    fn maybe_log(&self, delay_ms: u64, buffer_ahead: i64) {
        let now_ms = self.started_at.elapsed().as_millis() as i64;
        let last = self.last_log_millis.load(Ordering::Relaxed);
        let log_interval_ms = self.config.log_interval.as_millis() as i64;
        if last == i64::MIN || now_ms - last >= log_interval_ms {
            self.last_log_millis.store(now_ms, Ordering::Relaxed);
            tracing::info!(delay_ms, buffer_ahead, "throttling upstream reads");
        }
    }

    fn basic_auth_header(&self) -> Option<HeaderValue> {
        let user = self.target.username();
        if user.is_empty() {
            return None;
        }
        let pass = self.target.password().unwrap_or("");
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).ok()
    }
}

async fn forward(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    req: axum::extract::Request,
) -> Response {
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let mut target = state.target.clone();
    // Upstream path/query is whatever the remuxer asked for on the proxy;
    // the target URL's own path is authoritative for *which* resource.
    if !path_and_query.is_empty() && path_and_query != "/" {
        target.set_query(
            Url::parse(&format!("http://x{path_and_query}"))
                .ok()
                .and_then(|u| u.query().map(str::to_string))
                .as_deref(),
        );
    }

    let mut builder = state.http.get(target);
    if let Some(range) = headers.get(axum::http::header::RANGE) {
        builder = builder.header(axum::http::header::RANGE, range);
    }
    if let Some(auth) = state.basic_auth_header() {
        builder = builder.header(axum::http::header::AUTHORIZATION, auth);
    }

    let upstream = match builder.send().await {
        Ok(resp) => resp,
        Err(e) => {
            return (StatusCode::BAD_GATEWAY, format!("upstream error: {e}")).into_response()
        }
    };

    let status = upstream.status();
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers().iter() {
        response_headers.insert(name.clone(), value.clone());
    }

    let delay_ms = Arc::new(AtomicU64::new(state.current_delay_ms.load(Ordering::Relaxed)));
    let state_for_stream = state.clone();
    let stream = async_stream_body(upstream, state_for_stream, delay_ms);

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
    *response.headers_mut() = response_headers;
    response
}

/// Wrap the upstream body in a rate-limiting reader: before yielding each
/// chunk, sleep for whatever delay the last throttle tick computed.
fn async_stream_body(
    upstream: reqwest::Response,
    state: Arc<ProxyState>,
    _delay_ms: Arc<AtomicU64>,
) -> impl futures::Stream<Item = std::result::Result<Bytes, std::io::Error>> {
    use futures::StreamExt;

    let byte_stream = upstream.bytes_stream();
    let throttle = Arc::new(AsyncMutex::new(()));

    byte_stream.then(move |chunk| {
        let state = state.clone();
        let throttle = throttle.clone();
        async move {
            let _guard = throttle.lock().await;
            let delay_ms = state.current_delay_ms.load(Ordering::Relaxed);
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            chunk.map_err(std::io::Error::other)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeBuffer {
        requested: i64,
        highest: i64,
    }

    impl BufferState for FakeBuffer {
        fn max_segment_requested(&self) -> i64 {
            self.requested
        }
        fn highest_existing_segment(&self) -> i64 {
            self.highest
        }
    }

    #[test]
    fn delay_formula_matches_spec_example() {
        let config = ThrottleConfig::default();
        let state = ProxyState {
            target: Url::parse("http://example.com/x").unwrap(),
            http: reqwest::Client::new(),
            buffer: Arc::new(FakeBuffer {
                requested: 5,
                highest: 22,
            }),
            config: config.clone(),
            current_delay_ms: AtomicU64::new(0),
            last_log_millis: AtomicI64::new(i64::MIN),
            started_at: Instant::now(),
        };
        state.recompute_delay();
        // requested=5, highest=22: buffer_ahead=17, over=17-15=2 => 500+200=700ms
        assert_eq!(state.current_delay_ms.load(Ordering::Relaxed), 700);
    }

    #[test]
    fn delay_is_capped_far_below_upstream_timeouts() {
        let config = ThrottleConfig::default();
        let state = ProxyState {
            target: Url::parse("http://example.com/x").unwrap(),
            http: reqwest::Client::new(),
            buffer: Arc::new(FakeBuffer {
                requested: 0,
                highest: 10_000,
            }),
            config: config.clone(),
            current_delay_ms: AtomicU64::new(0),
            last_log_millis: AtomicI64::new(i64::MIN),
            started_at: Instant::now(),
        };
        state.recompute_delay();
        assert_eq!(state.current_delay_ms.load(Ordering::Relaxed), config.max_delay_ms);
    }

    #[test]
    fn no_delay_when_requested_is_unknown() {
        let config = ThrottleConfig::default();
        let state = ProxyState {
            target: Url::parse("http://example.com/x").unwrap(),
            http: reqwest::Client::new(),
            buffer: Arc::new(FakeBuffer {
                requested: -1,
                highest: 9000,
            }),
            config,
            current_delay_ms: AtomicU64::new(0),
            last_log_millis: AtomicI64::new(i64::MIN),
            started_at: Instant::now(),
        };
        state.recompute_delay();
        assert_eq!(state.current_delay_ms.load(Ordering::Relaxed), 0);
    }
}
