//! Presents a unified read surface over whatever transport backs a source
//! path (spec.md §4.3). `SourceAdapter` never talks to Usenet/debrid/WebDAV
//! directly — it only calls through `StreamProvider`/`DirectUrlProvider`.

use crate::error::{NovaError, Result};
use crate::provider::{http_method::Method, DirectUrlProvider, RangeRequest, StreamProvider};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// The input form the remuxer/prober will actually be given.
#[derive(Debug, Clone)]
pub enum InputForm {
    /// A publicly reachable HTTP URL, handed straight to the remuxer's `-i`.
    DirectUrl(String),
    /// A WebDAV URL the remuxer can reach directly (the mount is local to
    /// the box running the remuxer, not this process).
    LocalWebDavUrl(String),
    /// Bytes read through `StreamProvider` and piped to the remuxer's stdin.
    RangedPipe,
}

/// Matroska cluster sync code (spec.md §4.3).
const MKV_CLUSTER_ID: [u8; 4] = [0x1F, 0x43, 0xB6, 0x75];

pub struct SourceAdapter {
    provider: Arc<dyn StreamProvider>,
    direct_url_provider: Option<Arc<dyn DirectUrlProvider>>,
    http: reqwest::Client,
}

impl SourceAdapter {
    pub fn new(
        provider: Arc<dyn StreamProvider>,
        direct_url_provider: Option<Arc<dyn DirectUrlProvider>>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("reqwest client with sane defaults");
        Self {
            provider,
            direct_url_provider,
            http,
        }
    }

    /// Choose the preferred input form for `path` (spec.md §4.3). Direct
    /// URLs are cheapest for the remuxer (native HTTP Range seeking), so
    /// they're tried first; a path that is already a reachable WebDAV URL
    /// is handed through unchanged; anything else falls back to a ranged
    /// pipe through `StreamProvider`.
    pub async fn preferred_input(&self, path: &str) -> Result<InputForm> {
        if let Some(provider) = &self.direct_url_provider {
            if let Some(url) = provider.get_direct_url(path).await? {
                return Ok(InputForm::DirectUrl(url));
            }
        }

        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(InputForm::LocalWebDavUrl(path.to_string()));
        }

        Ok(InputForm::RangedPipe)
    }

    /// Fetch the first `length` bytes of `path` so the remuxer has the
    /// element header even when the body read is ranged (spec.md §4.3,
    /// used ahead of Matroska seeks).
    pub async fn header_prefix(&self, path: &str, length: u64) -> Result<Bytes> {
        let req = RangeRequest {
            path: path.to_string(),
            method: Method::Get,
            range_header: Some(format!("bytes=0-{}", length.saturating_sub(1))),
        };
        let mut response = self.provider.stream(req).await?;

        let mut buf = BytesMut::with_capacity(length as usize);
        use futures::StreamExt;
        while let Some(chunk) = response.body.next().await {
            let chunk = chunk.map_err(|e| NovaError::Provider(e.to_string()))?;
            buf.extend_from_slice(&chunk);
            if buf.len() as u64 >= length {
                break;
            }
        }
        Ok(buf.freeze())
    }

    /// Scan `reader` forward for the next Matroska Cluster ID, buffering
    /// until found, and return a reader that starts at the cluster
    /// boundary. The remuxer cannot resync after an arbitrary byte offset
    /// inside a Matroska stream, so this is required before handing it any
    /// data for a seek (spec.md §4.3). Fails if no sync code appears within
    /// `max_scan` bytes. On multiple matches within the scan window, the
    /// lowest-offset occurrence wins (the natural result of a forward scan).
    pub async fn align_container_cluster<R>(
        mut reader: R,
        max_scan: usize,
    ) -> Result<(usize, Bytes)>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut buf = BytesMut::with_capacity(max_scan.min(1 << 20));
        let mut chunk = [0u8; 64 * 1024];

        loop {
            if let Some(offset) = find_subsequence(&buf, &MKV_CLUSTER_ID) {
                let tail = buf.split_off(offset);
                return Ok((offset, tail.freeze()));
            }
            if buf.len() >= max_scan {
                return Err(NovaError::Transient(format!(
                    "no Matroska cluster sync found within {max_scan} bytes"
                )));
            }
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|e| NovaError::Provider(e.to_string()))?;
            if n == 0 {
                return Err(NovaError::Transient(
                    "source exhausted before a cluster boundary was found".to_string(),
                ));
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Follow up to 10 redirects via `HEAD`; if `HEAD` is disallowed, fall
    /// back to `GET` with a 1-byte `Range`. Returns the resolved URL
    /// (spec.md §4.3) for the caller to cache on the session.
    pub async fn resolve_redirects(&self, url: &str) -> Result<String> {
        let head = self.http.head(url).send().await;
        match head {
            Ok(resp) if resp.status().as_u16() != 405 => Ok(resp.url().to_string()),
            _ => {
                let resp = self
                    .http
                    .get(url)
                    .header("Range", "bytes=0-0")
                    .send()
                    .await
                    .map_err(|e| NovaError::Provider(format!("redirect resolution failed: {e}")))?;
                Ok(resp.url().to_string())
            }
        }
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Loopback HTTP front for the `RangedPipe` input form (spec.md §4.3):
/// rather than writing a one-shot blob to the remuxer's stdin (which can't
/// seek), serve `StreamProvider` behind a local URL that forwards the
/// remuxer's own `Range` requests straight through. This gives the remuxer
/// the same Range-seekable surface a direct URL or WebDAV mount would,
/// without this process needing to know the remuxer's read pattern ahead of
/// time. Grounded in the same loopback-listener shape as
/// [`crate::throttle::ThrottleProxy`], sourcing from a provider instead of
/// forwarding to an upstream URL.
pub struct ProviderProxy {
    local_url: String,
    server_task: tokio::task::JoinHandle<()>,
}

struct ProviderProxyState {
    provider: Arc<dyn StreamProvider>,
    path: String,
}

impl ProviderProxy {
    pub async fn start(provider: Arc<dyn StreamProvider>, path: String) -> Result<Self> {
        let state = Arc::new(ProviderProxyState { provider, path });

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(NovaError::Io)?;
        let local_addr = listener.local_addr().map_err(NovaError::Io)?;
        let local_url = format!("http://{local_addr}/stream");

        let app = axum::Router::new()
            .route("/stream", axum::routing::any(serve_provider_range))
            .with_state(state);

        let server_task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            local_url,
            server_task,
        })
    }

    pub fn local_url(&self) -> &str {
        &self.local_url
    }

    pub fn close(self) {
        self.server_task.abort();
    }
}

async fn serve_provider_range(
    axum::extract::State(state): axum::extract::State<Arc<ProviderProxyState>>,
    headers: axum::http::HeaderMap,
) -> axum::response::Response {
    use axum::response::IntoResponse;

    let range_header = headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let req = RangeRequest {
        path: state.path.clone(),
        method: Method::Get,
        range_header,
    };

    match state.provider.stream(req).await {
        Ok(resp) => {
            let status = axum::http::StatusCode::from_u16(resp.status)
                .unwrap_or(axum::http::StatusCode::OK);
            let mut response_headers = axum::http::HeaderMap::new();
            for (name, value) in &resp.headers {
                if let (Ok(name), Ok(value)) = (
                    axum::http::HeaderName::from_bytes(name.as_bytes()),
                    axum::http::HeaderValue::from_str(value),
                ) {
                    response_headers.insert(name, value);
                }
            }
            let mut out =
                axum::response::Response::new(axum::body::Body::from_stream(resp.body));
            *out.status_mut() = status;
            *out.headers_mut() = response_headers;
            out
        }
        Err(e) => {
            (axum::http::StatusCode::BAD_GATEWAY, format!("provider error: {e}")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn align_container_cluster_finds_sync_code() {
        let mut data = vec![0u8; 10];
        data.extend_from_slice(&MKV_CLUSTER_ID);
        data.extend_from_slice(b"payload");
        let (offset, tail) = SourceAdapter::align_container_cluster(Cursor::new(data), 1024)
            .await
            .unwrap();
        assert_eq!(offset, 10);
        assert!(tail.starts_with(&MKV_CLUSTER_ID));
    }

    #[tokio::test]
    async fn align_container_cluster_fails_when_absent() {
        let data = vec![0u8; 64];
        let result = SourceAdapter::align_container_cluster(Cursor::new(data), 32).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn align_container_cluster_picks_lowest_offset_match() {
        let mut data = vec![0u8; 5];
        data.extend_from_slice(&MKV_CLUSTER_ID);
        data.extend_from_slice(&[1, 2, 3]);
        data.extend_from_slice(&MKV_CLUSTER_ID);
        let (offset, _) = SourceAdapter::align_container_cluster(Cursor::new(data), 1024)
            .await
            .unwrap();
        assert_eq!(offset, 5);
    }
}
