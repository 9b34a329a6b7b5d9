//! Default `StreamProvider`/`DirectUrlProvider` pair for running this binary
//! standalone: `path` is treated as an HTTP(S) URL and forwarded through
//! directly (spec.md §6's provider contract is explicitly out of scope to
//! implement for Usenet/debrid/WebDAV — this is the ambient stand-in needed
//! to make `novastream-server` runnable, not a production adapter).
//!
//! Grounded in `novastream_core::source::SourceAdapter`'s own `reqwest`
//! client usage, reusing the same range-forwarding shape the `ThrottleProxy`
//! already applies to an upstream URL.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use novastream_core::provider::http_method::Method;
use novastream_core::{NovaError, ProviderResponse, RangeRequest, Result, StreamProvider};

pub struct HttpStreamProvider {
    http: reqwest::Client,
}

impl HttpStreamProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .expect("reqwest client with sane defaults"),
        }
    }
}

impl Default for HttpStreamProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamProvider for HttpStreamProvider {
    async fn stream(&self, req: RangeRequest) -> Result<ProviderResponse> {
        let mut builder = match req.method {
            Method::Get => self.http.get(&req.path),
            Method::Head => self.http.head(&req.path),
        };
        if let Some(range) = &req.range_header {
            builder = builder.header(reqwest::header::RANGE, range.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NovaError::Provider(format!("upstream request failed: {e}")))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(ProviderResponse {
            status,
            content_length,
            headers,
            body,
        })
    }
}
