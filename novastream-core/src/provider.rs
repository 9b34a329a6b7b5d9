//! External collaborator contracts (spec.md §6).
//!
//! The Usenet article assembler, debrid client, and WebDAV server are
//! explicitly out of scope for this core; they're represented only by these
//! two traits. Production callers implement `StreamProvider` against
//! whatever transport they have; `novastream-core` only ever consumes it.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// A single HTTP-shaped byte range request against a virtual path.
#[derive(Debug, Clone)]
pub struct RangeRequest {
    pub path: String,
    pub method: http_method::Method,
    /// Raw `Range:` header value, e.g. `bytes=1048576-`.
    pub range_header: Option<String>,
}

/// Minimal HTTP method enum so the trait doesn't need a full HTTP crate dependency.
pub mod http_method {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Method {
        Get,
        Head,
    }
}

/// A range-capable byte stream response from a `StreamProvider`.
pub struct ProviderResponse {
    pub status: u16,
    pub content_length: Option<u64>,
    pub headers: Vec<(String, String)>,
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

/// Consumed from the surrounding system: resolves a virtual path to a
/// range-capable byte stream. Implementations back this with a Usenet
/// article assembler, a debrid CDN client, or a WebDAV client — all out of
/// scope here.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    async fn stream(&self, req: RangeRequest) -> crate::error::Result<ProviderResponse>;
}

/// Optional: yields a publicly reachable HTTP URL for a virtual path, letting
/// `SourceAdapter` hand the remuxer a direct URL instead of piping bytes
/// through this process.
#[async_trait]
pub trait DirectUrlProvider: Send + Sync {
    async fn get_direct_url(&self, path: &str) -> crate::error::Result<Option<String>>;
}
