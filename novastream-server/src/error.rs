//! HTTP-facing error mapping (spec.md §7): translates the core's
//! [`NovaError`] taxonomy into status codes, without ever surfacing an
//! internal failure class the client has no use for.
//!
//! Grounded in the teacher's `HttpError` (`hls-vod-server/src/http/handlers.rs`):
//! a small enum implementing `IntoResponse`, with a `From<LibraryError>` impl
//! doing the kind-to-status translation in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use novastream_core::NovaError;

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    PlaylistTimeout,
    SegmentTimeout,
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            // spec.md §7: "Timeout ... 504 for playlist, 404 for segment."
            HttpError::PlaylistTimeout => {
                (StatusCode::GATEWAY_TIMEOUT, "playlist not ready".to_string())
            }
            HttpError::SegmentTimeout => (StatusCode::NOT_FOUND, "segment not ready".to_string()),
            HttpError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, message).into_response()
    }
}

impl From<NovaError> for HttpError {
    fn from(err: NovaError) -> Self {
        match err {
            NovaError::BadRequest(m) => HttpError::BadRequest(m),
            NovaError::NotFound(m) => HttpError::NotFound(m),
            // Routes that need the segment-vs-playlist distinction map
            // `NovaError::Timeout` explicitly before this conversion runs;
            // anything that falls through here is a playlist-shaped wait.
            NovaError::Timeout(_) => HttpError::PlaylistTimeout,
            NovaError::Transient(m) => HttpError::Internal(m),
            NovaError::CapabilityDowngrade(m) => HttpError::Internal(m),
            NovaError::Fatal(m) => HttpError::Internal(m),
            NovaError::ProbeFailed(m) => HttpError::Internal(m),
            NovaError::Provider(m) => HttpError::Internal(m),
            NovaError::Config(m) => HttpError::Internal(m),
            NovaError::Io(e) => HttpError::Internal(e.to_string()),
        }
    }
}

/// Route-specific override for `NovaError::Timeout` on the segment/subtitle
/// paths, where the spec wants 404 instead of the playlist route's 504.
pub fn as_segment_error(err: NovaError) -> HttpError {
    match err {
        NovaError::Timeout(_) => HttpError::SegmentTimeout,
        other => other.into(),
    }
}
