//! Error taxonomy for the HLS transcoding session manager.
//!
//! Kinds map directly onto the propagation policy in the spec: the pipeline
//! recovers transient/capability-downgrade errors locally, and only
//! `BadRequest`/`NotFound`/`Timeout`/`Fatal` ever reach an HTTP caller.

use thiserror::Error;

/// Main error type for the core crate.
#[derive(Error, Debug)]
pub enum NovaError {
    /// Invalid path, malformed segment name, missing parameters, negative seek.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unknown session ID or missing subtitle track.
    #[error("not found: {0}")]
    NotFound(String),

    /// Playlist or segment did not materialize within budget.
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// Transient input failure, recoverable by restarting the pipeline.
    #[error("transient input failure: {0}")]
    Transient(String),

    /// DV/HDR metadata filter failure, recoverable by disabling the feature.
    #[error("capability downgrade: {0}")]
    CapabilityDowngrade(String),

    /// Repeated bitstream filter errors; not recoverable.
    #[error("fatal stream error: {0}")]
    Fatal(String),

    /// Probe could not extract metadata from the source.
    #[error("probe failed: {0}")]
    ProbeFailed(String),

    /// Error surfaced by a `StreamProvider` implementation.
    #[error("provider error: {0}")]
    Provider(String),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or applied.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, NovaError>;
