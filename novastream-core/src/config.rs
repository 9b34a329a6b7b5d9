//! Tunables for the session manager and pipeline.
//!
//! Grounded in the teacher's `ServerConfig`/`CacheConfig` split
//! (`hls-vod-server/src/config.rs`): one small `Default`-able struct per
//! concern, loaded from an optional TOML file and otherwise safe to use
//! as-is.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for `novastream-core`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovaConfig {
    /// Path to the external remuxer binary (e.g. `ffmpeg`).
    pub remuxer_path: String,
    /// Path to the external prober binary (e.g. `ffprobe`).
    pub prober_path: String,
    /// Base directory under which per-session scratch directories are created.
    pub base_dir: String,
    pub probe: ProbeConfig,
    pub throttle: ThrottleConfig,
    pub recovery: RecoveryConfig,
    pub hls: HlsConfig,
    pub timeouts: TimeoutConfig,
}

impl Default for NovaConfig {
    fn default() -> Self {
        Self {
            remuxer_path: "ffmpeg".to_string(),
            prober_path: "ffprobe".to_string(),
            base_dir: "/tmp/novastream".to_string(),
            probe: ProbeConfig::default(),
            throttle: ThrottleConfig::default(),
            recovery: RecoveryConfig::default(),
            hls: HlsConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// Probe cache and probe invocation tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// TTL for cached probe results, in seconds.
    pub cache_ttl_secs: u64,
    /// `-probesize` passed to the remuxer for fast probing.
    pub probesize_bytes: u64,
    /// `-analyzeduration` passed to the remuxer, in microseconds.
    pub analyzeduration_micros: u64,
    /// How much of the file to pull over a ranged pipe for probing.
    pub ranged_pipe_bytes: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 2 * 60 * 60,
            probesize_bytes: 1024 * 1024,
            analyzeduration_micros: 500_000,
            ranged_pipe_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Throttling thresholds for `ThrottleProxy` (spec.md §4.4, Open Question (b)).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Segments of buffer-ahead tolerated before throttling kicks in.
    pub buffer_ahead_threshold: i64,
    pub base_delay_ms: u64,
    pub per_segment_delay_ms: u64,
    pub max_delay_ms: u64,
    pub tick_interval: Duration,
    pub log_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            buffer_ahead_threshold: 15,
            base_delay_ms: 500,
            per_segment_delay_ms: 100,
            max_delay_ms: 15_000,
            tick_interval: Duration::from_secs(2),
            log_interval: Duration::from_secs(10),
        }
    }
}

/// Recovery bounds for the pipeline state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    pub dv_error_threshold: u32,
    pub hdr_error_threshold: u32,
    pub bitstream_error_threshold: u32,
    /// Fraction of expected segments that counts as a "complete" run (spec.md §4.5).
    pub completion_fraction: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            dv_error_threshold: 3,
            hdr_error_threshold: 3,
            bitstream_error_threshold: 3,
            completion_fraction: 0.95,
        }
    }
}

/// HLS packaging parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsConfig {
    pub segment_duration_secs: f64,
    /// Segments to keep behind the safe GC point (spec.md §4.7).
    pub gc_keep_behind: i64,
    /// Input-seek vs output-seek crossover, in seconds (spec.md §4.5).
    pub output_seek_threshold_secs: f64,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: 2.0,
            gc_keep_behind: 5,
            output_seek_threshold_secs: 30.0,
        }
    }
}

/// Wait budgets for client-facing operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub playlist_wait: Duration,
    pub segment_wait: Duration,
    pub seek_wait: Duration,
    /// No segment request within this long of session creation/last request => idle.
    pub idle_timeout: Duration,
    pub idle_check_interval: Duration,
    pub janitor_interval: Duration,
    pub session_max_age: Duration,
    pub completed_session_grace: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            playlist_wait: Duration::from_secs(60),
            segment_wait: Duration::from_secs(30),
            seek_wait: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            idle_check_interval: Duration::from_secs(5),
            janitor_interval: Duration::from_secs(30),
            session_max_age: Duration::from_secs(30 * 60),
            completed_session_grace: Duration::from_secs(5 * 60),
        }
    }
}

/// Load configuration from a TOML file, falling back to defaults on any error.
///
/// Grounded in `hls-vod-server/src/config_file.rs`'s `ConfigFile::from_file`,
/// simplified to a single flat struct since novastream-core has no
/// milestone-specific config sections to stage.
pub fn load_or_default(path: &str) -> NovaConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("failed to parse config file {}: {}. Using defaults.", path, e);
                NovaConfig::default()
            }
        },
        Err(_) => NovaConfig::default(),
    }
}
