//! The `Session` entity (spec.md §3): one per active playback, mutated only
//! through [`super::manager::SessionManager`] methods or by the pipeline task
//! it owns.
//!
//! Grounded in `hls-vod-lib/src/types.rs`'s `StreamIndex`: a handful of
//! atomics for fields touched from multiple tasks without needing the full
//! session lock (`last_access`), with the bulk of the mutable state behind
//! one `parking_lot::RwLock` per spec.md §5's "reader-writer lock protecting
//! its fields."

use crate::probe::ProbeResult;
use crate::throttle::BufferState;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Coarse lifecycle state, surfaced by `/status` (spec.md §6) as the
/// lowercase `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Starting,
    Running,
    Restarting,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Restarting => "restarting",
            SessionStatus::Completed => "completed",
            // spec.md §8 scenario 5: a fatal session reports status "error".
            SessionStatus::Failed => "error",
        }
    }
}

/// Why a pipeline is being restarted (spec.md §4.5's state machine). Attached
/// to logs and to `Session::fatal_error` context so failures are diagnosable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    DvError,
    HdrMetadataError,
    InputError,
    IncompleteOutput,
    Seek,
}

impl RecoveryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryReason::DvError => "dv_error",
            RecoveryReason::HdrMetadataError => "hdr_metadata_error",
            RecoveryReason::InputError => "input_error",
            RecoveryReason::IncompleteOutput => "incomplete_output",
            RecoveryReason::Seek => "seek",
        }
    }
}

/// Capability downgrades learned from prior pipeline failures (spec.md §3).
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoFlags {
    pub has_dv: bool,
    pub dv_profile: u8,
    pub dv_disabled: bool,
    pub has_hdr: bool,
    pub hdr_metadata_disabled: bool,
}

/// Validated, normalized form of a `POST /hls/sessions` request body
/// (spec.md §6). Constructing a `Session` always goes through this type.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub path: String,
    pub original_path: String,
    pub start_offset: f64,
    pub audio_track_index: i32,
    pub subtitle_track_index: i32,
    pub force_aac: bool,
    pub has_dv: bool,
    pub dv_profile: u8,
    pub has_hdr: bool,
}

/// Fields mutated under the session's single reader-writer lock (spec.md
/// §5's "Each Session has a reader-writer lock protecting its fields").
pub struct SessionState {
    pub last_access: Instant,
    pub last_segment_request: Option<Instant>,
    pub first_segment_time: Option<Instant>,
    pub stream_start_time: Option<Instant>,

    pub duration: f64,
    pub start_offset: f64,
    pub transcoding_offset: f64,
    pub actual_start_offset: f64,

    pub video_flags: VideoFlags,
    pub audio_track_index: i32,
    pub subtitle_track_index: i32,
    pub force_aac: bool,

    pub min_segment_requested: i64,
    pub max_segment_requested: i64,
    pub last_segment_served: i64,
    pub min_segment_available: i64,
    pub last_playback_segment: i64,
    pub earliest_buffered_segment: i64,

    pub input_error_detected: bool,
    pub recovery_attempts: u32,
    pub bitstream_errors: u32,
    pub fatal_error: Option<String>,
    pub seek_in_progress: bool,
    pub idle_timeout_triggered: bool,

    pub status: SessionStatus,
    pub resolved_url: Option<String>,
    pub probe: Option<Arc<ProbeResult>>,
}

/// Central playback entity (spec.md §3).
pub struct Session {
    pub id: Uuid,
    pub source_path: String,
    pub original_path: String,
    pub output_dir: PathBuf,
    pub created_at: Instant,

    state: RwLock<SessionState>,
    /// Cheap lock-free counter for idle checks so the 5 s idle-enforcement
    /// tick (spec.md §4.6) doesn't need the full session lock.
    last_access_unix: AtomicU64,
    /// Shared so a `ThrottleProxy` started before the session exists (the
    /// `SessionManager::resolve_form`/`PreSessionBuffer` path for a direct-URL
    /// source, spec.md §4.4) can observe the same counter this session
    /// updates from segment requests and keepalives.
    max_segment_requested: Arc<AtomicI64>,
}

impl Session {
    /// `id`'s string form names `output_dir`, so the caller mints it first
    /// rather than this constructor generating one internally.
    pub fn new(id: Uuid, params: &SessionParams, output_dir: PathBuf) -> Self {
        Self::with_shared_counter(id, params, output_dir, Arc::new(AtomicI64::new(-1)))
    }

    /// Like [`Session::new`], but reuses a counter a `ThrottleProxy` was
    /// already started against before this session was constructed.
    pub fn with_shared_counter(
        id: Uuid,
        params: &SessionParams,
        output_dir: PathBuf,
        max_segment_requested: Arc<AtomicI64>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            source_path: params.path.clone(),
            original_path: params.original_path.clone(),
            output_dir,
            created_at: now,
            state: RwLock::new(SessionState {
                last_access: now,
                last_segment_request: None,
                first_segment_time: None,
                stream_start_time: None,
                duration: 0.0,
                start_offset: params.start_offset,
                transcoding_offset: params.start_offset,
                actual_start_offset: params.start_offset,
                video_flags: VideoFlags {
                    has_dv: params.has_dv,
                    dv_profile: params.dv_profile,
                    dv_disabled: false,
                    has_hdr: params.has_hdr,
                    hdr_metadata_disabled: false,
                },
                audio_track_index: params.audio_track_index,
                subtitle_track_index: params.subtitle_track_index,
                force_aac: params.force_aac,
                min_segment_requested: -1,
                max_segment_requested: -1,
                last_segment_served: -1,
                min_segment_available: -1,
                last_playback_segment: -1,
                earliest_buffered_segment: -1,
                input_error_detected: false,
                recovery_attempts: 0,
                bitstream_errors: 0,
                fatal_error: None,
                seek_in_progress: false,
                idle_timeout_triggered: false,
                status: SessionStatus::Starting,
                resolved_url: None,
                probe: None,
            }),
            last_access_unix: AtomicU64::new(unix_now()),
            max_segment_requested,
        }
    }

    pub fn touch(&self) {
        self.state.write().last_access = Instant::now();
        self.last_access_unix.store(unix_now(), Ordering::Relaxed);
    }

    pub fn time_since_last_access(&self) -> Duration {
        let last = self.last_access_unix.load(Ordering::Relaxed);
        let now = unix_now();
        Duration::from_secs(now.saturating_sub(last))
    }

    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, SessionState> {
        self.state.read()
    }

    pub fn write(&self) -> parking_lot::RwLockWriteGuard<'_, SessionState> {
        self.state.write()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.read().status
    }

    pub fn set_status(&self, status: SessionStatus) {
        self.state.write().status = status;
    }

    pub fn is_fatal(&self) -> bool {
        self.state.read().fatal_error.is_some()
    }

    /// Record a segment request, updating `max_segment_requested` both under
    /// the session lock and in the lock-free atomic `ThrottleProxy` reads.
    pub fn record_segment_request(&self, sequence: i64) {
        let mut state = self.state.write();
        if state.min_segment_requested < 0 || sequence < state.min_segment_requested {
            state.min_segment_requested = sequence;
        }
        if sequence > state.max_segment_requested {
            state.max_segment_requested = sequence;
            self.max_segment_requested.store(sequence, Ordering::Relaxed);
        }
        state.last_segment_served = sequence.max(state.last_segment_served);
        state.last_segment_request = Some(Instant::now());
        if state.first_segment_time.is_none() {
            state.first_segment_time = Some(Instant::now());
        }
        drop(state);
        self.touch();
    }

    /// Highest `segmentN.m4s` currently present on disk (spec.md §4.4/§4.7).
    pub fn highest_segment_on_disk(&self) -> i64 {
        highest_segment_in_dir(&self.output_dir)
    }

    /// Apply a `KeepAlive` report (spec.md §4.6): `playback_segment` and
    /// `buffer_start_segment` are already translated from media time to HLS
    /// segment numbers by the caller. `MaxSegmentRequested` never decreases.
    pub fn apply_keep_alive(&self, playback_segment: Option<i64>, buffer_start_segment: Option<i64>) {
        let mut state = self.state.write();
        if let Some(p) = playback_segment {
            state.last_playback_segment = p;
            if p > state.max_segment_requested {
                state.max_segment_requested = p;
                self.max_segment_requested.store(p, Ordering::Relaxed);
            }
        }
        if let Some(b) = buffer_start_segment {
            state.earliest_buffered_segment = b;
        }
        drop(state);
        self.touch();
    }

    /// Snapshot for `GET /hls/{id}/status` (spec.md §6).
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let segments_created = (self.highest_segment_on_disk() + 1).max(0) as u64;
        let state = self.state.read();
        StatusSnapshot {
            status: state.status.as_str(),
            fatal_error: state.fatal_error.clone(),
            duration: state.duration,
            segments_created,
            max_segment_requested: state.max_segment_requested,
            paused: state.idle_timeout_triggered,
            bitstream_errors: state.bitstream_errors,
            hdr_metadata_disabled: state.video_flags.hdr_metadata_disabled,
            dv_disabled: state.video_flags.dv_disabled,
            recovery_attempts: state.recovery_attempts,
        }
    }
}

/// Read-only rendering of session state for the status endpoint.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub fatal_error: Option<String>,
    pub duration: f64,
    pub segments_created: u64,
    pub max_segment_requested: i64,
    pub paused: bool,
    pub bitstream_errors: u32,
    pub hdr_metadata_disabled: bool,
    pub dv_disabled: bool,
    pub recovery_attempts: u32,
}

impl BufferState for Session {
    fn max_segment_requested(&self) -> i64 {
        self.max_segment_requested.load(Ordering::Relaxed)
    }

    fn highest_existing_segment(&self) -> i64 {
        self.highest_segment_on_disk()
    }
}

/// Scan `dir` for the highest `segmentN.m4s`, returning `-1` if none exist
/// or the directory can't be read.
pub fn highest_segment_in_dir(dir: &std::path::Path) -> i64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return -1;
    };
    let mut highest = -1i64;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("segment") {
            if let Some(n) = rest.strip_suffix(".m4s") {
                if let Ok(n) = n.parse::<i64>() {
                    highest = highest.max(n);
                }
            }
        }
    }
    highest
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_session() -> Session {
        let params = SessionParams {
            path: "/movies/a.mkv".into(),
            original_path: "/movies/a.mkv".into(),
            start_offset: 0.0,
            audio_track_index: -1,
            subtitle_track_index: -1,
            force_aac: false,
            has_dv: false,
            dv_profile: 0,
            has_hdr: false,
        };
        Session::new(
            Uuid::new_v4(),
            &params,
            PathBuf::from("/tmp/nonexistent-novastream-test"),
        )
    }

    #[test]
    fn keepalive_never_decreases_max_segment_requested() {
        let session = fresh_session();
        session.record_segment_request(10);
        session.record_segment_request(3);
        assert_eq!(session.read().max_segment_requested, 10);
    }

    #[test]
    fn highest_segment_in_dir_handles_missing_directory() {
        assert_eq!(highest_segment_in_dir(std::path::Path::new("/no/such/dir")), -1);
    }

    #[test]
    fn buffer_state_reads_max_segment_requested_without_locking() {
        let session = fresh_session();
        session.record_segment_request(7);
        assert_eq!(BufferState::max_segment_requested(&session), 7);
    }
}
