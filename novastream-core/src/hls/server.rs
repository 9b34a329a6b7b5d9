//! `HLSServer` (spec.md §4.7): serves playlists/segments/subtitles out of a
//! session's scratch directory, blocking briefly for files the pipeline
//! hasn't produced yet, and garbage-collects consumed segments.

use super::playlist::{rewrite_playlist, PlaylistContext};
use crate::config::{HlsConfig, TimeoutConfig};
use crate::error::{NovaError, Result};
use crate::session::Session;
use bytes::Bytes;
use std::path::Path;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct HlsServer {
    timeouts: TimeoutConfig,
    hls: HlsConfig,
}

impl HlsServer {
    pub fn new(timeouts: TimeoutConfig, hls: HlsConfig) -> Self {
        Self { timeouts, hls }
    }

    /// Serve the rewritten playlist (spec.md §4.7). Blocks up to
    /// `playlist_wait` for `stream.m3u8` to appear.
    pub async fn serve_playlist(&self, session: &Session, token: &str) -> Result<String> {
        let path = session.output_dir.join("stream.m3u8");
        let bytes = poll_for_file(&path, self.timeouts.playlist_wait).await?;
        let raw = String::from_utf8_lossy(&bytes).into_owned();

        let state = session.read();
        let ctx = PlaylistContext {
            has_dv: state.video_flags.has_dv && !state.video_flags.dv_disabled,
            has_hdr: state.video_flags.has_hdr && !state.video_flags.hdr_metadata_disabled,
            start_offset: state.start_offset,
            duration: state.duration,
            segment_duration_secs: self.hls.segment_duration_secs,
            highest_existing_segment: session.highest_segment_on_disk(),
            token,
        };
        Ok(rewrite_playlist(&raw, &ctx))
    }

    /// Serve `name` (a segment, `init.mp4`, or subtitle file) out of the
    /// session directory. Blocks up to `segment_wait`; rejects path
    /// traversal; records the request and triggers GC once served.
    pub async fn serve_segment(&self, session: &Session, name: &str) -> Result<Bytes> {
        validate_segment_name(name)?;
        let path = session.output_dir.join(name);
        let bytes = poll_for_file(&path, self.timeouts.segment_wait).await?;

        if let Some(n) = parse_segment_number(name) {
            session.record_segment_request(n);
        }
        self.gc(session);

        Ok(Bytes::from(bytes))
    }

    /// Stale-segment GC (spec.md §4.7): never delete within `gc_keep_behind`
    /// segments of the safe deletion point.
    pub fn gc(&self, session: &Session) {
        let mut state = session.write();
        let earliest_buffered = (state.earliest_buffered_segment >= 0)
            .then_some(state.earliest_buffered_segment);
        let last_served = (state.last_segment_served >= 0).then_some(state.last_segment_served);

        let safe_point = match (earliest_buffered, last_served) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return,
        };

        let cutoff = safe_point - self.hls.gc_keep_behind;
        if cutoff <= state.min_segment_available {
            return;
        }

        for n in state.min_segment_available.max(0)..cutoff {
            let _ = std::fs::remove_file(session.output_dir.join(format!("segment{n}.m4s")));
        }
        state.min_segment_available = cutoff;
    }
}

fn validate_segment_name(name: &str) -> Result<()> {
    if name.contains("..") || name.contains('/') || name.is_empty() {
        return Err(NovaError::BadRequest(format!("invalid segment name: {name}")));
    }
    Ok(())
}

fn parse_segment_number(name: &str) -> Option<i64> {
    name.strip_prefix("segment")?.strip_suffix(".m4s")?.parse().ok()
}

/// MIME type for a file served out of the session directory (spec.md §4.7).
pub fn mime_for(name: &str) -> &'static str {
    if name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if name.ends_with(".m4s") || name.ends_with(".mp4") {
        "video/mp4"
    } else if name.ends_with(".vtt") {
        "text/vtt"
    } else {
        "application/octet-stream"
    }
}

async fn poll_for_file(path: &Path, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::fs::read(path).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(NovaError::Timeout(path.display().to_string()));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(e) => return Err(NovaError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionParams;
    use uuid::Uuid;

    fn fresh_session(dir: &Path) -> Session {
        let params = SessionParams {
            path: "http://x/movie.mkv".into(),
            original_path: "http://x/movie.mkv".into(),
            start_offset: 0.0,
            audio_track_index: -1,
            subtitle_track_index: -1,
            force_aac: false,
            has_dv: false,
            dv_profile: 0,
            has_hdr: false,
        };
        Session::new(Uuid::new_v4(), &params, dir.to_path_buf())
    }

    #[test]
    fn rejects_path_traversal_in_segment_names() {
        assert!(validate_segment_name("../../etc/passwd").is_err());
        assert!(validate_segment_name("sub/dir.m4s").is_err());
        assert!(validate_segment_name("segment5.m4s").is_ok());
    }

    #[test]
    fn mime_types_match_file_extensions() {
        assert_eq!(mime_for("stream.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(mime_for("segment3.m4s"), "video/mp4");
        assert_eq!(mime_for("subtitles_2.vtt"), "text/vtt");
    }

    #[test]
    fn gc_never_deletes_within_keep_behind_window() {
        let dir = tempfile::tempdir().unwrap();
        let session = fresh_session(dir.path());
        for n in 0..20 {
            std::fs::write(dir.path().join(format!("segment{n}.m4s")), b"x").unwrap();
        }
        {
            let mut state = session.write();
            state.last_segment_served = 18;
            state.earliest_buffered_segment = 18;
        }

        let server = HlsServer::new(TimeoutConfig::default(), HlsConfig::default());
        server.gc(&session);

        // safe_point=18, keep_behind=5 => cutoff=13; segments 0..13 removed, 13..=19 remain.
        assert!(!dir.path().join("segment0.m4s").exists());
        assert!(!dir.path().join("segment12.m4s").exists());
        assert!(dir.path().join("segment13.m4s").exists());
        assert!(dir.path().join("segment19.m4s").exists());
        assert_eq!(session.read().min_segment_available, 13);
    }

    #[test]
    fn gc_is_a_no_op_before_any_segment_is_known() {
        let dir = tempfile::tempdir().unwrap();
        let session = fresh_session(dir.path());
        let server = HlsServer::new(TimeoutConfig::default(), HlsConfig::default());
        server.gc(&session);
        assert_eq!(session.read().min_segment_available, -1);
    }
}
