//! On-demand subtitle extraction (spec.md §4.7, §9 "sidecar subtitle
//! extraction race"). Most subtitle tracks are already produced by the main
//! pipeline (every text-based stream gets a sidecar output, spec.md §4.5);
//! this module only covers the fallback case where a track wasn't requested
//! up front and has to be pulled out on demand.

use crate::error::Result;
use crate::remuxer::Remuxer;
use crate::session::Session;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const MINIMAL_VTT: &[u8] = b"WEBVTT\n\n";

pub struct SubtitleExtractor {
    remuxer: Arc<dyn Remuxer>,
    /// Per-(session, track) guard so two concurrent requests don't both
    /// invoke the remuxer for the same track (spec.md §9).
    in_progress: Arc<Mutex<HashSet<(Uuid, usize)>>>,
}

impl SubtitleExtractor {
    pub fn new(remuxer: Arc<dyn Remuxer>) -> Self {
        Self {
            remuxer,
            in_progress: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Serve `subtitles_<track>.vtt` out of `session`'s directory, kicking
    /// off on-demand extraction if it doesn't exist yet. Never blocks for
    /// the full extraction — returns a minimal placeholder immediately if
    /// the file isn't ready (spec.md §4.7).
    pub async fn read_or_extract(
        &self,
        session: &Arc<Session>,
        track: Option<usize>,
        input: &str,
    ) -> Result<Bytes> {
        let Some(track) = track else {
            return Ok(Bytes::from_static(MINIMAL_VTT));
        };

        let path = session.output_dir.join(format!("subtitles_{track}.vtt"));
        if let Ok(bytes) = tokio::fs::read(&path).await {
            return Ok(Bytes::from(bytes));
        }

        self.start_extraction_if_needed(session, track, input);
        Ok(Bytes::from_static(MINIMAL_VTT))
    }

    fn start_extraction_if_needed(&self, session: &Arc<Session>, track: usize, input: &str) {
        let key = (session.id, track);
        let remuxer = self.remuxer.clone();
        let session = session.clone();
        let input = input.to_string();
        let in_progress = self.in_progress.clone();

        // `try_lock` keeps this call synchronous; extraction itself runs as
        // a detached background task regardless of which caller won the race.
        let Ok(mut guard) = in_progress.try_lock() else {
            return;
        };
        if guard.contains(&key) {
            return;
        }
        guard.insert(key);
        drop(guard);

        tokio::spawn(async move {
            let offset = session.read().transcoding_offset;
            let args = vec![
                "-ss".to_string(),
                offset.to_string(),
                "-i".to_string(),
                input,
                "-map".to_string(),
                format!("0:s:{track}"),
                "-c:s".to_string(),
                "webvtt".to_string(),
                "-f".to_string(),
                "webvtt".to_string(),
                "-flush_packets".to_string(),
                "1".to_string(),
                format!("subtitles_{track}.vtt"),
            ];
            if let Ok(mut child) = remuxer.run(&args, &session.output_dir, false) {
                let _ = child.child.wait().await;
            }
            in_progress.lock().await.remove(&key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remuxer::RemuxChild;
    use crate::session::SessionParams;
    use async_trait::async_trait;
    use std::path::Path;

    struct NeverFinishesRemuxer;

    #[async_trait]
    impl Remuxer for NeverFinishesRemuxer {
        async fn probe(&self, _args: &[String], _stdin_data: Option<Bytes>) -> Result<String> {
            unreachable!()
        }
        fn run(&self, _args: &[String], cwd: &Path, _pipe_stdin: bool) -> Result<RemuxChild> {
            let mut command = tokio::process::Command::new("sleep");
            command
                .arg("5")
                .current_dir(cwd)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .kill_on_drop(true);
            let child = command.spawn().unwrap();
            Ok(RemuxChild {
                child,
                stdin: None,
                stderr: None,
            })
        }
    }

    fn fresh_session(dir: &Path) -> Arc<Session> {
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
        Arc::new(Session::new(Uuid::new_v4(), &params, dir.to_path_buf()))
    }

    #[tokio::test]
    async fn missing_track_returns_minimal_vtt_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let session = fresh_session(dir.path());
        let extractor = SubtitleExtractor::new(Arc::new(NeverFinishesRemuxer));

        let bytes = extractor
            .read_or_extract(&session, Some(2), "http://x/movie.mkv")
            .await
            .unwrap();
        assert_eq!(&bytes[..], MINIMAL_VTT);
    }

    #[tokio::test]
    async fn existing_file_is_served_directly() {
        let dir = tempfile::tempdir().unwrap();
        let session = fresh_session(dir.path());
        tokio::fs::write(dir.path().join("subtitles_2.vtt"), b"WEBVTT\n\n00:00.000 --> 00:01.000\nhi\n")
            .await
            .unwrap();
        let extractor = SubtitleExtractor::new(Arc::new(NeverFinishesRemuxer));

        let bytes = extractor
            .read_or_extract(&session, Some(2), "http://x/movie.mkv")
            .await
            .unwrap();
        assert!(bytes.starts_with(b"WEBVTT"));
        assert!(bytes.len() > MINIMAL_VTT.len());
    }

    #[tokio::test]
    async fn no_track_requested_returns_minimal_vtt() {
        let dir = tempfile::tempdir().unwrap();
        let session = fresh_session(dir.path());
        let extractor = SubtitleExtractor::new(Arc::new(NeverFinishesRemuxer));
        let bytes = extractor.read_or_extract(&session, None, "x").await.unwrap();
        assert_eq!(&bytes[..], MINIMAL_VTT);
    }
}
