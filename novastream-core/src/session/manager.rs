//! `SessionManager` (spec.md §4.6): owns the session registry and the
//! janitor goroutine, and is the only place sessions are created, queried,
//! kept alive, seeked, or torn down.
//!
//! Grounded in the teacher's `AppState` (`hls-vod-server/src/state.rs`): a
//! `DashMap`-backed registry plus a periodic eviction sweep, generalized
//! from a read-only stream cache into the full create/seek/cleanup
//! lifecycle spec.md §4.6 requires.

use super::types::{highest_segment_in_dir, Session, SessionParams, SessionStatus, StatusSnapshot};
use crate::config::NovaConfig;
use crate::error::{NovaError, Result};
use crate::hls::{read_actual_start_offset, HlsServer};
use crate::probe::{ProbeCache, ProbeResult, Prober};
use crate::provider::{DirectUrlProvider, StreamProvider};
use crate::remuxer::Remuxer;
use crate::source::{InputForm, ProviderProxy, SourceAdapter};
use crate::subtitle::SubtitleExtractor;
use crate::throttle::{BufferState, ThrottleProxy};
use crate::transcode::pipeline::{spawn_perf_log, TranscodePipeline};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Timing envelope returned by [`SessionManager::keep_alive`] (spec.md §4.6).
#[derive(Debug, Clone, Copy)]
pub struct TimingInfo {
    pub start_offset: f64,
    pub actual_start_offset: f64,
    pub segment_duration_secs: f64,
    pub duration: f64,
}

/// Result of a successful [`SessionManager::seek`] (spec.md §4.6/§6).
#[derive(Debug, Clone, Copy)]
pub struct SeekOutcome {
    pub session_id: Uuid,
    pub start_offset: f64,
    pub actual_start_offset: f64,
    pub duration: f64,
}

/// One in-flight pipeline run. Replaced wholesale on every restart (recovery
/// or seek); the resolved input URL and any proxy fronting it live in
/// [`ProxyHandle`] instead, since those survive across restarts.
struct PipelineEntry {
    abort_handle: AbortHandle,
}

/// Long-lived per-session resources that outlive any single pipeline run
/// (spec.md §4.4's `ThrottleProxy`, or the `RangedPipe` form's
/// [`ProviderProxy`]). Torn down only on [`SessionManager::cleanup`].
#[derive(Default)]
struct ProxyHandle {
    throttle: Option<ThrottleProxy>,
    provider_proxy: Option<ProviderProxy>,
    /// Set only for the `DirectUrl` form, where a `ThrottleProxy` was
    /// started against this counter before the `Session` existed; passed on
    /// to `Session::with_shared_counter` so both sides observe the same cell.
    counter: Option<Arc<AtomicI64>>,
}

/// A `BufferState` usable before a `Session` exists, so a `ThrottleProxy`
/// can be started ahead of session construction while still sharing the
/// exact counter the eventual `Session` updates from segment requests and
/// keepalives (spec.md §4.4, §9 "avoid any back-pointer ... a DAG, not a
/// cycle").
struct PreSessionBuffer {
    max_segment_requested: Arc<AtomicI64>,
    output_dir: PathBuf,
}

impl BufferState for PreSessionBuffer {
    fn max_segment_requested(&self) -> i64 {
        self.max_segment_requested.load(Ordering::Relaxed)
    }

    fn highest_existing_segment(&self) -> i64 {
        highest_segment_in_dir(&self.output_dir)
    }
}

/// Owns the session registry (spec.md §4.6). The only process-wide mutable
/// state of the core (spec.md §9); never a package-global.
pub struct SessionManager {
    sessions: DashMap<Uuid, Arc<Session>>,
    pipelines: DashMap<Uuid, PipelineEntry>,
    proxies: DashMap<Uuid, ProxyHandle>,
    config: NovaConfig,
    base_dir: PathBuf,
    provider: Arc<dyn StreamProvider>,
    remuxer: Arc<dyn Remuxer>,
    source_adapter: Arc<SourceAdapter>,
    prober: Arc<Prober>,
    probe_cache: Arc<ProbeCache>,
    hls_server: Arc<HlsServer>,
    subtitle_extractor: Arc<SubtitleExtractor>,
}

impl SessionManager {
    /// Construct the manager, orphan-sweep `config.base_dir` (spec.md §6:
    /// "Any subdirectory of `<baseDir>` existing at startup is orphaned and
    /// removed before accepting requests"), and start the janitor.
    pub fn new(
        config: NovaConfig,
        provider: Arc<dyn StreamProvider>,
        direct_url_provider: Option<Arc<dyn DirectUrlProvider>>,
        remuxer: Arc<dyn Remuxer>,
    ) -> Result<Arc<Self>> {
        let base_dir = PathBuf::from(&config.base_dir);
        std::fs::create_dir_all(&base_dir)?;
        remove_orphaned_session_dirs(&base_dir)?;

        let source_adapter = Arc::new(SourceAdapter::new(provider.clone(), direct_url_provider));
        let prober = Arc::new(Prober::new(remuxer.clone(), config.probe.clone()));
        let probe_cache = Arc::new(ProbeCache::new(Duration::from_secs(config.probe.cache_ttl_secs)));
        let hls_server = Arc::new(HlsServer::new(config.timeouts.clone(), config.hls.clone()));
        let subtitle_extractor = Arc::new(SubtitleExtractor::new(remuxer.clone()));

        let manager = Arc::new(Self {
            sessions: DashMap::new(),
            pipelines: DashMap::new(),
            proxies: DashMap::new(),
            config,
            base_dir,
            provider,
            remuxer,
            source_adapter,
            prober,
            probe_cache,
            hls_server,
            subtitle_extractor,
        });

        manager.clone().spawn_janitor();
        Ok(manager)
    }

    pub fn hls(&self) -> &HlsServer {
        &self.hls_server
    }

    pub fn subtitles(&self) -> &SubtitleExtractor {
        &self.subtitle_extractor
    }

    pub fn config(&self) -> &NovaConfig {
        &self.config
    }

    /// `Create(params)` (spec.md §4.6): resolves the input form, probes
    /// (synchronously — this is the part the section 2 control-flow
    /// narrative describes happening before the handle is returned), then
    /// starts the pipeline in the background and returns immediately.
    pub async fn create(self: &Arc<Self>, params: SessionParams) -> Result<Arc<Session>> {
        if params.start_offset < 0.0 {
            return Err(NovaError::BadRequest("start offset must be non-negative".to_string()));
        }

        let id = Uuid::new_v4();
        let output_dir = self.base_dir.join(id.simple().to_string());
        tokio::fs::create_dir_all(&output_dir).await.map_err(NovaError::Io)?;

        let form = self.source_adapter.preferred_input(&params.path).await?;
        let (resolved_input, proxy_handle) = self.resolve_form(&form, &params.path, &output_dir).await?;

        let probe = self.probe_for(&params.original_path, &resolved_input, &form).await?;
        if probe.duration_secs > 0.0 && params.start_offset >= probe.duration_secs {
            return Err(NovaError::BadRequest(format!(
                "start offset {:.1}s is at or beyond media duration {:.1}s",
                params.start_offset, probe.duration_secs
            )));
        }

        let mut resolved_params = params.clone();
        resolved_params.path = resolved_input;

        let session = self.build_session(id, &resolved_params, output_dir.clone(), &proxy_handle);

        {
            let mut state = session.write();
            state.duration = probe.duration_secs;
            state.probe = Some(probe.clone());
            state.resolved_url = Some(session.source_path.clone());
        }

        self.sessions.insert(id, session.clone());
        self.proxies.insert(id, proxy_handle);

        let subtitle_indices: Vec<usize> = probe.subtitle_streams.iter().map(|s| s.index).collect();
        self.spawn_pipeline(session.clone(), probe, subtitle_indices);

        tracing::info!(session_id = %id, path = %params.path, "session created");
        Ok(session)
    }

    fn build_session(
        &self,
        id: Uuid,
        params: &SessionParams,
        output_dir: PathBuf,
        proxy_handle: &ProxyHandle,
    ) -> Arc<Session> {
        match &proxy_handle.counter {
            Some(counter) => Arc::new(Session::with_shared_counter(id, params, output_dir, counter.clone())),
            None => Arc::new(Session::new(id, params, output_dir)),
        }
    }

    /// `Get(id)` (spec.md §4.6): updates `LastAccess`.
    pub fn get(&self, id: Uuid) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NovaError::NotFound(format!("session {id}")))?;
        session.touch();
        Ok(session)
    }

    /// `KeepAlive(id, playbackTime?, bufferStart?)` (spec.md §4.6).
    pub fn keep_alive(&self, id: Uuid, playback_time: Option<f64>, buffer_start: Option<f64>) -> Result<TimingInfo> {
        let session = self.get(id)?;
        let segment_duration_secs = self.config.hls.segment_duration_secs;
        let start_offset = session.read().start_offset;

        let to_segment = |t: f64| -> i64 {
            let hls_time = (t - start_offset).max(0.0);
            (hls_time / segment_duration_secs).floor() as i64
        };

        session.apply_keep_alive(playback_time.map(to_segment), buffer_start.map(to_segment));

        let state = session.read();
        Ok(TimingInfo {
            start_offset: state.start_offset,
            actual_start_offset: state.actual_start_offset,
            segment_duration_secs,
            duration: state.duration,
        })
    }

    /// `Seek(id, targetTime)` (spec.md §4.6): cancels the running pipeline,
    /// wipes segments, restarts at the new offset, and blocks (bounded)
    /// until a playlist with content exists.
    pub async fn seek(self: &Arc<Self>, id: Uuid, target_time: f64) -> Result<SeekOutcome> {
        if target_time < 0.0 {
            return Err(NovaError::BadRequest("seek time must be non-negative".to_string()));
        }
        let session = self.get(id)?;
        session.write().seek_in_progress = true;

        self.cancel_pipeline(id).await;
        self.clear_session_segments(&session).await?;

        let duration = session.read().duration;
        let clamped = if duration > 0.0 {
            target_time.min((duration - 1.0).max(0.0)).max(0.0)
        } else {
            target_time.max(0.0)
        };

        let probe = session
            .read()
            .probe
            .clone()
            .ok_or_else(|| NovaError::Transient("session has no probe result to restart from".to_string()))?;
        let subtitle_indices: Vec<usize> = probe.subtitle_streams.iter().map(|s| s.index).collect();

        {
            let mut state = session.write();
            state.start_offset = clamped;
            state.transcoding_offset = clamped;
            state.recovery_attempts = 0;
            state.min_segment_requested = -1;
            state.max_segment_requested = -1;
            state.last_segment_served = -1;
            state.min_segment_available = -1;
            state.last_playback_segment = -1;
            state.earliest_buffered_segment = -1;
            state.fatal_error = None;
            state.seek_in_progress = false;
        }
        // The lock-free mirror the throttle proxy reads also needs resetting;
        // `record_segment_request`/`apply_keep_alive` keep it in sync going
        // forward, but nothing has requested a segment of the new run yet.
        session.apply_keep_alive(Some(-1), None);

        self.spawn_pipeline(session.clone(), probe, subtitle_indices);
        self.wait_for_playlist(&session, self.config.timeouts.seek_wait).await?;

        if let Ok(offset) =
            read_actual_start_offset(&session.output_dir, session.highest_segment_on_disk().max(0)).await
        {
            session.write().actual_start_offset = offset;
        }

        let state = session.read();
        Ok(SeekOutcome {
            session_id: id,
            start_offset: state.start_offset,
            actual_start_offset: state.actual_start_offset,
            duration: state.duration,
        })
    }

    /// `Cleanup(id)` (spec.md §4.6): idempotent and silent (spec.md §7).
    pub async fn cleanup(&self, id: Uuid) {
        self.sessions.remove(&id);
        self.cancel_pipeline(id).await;

        if let Some((_, proxy)) = self.proxies.remove(&id) {
            if let Some(throttle) = proxy.throttle {
                throttle.close();
            }
            if let Some(provider_proxy) = proxy.provider_proxy {
                provider_proxy.close();
            }
        }

        let dir = self.base_dir.join(id.simple().to_string());
        for _ in 0..3 {
            if tokio::fs::remove_dir_all(&dir).await.is_ok() || tokio::fs::metadata(&dir).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// `GET /hls/{id}/status` (spec.md §6).
    pub fn status(&self, id: Uuid) -> Result<StatusSnapshot> {
        Ok(self.get(id)?.status_snapshot())
    }

    fn spawn_pipeline(self: &Arc<Self>, session: Arc<Session>, probe: Arc<ProbeResult>, subtitle_indices: Vec<usize>) {
        let pipeline = Arc::new(TranscodePipeline::new(
            self.remuxer.clone(),
            recovery_config(&self.config),
            hls_config(&self.config),
        ));

        let resolve_input = {
            let session = session.clone();
            move || {
                let url = session.source_path.clone();
                async move { Ok::<(String, Option<bytes::Bytes>), NovaError>((url, None)) }
            }
        };

        spawn_perf_log(session.clone());
        let (_rx, handle) = pipeline.start(session.clone(), probe, subtitle_indices, resolve_input, None);
        let abort_handle = handle.abort_handle();

        self.spawn_idle_enforcer(session.clone(), abort_handle.clone());
        self.pipelines.insert(session.id, PipelineEntry { abort_handle });
    }

    /// Idle enforcement within the pipeline (spec.md §4.6): no segment ever
    /// requested within `idle_timeout` of creation, or none requested for
    /// `idle_timeout` after the first, kills the process (no further
    /// restart) and marks `IdleTimeoutTriggered`.
    fn spawn_idle_enforcer(&self, session: Arc<Session>, abort_handle: AbortHandle) {
        let idle_timeout = self.config.timeouts.idle_timeout;
        let tick = self.config.timeouts.idle_check_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;

                if matches!(session.status(), SessionStatus::Completed | SessionStatus::Failed) {
                    return;
                }

                let last_request = session.read().last_segment_request;
                let idle = match last_request {
                    Some(t) => t.elapsed() >= idle_timeout,
                    None => session.created_at.elapsed() >= idle_timeout,
                };

                if idle {
                    tracing::info!(session_id = %session.id, "idle timeout, killing pipeline");
                    session.write().idle_timeout_triggered = true;
                    abort_handle.abort();
                    session.set_status(SessionStatus::Completed);
                    return;
                }
            }
        });
    }

    async fn cancel_pipeline(&self, id: Uuid) {
        if let Some((_, entry)) = self.pipelines.remove(&id) {
            entry.abort_handle.abort();
        }
        // Give the aborted child process (`kill_on_drop`) a moment to
        // release its file handles before the caller rewrites the directory.
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    async fn clear_session_segments(&self, session: &Session) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&session.output_dir).await.map_err(NovaError::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(NovaError::Io)? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".m4s")
                || name == "init.mp4"
                || name == "stream.m3u8"
                || name.starts_with("subtitles_")
            {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
        Ok(())
    }

    async fn wait_for_playlist(&self, session: &Session, timeout: Duration) -> Result<()> {
        let path = session.output_dir.join("stream.m3u8");
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                if meta.len() > 50 {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(NovaError::Timeout("stream.m3u8".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Resolve `form` into the URL the remuxer will actually be given, and
    /// the long-lived proxy (if any) fronting it (spec.md §4.3/§4.4).
    async fn resolve_form(&self, form: &InputForm, original_path: &str, output_dir: &Path) -> Result<(String, ProxyHandle)> {
        match form {
            InputForm::DirectUrl(url) => {
                let resolved = self
                    .source_adapter
                    .resolve_redirects(url)
                    .await
                    .unwrap_or_else(|_| url.clone());

                let counter = Arc::new(AtomicI64::new(-1));
                let buffer = Arc::new(PreSessionBuffer {
                    max_segment_requested: counter.clone(),
                    output_dir: output_dir.to_path_buf(),
                });
                let throttle = ThrottleProxy::start(&resolved, buffer, self.config.throttle.clone()).await?;
                let local_url = throttle.local_url().to_string();

                Ok((
                    local_url,
                    ProxyHandle {
                        throttle: Some(throttle),
                        provider_proxy: None,
                        counter: Some(counter),
                    },
                ))
            }
            InputForm::LocalWebDavUrl(url) => Ok((url.clone(), ProxyHandle::default())),
            InputForm::RangedPipe => {
                let proxy = ProviderProxy::start(self.provider.clone(), original_path.to_string()).await?;
                let url = proxy.local_url().to_string();
                Ok((
                    url,
                    ProxyHandle {
                        throttle: None,
                        provider_proxy: Some(proxy),
                        counter: None,
                    },
                ))
            }
        }
    }

    async fn probe_for(&self, original_path: &str, resolved_input: &str, form: &InputForm) -> Result<Arc<ProbeResult>> {
        if let Some(cached) = self.probe_cache.get(original_path) {
            return Ok(cached);
        }

        let (probe_input, stdin_prefix): (&str, Option<bytes::Bytes>) = match form {
            InputForm::RangedPipe => {
                match self
                    .source_adapter
                    .header_prefix(original_path, self.config.probe.ranged_pipe_bytes)
                    .await
                {
                    Ok(bytes) => ("pipe:0", Some(bytes)),
                    Err(_) => (resolved_input, None),
                }
            }
            _ => (resolved_input, None),
        };

        let result = self.prober.probe(probe_input, stdin_prefix).await?;
        self.probe_cache.put(original_path.to_string(), result);
        Ok(self
            .probe_cache
            .get(original_path)
            .expect("probe result was just inserted"))
    }

    fn spawn_janitor(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.timeouts.janitor_interval);
            loop {
                interval.tick().await;

                let max_age = self.config.timeouts.session_max_age;
                let grace = self.config.timeouts.completed_session_grace;

                let mut stale = Vec::new();
                for entry in self.sessions.iter() {
                    let session = entry.value();
                    let idle = session.time_since_last_access();
                    let is_stale = idle > max_age
                        || (matches!(session.status(), SessionStatus::Completed | SessionStatus::Failed)
                            && idle > grace);
                    if is_stale {
                        stale.push(*entry.key());
                    }
                }

                for id in stale {
                    tracing::info!(session_id = %id, "janitor reaping idle session");
                    self.cleanup(id).await;
                }

                let expired = self.probe_cache.sweep();
                if expired > 0 {
                    tracing::debug!(expired, "probe cache swept");
                }
            }
        });
    }
}

fn recovery_config(config: &NovaConfig) -> crate::config::RecoveryConfig {
    config.recovery.clone()
}

fn hls_config(config: &NovaConfig) -> crate::config::HlsConfig {
    config.hls.clone()
}

/// Spec.md §6: "Any subdirectory of `<baseDir>` existing at startup is
/// orphaned and removed before accepting requests."
fn remove_orphaned_session_dirs(base_dir: &Path) -> Result<()> {
    let entries = match std::fs::read_dir(base_dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remuxer::RemuxChild;
    use crate::session::types::SessionParams;
    use async_trait::async_trait;
    use std::process::Stdio;

    /// A `Remuxer` that runs `stream.m3u8`-shaped output through `sh`, so
    /// tests can drive `SessionManager` end to end without `ffmpeg`.
    struct FakeRemuxer;

    const SAMPLE_PROBE_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "tags": {"language": "eng"}, "disposition": {"default": 1, "forced": 0}}
        ],
        "format": {"duration": "20.0"}
    }"#;

    #[async_trait]
    impl Remuxer for FakeRemuxer {
        async fn probe(&self, _args: &[String], _stdin_data: Option<bytes::Bytes>) -> Result<String> {
            Ok(SAMPLE_PROBE_JSON.to_string())
        }

        fn run(&self, _args: &[String], cwd: &Path, _pipe_stdin: bool) -> Result<RemuxChild> {
            // Write a minimal valid-looking playlist + one segment and exit
            // cleanly, standing in for a real ffmpeg HLS run.
            let script = "echo '#EXTM3U' > stream.m3u8; echo '#EXT-X-PLAYLIST-TYPE:EVENT' >> stream.m3u8; \
                          printf 'x' > init.mp4; printf 'x' > segment0.m4s; exit 0";
            let mut command = tokio::process::Command::new("sh");
            command
                .arg("-c")
                .arg(script)
                .current_dir(cwd)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            let mut child = command.spawn().map_err(NovaError::Io)?;
            let stderr = child.stderr.take();
            Ok(RemuxChild {
                child,
                stdin: None,
                stderr,
            })
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl StreamProvider for EmptyProvider {
        async fn stream(&self, _req: crate::provider::RangeRequest) -> Result<crate::provider::ProviderResponse> {
            Err(NovaError::Provider("not used in this test".to_string()))
        }
    }

    fn test_manager(base_dir: &Path) -> Arc<SessionManager> {
        let mut config = NovaConfig::default();
        config.base_dir = base_dir.to_string_lossy().into_owned();
        config.timeouts.playlist_wait = Duration::from_secs(5);
        config.timeouts.seek_wait = Duration::from_secs(5);
        SessionManager::new(config, Arc::new(EmptyProvider), None, Arc::new(FakeRemuxer)).unwrap()
    }

    fn sample_params() -> SessionParams {
        SessionParams {
            path: "https://example.com/movie.mkv".to_string(),
            original_path: "https://example.com/movie.mkv".to_string(),
            start_offset: 0.0,
            audio_track_index: -1,
            subtitle_track_index: -1,
            force_aac: false,
            has_dv: false,
            dv_profile: 0,
            has_hdr: false,
        }
    }

    #[tokio::test]
    async fn create_registers_session_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let session = manager.create(sample_params()).await.unwrap();
        assert!(manager.get(session.id).is_ok());
        assert_eq!(session.read().duration, 20.0);
    }

    #[tokio::test]
    async fn create_rejects_offset_beyond_probed_duration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let mut params = sample_params();
        params.start_offset = 999.0;
        let err = manager.create(params).await.unwrap_err();
        assert!(matches!(err, NovaError::BadRequest(_)));
    }

    #[tokio::test]
    async fn get_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let err = manager.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, NovaError::NotFound(_)));
    }

    #[tokio::test]
    async fn keep_alive_never_decreases_max_segment_requested() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let session = manager.create(sample_params()).await.unwrap();

        manager.keep_alive(session.id, Some(10.0), None).unwrap();
        manager.keep_alive(session.id, Some(2.0), None).unwrap();

        assert_eq!(session.read().max_segment_requested, 5);
    }

    #[tokio::test]
    async fn cleanup_removes_session_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = test_manager(dir.path());
        let session = manager.create(sample_params()).await.unwrap();
        let output_dir = session.output_dir.clone();
        // Allow the fake remuxer to actually create the directory contents.
        tokio::time::sleep(Duration::from_millis(200)).await;

        manager.cleanup(session.id).await;

        assert!(manager.get(session.id).is_err());
        assert!(!output_dir.exists());
    }
}
