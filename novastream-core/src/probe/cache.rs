//! TTL-bounded mapping from source path to probe result (spec.md §4.1).
//!
//! A fixed 2 hour TTL was chosen so that audio/subtitle track switches
//! within a single viewing session reuse the probe. Entries are immutable
//! once stored (`Arc<ProbeResult>`), so readers under the lock never copy
//! the payload — only the `Arc` pointer.

use super::ProbeResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry {
    result: Arc<ProbeResult>,
    expires_at: Instant,
}

/// Single reader-writer lock guarding the whole map, per spec.md §5 ("The
/// ProbeCache has its own lock and is never accessed while a session lock
/// is held").
pub struct ProbeCache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl ProbeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns the cached result for `path`, or `None` if absent or expired.
    /// Expired entries are invisible here but only removed during `sweep`.
    pub fn get(&self, path: &str) -> Option<Arc<ProbeResult>> {
        let guard = self.entries.read();
        let entry = guard.get(path)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.result.clone())
    }

    pub fn put(&self, path: impl Into<String>, result: ProbeResult) {
        let mut guard = self.entries.write();
        guard.insert(
            path.into(),
            Entry {
                result: Arc::new(result),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Lazily remove expired entries. Called periodically by the janitor.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.entries.write();
        let before = guard.len();
        guard.retain(|_, entry| entry.expires_at > now);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeResult;

    fn sample() -> ProbeResult {
        ProbeResult {
            duration_secs: 600.0,
            video_codec: Some("hevc".to_string()),
            color_transfer: None,
            audio_streams: vec![],
            subtitle_streams: vec![],
            has_incompatible_audio: false,
            has_compatible_audio: true,
        }
    }

    #[test]
    fn put_then_get_returns_identical_data_while_live() {
        let cache = ProbeCache::new(Duration::from_secs(3600));
        cache.put("/movie.mkv", sample());
        let first = cache.get("/movie.mkv").unwrap();
        let second = cache.get("/movie.mkv").unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn expired_entries_are_invisible_to_get() {
        let cache = ProbeCache::new(Duration::from_millis(0));
        cache.put("/movie.mkv", sample());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("/movie.mkv").is_none());
    }

    #[test]
    fn sweep_removes_expired_entries_lazily() {
        let cache = ProbeCache::new(Duration::from_millis(0));
        cache.put("/a.mkv", sample());
        cache.put("/b.mkv", sample());
        std::thread::sleep(Duration::from_millis(5));
        // get() hides them but doesn't remove them.
        assert!(cache.get("/a.mkv").is_none());
        assert_eq!(cache.len(), 2);
        let removed = cache.sweep();
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 0);
    }
}
