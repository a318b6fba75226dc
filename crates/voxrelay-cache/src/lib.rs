//! Bounded, time-windowed dedup cache.
//!
//! Absorbs the case where the voice platform retries an already-completed
//! turn after a transient disconnect: a fresh fingerprint hit replays the
//! stored LLM text instead of re-running the upstream call. Only
//! LLM-produced content is ever stored here — buffer and keep-alive filler
//! never reach `store`, so a cache hit never replays stale filler text.

use dashmap::DashMap;
use std::time::{Duration, Instant};

struct DedupEntry {
    response_text: String,
    inserted_at: Instant,
}

pub struct DedupCache {
    entries: DashMap<String, DedupEntry>,
    ttl: Duration,
    evict_after: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration, evict_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            evict_after,
        }
    }

    /// Construct with the default window: 15s TTL, 2× TTL eviction.
    pub fn with_default_window() -> Self {
        let ttl = Duration::from_millis(voxrelay_core::config::DEDUP_WINDOW_MS);
        let evict_after = Duration::from_millis(voxrelay_core::config::DEDUP_EVICT_MS);
        Self::new(ttl, evict_after)
    }

    /// Return the stored response text for `key` if it was inserted within
    /// the TTL window; `None` otherwise (expired or never stored).
    pub fn lookup(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.response_text.clone())
        } else {
            None
        }
    }

    /// Store `text` under `key`, then opportunistically evict any entry
    /// older than `evict_after` (2× TTL by default). Eviction runs on every
    /// `store` rather than on a background timer, so the cache never grows
    /// unbounded even under sustained traffic with no idle gaps.
    pub fn store(&self, key: String, text: String) {
        self.entries.retain(|_, v| v.inserted_at.elapsed() < self.evict_after);
        self.entries.insert(
            key,
            DedupEntry {
                response_text: text,
                inserted_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn hit_within_ttl_returns_stored_text() {
        let cache = DedupCache::new(Duration::from_millis(50), Duration::from_millis(100));
        cache.store("fp1".to_string(), "Ten past three.".to_string());
        assert_eq!(cache.lookup("fp1").as_deref(), Some("Ten past three."));
    }

    #[test]
    fn miss_after_ttl_expires() {
        let cache = DedupCache::new(Duration::from_millis(10), Duration::from_millis(200));
        cache.store("fp1".to_string(), "stale".to_string());
        sleep(Duration::from_millis(30));
        assert_eq!(cache.lookup("fp1"), None);
    }

    #[test]
    fn miss_for_unknown_key() {
        let cache = DedupCache::new(Duration::from_millis(50), Duration::from_millis(100));
        assert_eq!(cache.lookup("never-stored"), None);
    }

    #[test]
    fn store_evicts_entries_older_than_evict_window() {
        let cache = DedupCache::new(Duration::from_millis(5), Duration::from_millis(20));
        cache.store("old".to_string(), "x".to_string());
        sleep(Duration::from_millis(30));
        cache.store("new".to_string(), "y".to_string());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.lookup("old"), None);
    }
}
