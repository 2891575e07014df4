//! TTL-bounded response cache (spec.md §4.J "Cache key composition" /
//! §3 "Cache entry").
//!
//! Grounded on the teacher's `FrameScheduler`
//! (`crates/page_handler/src/utilities/scheduler.rs`), which tracks "has
//! enough time elapsed since X" with `Instant`; the cache reuses that idiom
//! per-entry for TTL expiry instead of per-scheduler for frame budgeting.
//! `web_time::Instant` stands in for `std::time::Instant` because the
//! latter does not exist on `wasm32-unknown-unknown`.

use std::collections::HashMap;

use web_time::Instant;

use crate::response::Response;

/// How a cache entry was populated; carried through to `timing.spfPrefetched`
/// on a cache hit (spec.md §4.J "Dispatch").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Written by a `navigate()` call.
    Navigate,
    /// Written by a `prefetch()` call.
    Prefetch,
    /// Written by a `load()` call.
    Load,
    /// Written by a back/forward (history-driven) navigation.
    NavigateBack,
}

/// A single cached response (spec.md §3 "Cache entry").
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached response payload.
    pub response: Response,
    /// How this entry was populated.
    pub kind: EntryKind,
    inserted_at: Instant,
}

/// A TTL-bounded `key -> response` store with manual eviction.
///
/// Unbounded in size (the original has no capacity limit either); entries
/// simply become stale past `ttl` and are skipped on lookup, though they
/// are only actually removed by [`Cache::remove`], [`Cache::clear`], or
/// [`Cache::evict_expired`].
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
    ttl: core::time::Duration,
}

impl Cache {
    /// Creates an empty cache with the given time-to-live for new entries.
    #[must_use]
    pub fn new(ttl: core::time::Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    /// Inserts `response` under `key`, stamping `inserted_at = now`.
    pub fn insert(&mut self, key: impl Into<String>, response: Response, kind: EntryKind) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                response,
                kind,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Looks up `key`, returning `None` if absent or expired. An expired
    /// entry is left in place (lazily reaped by [`Cache::evict_expired`]);
    /// this matches the "manual eviction" contract in spec.md §4.B.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        let entry = self.entries.get(key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            None
        } else {
            Some(entry)
        }
    }

    /// Removes and returns the entry at `key`, if present (expired or not —
    /// callers that already matched via [`Cache::get`] want the value even
    /// though it is about to be consumed, per the "read-once" prefetch
    /// contract in spec.md §4.J).
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Clears every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Removes every entry whose TTL has elapsed. Not required for
    /// correctness (expired entries are already invisible to `get`) but
    /// bounds memory growth for long-lived pages.
    pub fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    /// Number of entries currently stored, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::SingleResponse;

    fn sample() -> Response {
        Response::Single(SingleResponse {
            title: Some("T".to_owned()),
            ..SingleResponse::default()
        })
    }

    #[test]
    fn read_after_write_returns_equal_value() {
        let mut cache = Cache::new(core::time::Duration::from_secs(60));
        cache.insert("k", sample(), EntryKind::Navigate);
        let entry = cache.get("k").expect("present");
        assert_eq!(entry.response, sample());
    }

    #[test]
    fn remove_makes_subsequent_reads_miss() {
        let mut cache = Cache::new(core::time::Duration::from_secs(60));
        cache.insert("k", sample(), EntryKind::Navigate);
        assert!(cache.remove("k").is_some());
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn expired_entry_is_invisible_to_get() {
        let mut cache = Cache::new(core::time::Duration::from_millis(0));
        cache.insert("k", sample(), EntryKind::Navigate);
        // A zero TTL means "expired" the instant it's checked.
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn clear_empties_the_cache() {
        let mut cache = Cache::new(core::time::Duration::from_secs(60));
        cache.insert("k", sample(), EntryKind::Navigate);
        cache.clear();
        assert!(cache.is_empty());
    }
}
