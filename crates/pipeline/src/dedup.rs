//! Deduplicator: a TTL set of recently-seen identifiers, used
//! both for ingestion record ids (at-least-once transport -> at-most-once
//! effective processing) and normalized transcripts.

use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct Dedup<K: Eq + Hash + Clone + Send + Sync + 'static> {
    seen: DashMap<K, Instant>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Dedup<K> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
        }
    }

    /// Returns `true` if `key` had not been seen within the TTL window
    /// (and records it as seen now); returns `false` if it's a duplicate.
    /// Entries older than the window are invisible to lookup.
    pub fn check_and_insert(&self, key: K) -> bool {
        let now = Instant::now();
        let is_duplicate = self
            .seen
            .get(&key)
            .map(|last_seen| now.duration_since(*last_seen) < self.ttl)
            .unwrap_or(false);
        if is_duplicate {
            metrics::counter!(voice_relay_core::metric_names::DEDUP_HITS).increment(1);
            return false;
        }
        self.seen.insert(key, now);
        true
    }

    /// Whether `key` is currently within the dedup window, without
    /// recording it as seen.
    pub fn contains(&self, key: &K) -> bool {
        match self.seen.get(key) {
            Some(last_seen) => Instant::now().duration_since(*last_seen) < self.ttl,
            None => false,
        }
    }

    /// Drop expired entries. Intended to be called periodically by a
    /// background tick rather than on every lookup, so a single key's
    /// staleness doesn't need to be discovered by someone else's query.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.seen.retain(|_, last_seen| now.duration_since(*last_seen) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_not_a_duplicate() {
        let dedup: Dedup<String> = Dedup::new(Duration::from_secs(30));
        assert!(dedup.check_and_insert("hello".to_string()));
    }

    #[test]
    fn repeat_within_window_is_duplicate() {
        let dedup: Dedup<String> = Dedup::new(Duration::from_secs(30));
        assert!(dedup.check_and_insert("hello".to_string()));
        assert!(!dedup.check_and_insert("hello".to_string()));
    }

    #[test]
    fn repeat_after_window_is_not_duplicate() {
        let dedup: Dedup<String> = Dedup::new(Duration::from_millis(10));
        assert!(dedup.check_and_insert("hello".to_string()));
        std::thread::sleep(Duration::from_millis(25));
        assert!(dedup.check_and_insert("hello".to_string()));
    }

    #[test]
    fn purge_removes_stale_entries() {
        let dedup: Dedup<String> = Dedup::new(Duration::from_millis(10));
        dedup.check_and_insert("a".to_string());
        std::thread::sleep(Duration::from_millis(25));
        dedup.purge_expired();
        assert!(dedup.is_empty());
    }
}
