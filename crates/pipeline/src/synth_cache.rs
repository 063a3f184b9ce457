//! Synthesis Cache: a bounded LRU from
//! `(text, language, voice)` to rendered audio bytes, pure in-process.

use parking_lot::Mutex;
use std::collections::HashMap;
use voice_relay_core::Language;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    text: String,
    language: Language,
    voice: Option<String>,
}

/// Intrusive doubly-linked LRU list implemented over a slab so recency
/// updates and evictions are O(1); `HashMap` alone can't give us ordered
/// eviction without a linear scan.
struct Entry {
    key: CacheKey,
    value: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Lru {
    slab: Vec<Option<Entry>>,
    index: HashMap<CacheKey, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    capacity: usize,
}

impl Lru {
    fn new(capacity: usize) -> Self {
        Self {
            slab: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            capacity: capacity.max(1),
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = self.slab[idx].as_ref().unwrap();
            (entry.prev, entry.next)
        };
        match prev {
            Some(p) => self.slab[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slab[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let entry = self.slab[idx].as_mut().unwrap();
            entry.prev = None;
            entry.next = old_head;
        }
        if let Some(h) = old_head {
            self.slab[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn touch(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.detach(idx);
        self.push_front(idx);
    }

    fn get(&mut self, key: &CacheKey) -> Option<Vec<u8>> {
        let idx = *self.index.get(key)?;
        self.touch(idx);
        self.slab[idx].as_ref().map(|e| e.value.clone())
    }

    fn put(&mut self, key: CacheKey, value: Vec<u8>) {
        if let Some(&idx) = self.index.get(&key) {
            self.slab[idx].as_mut().unwrap().value = value;
            self.touch(idx);
            return;
        }

        let idx = self.slab.len();
        self.slab.push(Some(Entry {
                    key: key.clone(),
                    value,
                    prev: None,
                    next: None,
        }));
        self.push_front(idx);
        self.index.insert(key, idx);

        if self.index.len() > self.capacity {
            if let Some(tail) = self.tail {
                let evicted_key = self.slab[tail].as_ref().unwrap().key.clone();
                self.detach(tail);
                self.slab[tail] = None;
                self.index.remove(&evicted_key);
            }
        }
    }
}

pub struct SynthCache {
    lru: Mutex<Lru>,
}

impl SynthCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru: Mutex::new(Lru::new(capacity)),
        }
    }

    pub fn get(&self, text: &str, language: Language, voice: Option<&str>) -> Option<Vec<u8>> {
        let key = CacheKey {
            text: text.to_string(),
            language,
            voice: voice.map(str::to_string),
        };
        let hit = self.lru.lock().get(&key);
        if hit.is_some() {
            metrics::counter!(voice_relay_core::metric_names::CACHE_HITS).increment(1);
        } else {
            metrics::counter!(voice_relay_core::metric_names::CACHE_MISSES).increment(1);
        }
        hit
    }

    pub fn put(&self, text: &str, language: Language, voice: Option<&str>, audio: Vec<u8>) {
        let key = CacheKey {
            text: text.to_string(),
            language,
            voice: voice.map(str::to_string),
        };
        self.lru.lock().put(key, audio);
    }

    pub fn len(&self) -> usize {
        self.lru.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_after_put() {
        let cache = SynthCache::new(2);
        cache.put("hi", Language::English, None, vec![1, 2, 3]);
        assert_eq!(cache.get("hi", Language::English, None), Some(vec![1, 2, 3]));
    }

    #[test]
    fn distinct_voice_is_distinct_key() {
        let cache = SynthCache::new(4);
        cache.put("hi", Language::English, Some("a"), vec![1]);
        cache.put("hi", Language::English, Some("b"), vec![2]);
        assert_eq!(cache.get("hi", Language::English, Some("a")), Some(vec![1]));
        assert_eq!(cache.get("hi", Language::English, Some("b")), Some(vec![2]));
    }

    #[test]
    fn eviction_respects_lru_order() {
        let cache = SynthCache::new(2);
        cache.put("a", Language::English, None, vec![1]);
        cache.put("b", Language::English, None, vec![2]);
        // touch "a" so "b" becomes least-recently-used
        let _ = cache.get("a", Language::English, None);
        cache.put("c", Language::English, None, vec![3]);
        assert_eq!(cache.get("b", Language::English, None), None);
        assert_eq!(cache.get("a", Language::English, None), Some(vec![1]));
        assert_eq!(cache.get("c", Language::English, None), Some(vec![3]));
    }

    #[test]
    fn capacity_minus_one_other_keys_still_hits() {
        let cache = SynthCache::new(3);
        cache.put("target", Language::English, None, vec![9]);
        cache.put("other1", Language::English, None, vec![1]);
        assert_eq!(cache.get("target", Language::English, None), Some(vec![9]));
    }
}
