//! Per-`(session_id, speaker_id)` `StreamContext`: a rolling
//! transcript window used as translation context, plus a bounded
//! translation-memory cache for consistency across repeated utterances.
//!
//! All reads and writes go through the context's own mutex; the mutex is
//! never held across vendor I/O ("one logical mutex
//! per context... never held across I/O calls").

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use voice_relay_core::Language;

type MemoryKey = (String, String);

struct Inner {
    full_context: String,
    memory_order: VecDeque<MemoryKey>,
    memory: HashMap<MemoryKey, String>,
}

pub struct StreamContext {
    inner: Mutex<Inner>,
    max_memory_size: usize,
}

impl StreamContext {
    pub fn new(max_memory_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                full_context: String::new(),
                memory_order: VecDeque::new(),
                memory: HashMap::new(),
            }),
            max_memory_size: max_memory_size.max(1),
        }
    }

    /// Translation memory lookup, keyed by `(normalized_source,
    /// target_lang[:2])`.
    pub fn memory_lookup(&self, normalized_transcript: &str, target_lang: Language) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .memory
            .get(&(normalized_transcript.to_string(), target_lang.short().to_string()))
            .cloned()
    }

    /// Store a translation result, evicting the oldest insertion once the
    /// per-context bound is exceeded ("bounded to 50 entries
    /// per context, evict oldest insertion on overflow").
    pub fn memory_insert(&self, normalized_transcript: String, target_lang: Language, translation: String) {
        let mut inner = self.inner.lock();
        let key = (normalized_transcript, target_lang.short().to_string());
        if !inner.memory.contains_key(&key) {
            inner.memory_order.push_back(key.clone());
            if inner.memory_order.len() > self.max_memory_size {
                if let Some(oldest) = inner.memory_order.pop_front() {
                    inner.memory.remove(&oldest);
                }
            }
        }
        inner.memory.insert(key, translation);
    }

    /// Append one utterance's transcript to the rolling context window,
    /// re-bounding it to `2 * translation_context_max_chars`.
    pub fn append_utterance(&self, transcript: &str, translation_context_max_chars: usize) {
        let mut inner = self.inner.lock();
        if !inner.full_context.is_empty() {
            inner.full_context.push(' ');
        }
        inner.full_context.push_str(transcript);
        let bound = translation_context_max_chars.saturating_mul(2);
        inner.full_context = clean_context(&inner.full_context, bound);
    }

    /// A bounded tail snippet of the rolling context, passed as the
    /// vendor's translation context prefix.
    pub fn context_snippet(&self, max_chars: usize) -> String {
        let inner = self.inner.lock();
        clean_context(&inner.full_context, max_chars)
    }

    pub fn full_context_len(&self) -> usize {
        self.inner.lock().full_context.chars().count()
    }
}

/// Slice `s` to at most `max_chars` characters, keeping the tail and
/// advancing past any leading partial word.
/// Idempotent: `clean_context(clean_context(s, n), n) == clean_context(s, n)`.
pub fn clean_context(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len();
    if total <= max_chars {
        return s.to_string();
    }

    let mut start = total - max_chars;
    if start > 0 && !chars[start - 1].is_whitespace() {
        while start < total && !chars[start].is_whitespace() {
            start += 1;
        }
        while start < total && chars[start].is_whitespace() {
            start += 1;
        }
    }
    chars[start..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_context_is_idempotent() {
        let s = "the quick brown fox jumps over the lazy dog repeatedly";
        let once = clean_context(s, 20);
        let twice = clean_context(&once, 20);
        assert_eq!(once, twice);
    }

    #[test]
    fn clean_context_does_not_start_mid_word() {
        let s = "the quick brown fox";
        let cleaned = clean_context(s, 10);
        assert!(!cleaned.starts_with(' '));
        assert!(s.ends_with(&cleaned));
        // first char of cleaned must be a word-start in the original string
        let idx = s.len() - cleaned.len();
        assert!(idx == 0 || s.as_bytes()[idx - 1] == b' ');
    }

    #[test]
    fn short_input_is_unchanged() {
        assert_eq!(clean_context("hi", 100), "hi");
    }

    #[test]
    fn memory_evicts_oldest_insertion_on_overflow() {
        let ctx = StreamContext::new(2);
        ctx.memory_insert("a".into(), Language::English, "A".into());
        ctx.memory_insert("b".into(), Language::English, "B".into());
        ctx.memory_insert("c".into(), Language::English, "C".into());
        assert_eq!(ctx.memory_lookup("a", Language::English), None);
        assert_eq!(ctx.memory_lookup("b", Language::English), Some("B".into()));
        assert_eq!(ctx.memory_lookup("c", Language::English), Some("C".into()));
    }

    #[test]
    fn full_context_never_exceeds_twice_the_bound() {
        let ctx = StreamContext::new(50);
        for i in 0..50 {
            ctx.append_utterance(&format!("utterance number {i} with some words"), 30);
        }
        assert!(ctx.full_context_len() <= 60);
    }
}
