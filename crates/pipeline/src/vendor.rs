//! Deterministic stub implementation of the Speech Vendor Facade,
//! used by tests and local development. A production deployment swaps in
//! a real vendor SDK behind the same `SpeechVendor` trait.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use voice_relay_core::{Language, SpeechVendor, StreamingResult, VendorError};

pub struct StubVendor {
    fixtures: DashMap<Vec<u8>, String>,
    default_transcript: Mutex<String>,
    translate_calls: AtomicUsize,
    tts_calls: AtomicUsize,
    fail_translate_remaining: DashMap<Language, AtomicUsize>,
}

impl Default for StubVendor {
    fn default() -> Self {
        Self::new()
    }
}

impl StubVendor {
    pub fn new() -> Self {
        Self {
            fixtures: DashMap::new(),
            default_transcript: Mutex::new(String::new()),
            translate_calls: AtomicUsize::new(0),
            tts_calls: AtomicUsize::new(0),
            fail_translate_remaining: DashMap::new(),
        }
    }

    /// Register an exact transcript for a specific audio payload.
    pub fn set_transcript(&self, audio: &[u8], text: impl Into<String>) {
        self.fixtures.insert(audio.to_vec(), text.into());
    }

    /// Transcript returned for any audio without a registered fixture.
    pub fn set_default_transcript(&self, text: impl Into<String>) {
        *self.default_transcript.lock() = text.into();
    }

    /// Make the next `count` `translate` calls targeting `target` fail
    /// with a timeout, to exercise the translation processor's
    /// per-language failure isolation.
    pub fn fail_translate_next(&self, target: Language, count: usize) {
        self.fail_translate_remaining
            .entry(target)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(count, Ordering::SeqCst);
    }

    pub fn translate_call_count(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn tts_call_count(&self) -> usize {
        self.tts_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechVendor for StubVendor {
    async fn transcribe(&self, audio: &[u8], _lang: Language) -> Result<String, VendorError> {
        if let Some(fixture) = self.fixtures.get(audio) {
            Ok(fixture.clone())
        } else {
            Ok(self.default_transcript.lock().clone())
        }
    }

    async fn streaming_transcribe(
        &self,
        lang: Language,
        mut chunks: mpsc::Receiver<Vec<u8>>,
        results: mpsc::Sender<StreamingResult>,
    ) -> Result<(), VendorError> {
        let mut buffer = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            if chunk.is_empty() {
                // Sentinel frame: finalize the current utterance.
                let text = self.transcribe(&buffer, lang).await?;
                buffer.clear();
                if text.is_empty() {
                    continue;
                }
                let _ = results
                    .send(StreamingResult {
                        text: text.clone(),
                        is_final: false,
                        confidence: 0.6,
                    })
                    .await;
                let _ = results
                    .send(StreamingResult {
                        text,
                        is_final: true,
                        confidence: 0.95,
                    })
                    .await;
            } else {
                buffer.extend_from_slice(&chunk);
            }
        }
        Ok(())
    }

    async fn translate(
        &self,
        text: &str,
        _source: Language,
        target: Language,
        _context: Option<&str>,
    ) -> Result<String, VendorError> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(remaining) = self.fail_translate_remaining.get(&target) {
            let prev = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    if n > 0 {
                        Some(n - 1)
                    } else {
                        None
                    }
            });
            if prev.is_ok() {
                return Err(VendorError::Timeout(std::time::Duration::from_secs(5)));
            }
        }
        Ok(format!("[{}] {}", target.short(), text))
    }

    async fn synthesize(
        &self,
        text: &str,
        lang: Language,
        _voice: Option<&str>,
    ) -> Result<Vec<u8>, VendorError> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("audio:{}:{}", lang.short(), text).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_same_language_is_not_special_cased_by_vendor() {
        // The vendor itself always "translates"; the same-language bypass
        // is the translation processor's responsibility.
        let vendor = StubVendor::new();
        let out = vendor
            .translate("hello", Language::English, Language::English, None)
            .await
            .unwrap();
        assert_eq!(out, "[en] hello");
    }

    #[tokio::test]
    async fn injected_failure_fires_exactly_once() {
        let vendor = StubVendor::new();
        vendor.fail_translate_next(Language::Hebrew, 1);
        let first = vendor
            .translate("hi", Language::English, Language::Hebrew, None)
            .await;
        assert!(first.is_err());
        let second = vendor
            .translate("hi", Language::English, Language::Hebrew, None)
            .await;
        assert!(second.is_ok());
    }
}
