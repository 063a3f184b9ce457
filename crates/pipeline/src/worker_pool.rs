//! Bounded vendor worker pool ("Blocking calls into the Speech Vendor
//! Facade execute on a bounded worker pool (default 16 workers) so they do
//! not starve the I/O fabric"). Realized as a `SpeechVendor` decorator that
//! acquires a `tokio::sync::Semaphore` permit before delegating, so callers
//! (`InterimSession`, `TranslationProcessor`, `BatchSegmentWorker`) don't
//! need to know the pool exists ("do not share the worker
//! pool with unrelated blocking work").

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use voice_relay_core::{Language, SpeechVendor, StreamingResult, VendorError};

pub struct BoundedVendor {
    inner: Arc<dyn SpeechVendor>,
    permits: Arc<Semaphore>,
}

impl BoundedVendor {
    pub fn new(inner: Arc<dyn SpeechVendor>, worker_pool_size: usize) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(worker_pool_size.max(1))),
        }
    }
}

#[async_trait]
impl SpeechVendor for BoundedVendor {
    async fn transcribe(&self, audio: &[u8], lang: Language) -> Result<String, VendorError> {
        let _permit = self.permits.acquire().await.expect("semaphore never closed");
        let started = Instant::now();
        let result = self.inner.transcribe(audio, lang).await;
        metrics::histogram!(voice_relay_core::metric_names::VENDOR_CALL_LATENCY).record(started.elapsed().as_secs_f64());
        result
    }

    async fn streaming_transcribe(
        &self,
        lang: Language,
        chunks: mpsc::Receiver<Vec<u8>>,
        results: mpsc::Sender<StreamingResult>,
    ) -> Result<(), VendorError> {
        // Held for the whole session, not a single call: a streaming
        // session occupies one worker slot for its lifetime, same as the
        // source's one-thread-per-stream driver.
        let _permit = self.permits.acquire().await.expect("semaphore never closed");
        let started = Instant::now();
        let result = self.inner.streaming_transcribe(lang, chunks, results).await;
        metrics::histogram!(voice_relay_core::metric_names::VENDOR_CALL_LATENCY).record(started.elapsed().as_secs_f64());
        result
    }

    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
        context: Option<&str>,
    ) -> Result<String, VendorError> {
        let _permit = self.permits.acquire().await.expect("semaphore never closed");
        let started = Instant::now();
        let result = self.inner.translate(text, source, target, context).await;
        metrics::histogram!(voice_relay_core::metric_names::VENDOR_CALL_LATENCY).record(started.elapsed().as_secs_f64());
        result
    }

    async fn synthesize(
        &self,
        text: &str,
        lang: Language,
        voice: Option<&str>,
    ) -> Result<Vec<u8>, VendorError> {
        let _permit = self.permits.acquire().await.expect("semaphore never closed");
        let started = Instant::now();
        let result = self.inner.synthesize(text, lang, voice).await;
        metrics::histogram!(voice_relay_core::metric_names::VENDOR_CALL_LATENCY).record(started.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records concurrency actually observed inside the delegate call, so
    /// the test measures what the semaphore bounds rather than task
    /// scheduling noise.
    struct CountingVendor {
        in_flight: AtomicUsize,
        max_observed: AtomicUsize,
    }

    #[async_trait]
    impl SpeechVendor for CountingVendor {
        async fn transcribe(&self, _audio: &[u8], _lang: Language) -> Result<String, VendorError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("hi".to_string())
        }

        async fn streaming_transcribe(
            &self,
            _lang: Language,
            _chunks: mpsc::Receiver<Vec<u8>>,
            _results: mpsc::Sender<StreamingResult>,
        ) -> Result<(), VendorError> {
            Ok(())
        }

        async fn translate(
            &self,
            text: &str,
            _source: Language,
            _target: Language,
            _context: Option<&str>,
        ) -> Result<String, VendorError> {
            Ok(text.to_string())
        }

        async fn synthesize(
            &self,
            _text: &str,
            _lang: Language,
            _voice: Option<&str>,
        ) -> Result<Vec<u8>, VendorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn limits_concurrent_calls_to_pool_size() {
        let vendor = Arc::new(CountingVendor {
            in_flight: AtomicUsize::new(0),
            max_observed: AtomicUsize::new(0),
        });
        let pool = Arc::new(BoundedVendor::new(vendor.clone(), 2));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                let _ = pool.transcribe(&[1, 2, 3], Language::English).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(vendor.max_observed.load(Ordering::SeqCst) <= 2);
    }
}
