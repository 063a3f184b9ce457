//! Speech Vendor Facade: a uniform interface over batch STT,
//! streaming STT, translation, and synthesis. Implementations are
//! swappable; production wires a real vendor SDK, tests inject the
//! deterministic stub in `voice-relay-pipeline::vendor::StubVendor`.

use crate::error::VendorError;
use crate::language::Language;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// One interim or final result out of the streaming STT driver.
#[derive(Debug, Clone)]
pub struct StreamingResult {
    pub text: String,
    pub is_final: bool,
    pub confidence: f32,
}

#[async_trait]
pub trait SpeechVendor: Send + Sync + 'static {
    /// Batch transcription of a bounded audio segment.
    async fn transcribe(&self, audio: &[u8], lang: Language) -> Result<String, VendorError>;

    /// Drive a streaming STT session: read PCM16 chunks from `chunks`
    /// until closed, push interim/final results to `results` as they
    /// arrive. Returns once the vendor stream ends or errors.
    async fn streaming_transcribe(
        &self,
        lang: Language,
        chunks: mpsc::Receiver<Vec<u8>>,
        results: mpsc::Sender<StreamingResult>,
    ) -> Result<(), VendorError>;

    /// Translate `text` from `source` to `target`, optionally primed with
    /// a context prefix. Vendor-unsupported same-language calls are
    /// short-circuited by the caller before reaching this trait ("bypass
    /// translation; return input verbatim").
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
        context: Option<&str>,
    ) -> Result<String, VendorError>;

    /// Synthesize `text` in `lang` to PCM16 16kHz mono, using `voice` if
    /// given.
    async fn synthesize(
        &self,
        text: &str,
        lang: Language,
        voice: Option<&str>,
    ) -> Result<Vec<u8>, VendorError>;
}
