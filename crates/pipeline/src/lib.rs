//! The streaming audio translation pipeline: voice activity detection,
//! pause-triggered chunking, the streaming and batch speech-recognition
//! drivers, and the shared translation + synthesis fan-out.

pub mod bsw;
pub mod chunker;
pub mod context;
pub mod dedup;
pub mod interim;
pub mod synth_cache;
pub mod translation_processor;
pub mod vad;
pub mod vendor;
pub mod worker_pool;

pub use bsw::BatchSegmentWorker;
pub use chunker::PauseChunker;
pub use context::StreamContext;
pub use dedup::Dedup;
pub use interim::InterimSession;
pub use synth_cache::SynthCache;
pub use translation_processor::TranslationProcessor;
pub use vad::VoiceActivityDetector;
pub use vendor::StubVendor;
pub use worker_pool::BoundedVendor;

use thiserror::Error;

/// Pipeline-scoped error type. Boundaries convert
/// unexpected failures into one of these variants rather than letting
/// them propagate raw or swallowing them silently.
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("vad error: {0}")]
    Vad(String),

    #[error("chunker error: {0}")]
    Chunker(String),

    #[error(transparent)]
    Vendor(#[from] voice_relay_core::VendorError),

    #[error("stream context poisoned")]
    ContextPoisoned,

    #[error("channel closed")]
    ChannelClosed,

    #[error("operation timed out")]
    Timeout,
}
