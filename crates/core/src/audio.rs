//! Audio frame types flowing in from the Connection Fabric.

use crate::ids::{SessionId, UserId};
use crate::language::Language;
use std::time::Instant;

/// Raw PCM16 16kHz mono chunk produced by the Connection Fabric, consumed
/// by the Pause Chunker and Interim Session.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub session_id: SessionId,
    pub speaker_id: UserId,
    pub source_lang: Language,
    pub bytes: Vec<u8>,
    pub arrived_at: Instant,
}

impl AudioFrame {
    pub fn new(
        session_id: SessionId,
        speaker_id: UserId,
        source_lang: Language,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            session_id,
            speaker_id,
            source_lang,
            bytes,
            arrived_at: Instant::now(),
        }
    }

    /// Duration of this frame at the fixed sample rate/width.
    pub fn duration_secs(&self, sample_rate: u32, bytes_per_sample: u32) -> f64 {
        let frame_bytes = sample_rate as f64 * bytes_per_sample as f64;
        if frame_bytes <= 0.0 {
            return 0.0;
        }
        self.bytes.len() as f64 / frame_bytes
    }
}
