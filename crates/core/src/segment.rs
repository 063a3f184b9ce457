//! `Segment` and `FinalTranscript`.

use crate::ids::{SessionId, UserId};
use crate::language::Language;
use std::time::Duration;

/// Why the Pause Chunker emitted a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Pause,
    MaxAccumulation,
    Silence,
    EndStream,
}

impl TriggerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerReason::Pause => "pause",
            TriggerReason::MaxAccumulation => "max_accumulation",
            TriggerReason::Silence => "silence",
            TriggerReason::EndStream => "end_stream",
        }
    }
}

/// A bounded span of audio produced by the Pause Chunker, discarded after
/// the Batch Segment Worker processes it.
#[derive(Debug, Clone)]
pub struct Segment {
    pub session_id: SessionId,
    pub speaker_id: UserId,
    pub source_lang: Language,
    pub audio_bytes: Vec<u8>,
    pub trigger_reason: TriggerReason,
    pub duration: Duration,
}

/// Where a final transcript originated: the low-latency streaming path or
/// the batch pause-triggered fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptOrigin {
    Streaming,
    Batch,
}

/// A stable transcription, fed into STP (streaming) or BSW (batch).
#[derive(Debug, Clone)]
pub struct FinalTranscript {
    pub session_id: SessionId,
    pub speaker_id: UserId,
    pub source_lang: Language,
    pub text: String,
    pub origin: TranscriptOrigin,
}

/// Normalize a transcript the way Dedup and translation memory key on it:
/// trimmed and lower-cased ("Translation memory keys are normalized
/// (trimmed, lower-cased source text)").
pub fn normalize_transcript(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(normalize_transcript(" Hello There "), "hello there");
    }
}
