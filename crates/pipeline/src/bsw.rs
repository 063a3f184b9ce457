//! Batch Segment Worker: the fallback pipeline consuming the Pause
//! Chunker's segments for speakers without a live streaming STT session
//! (or as a safety net), producing the same `Translation` events as the
//! Streaming Translation Processor via the same shared fan-out primitive.

use crate::translation_processor::TranslationProcessor;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use voice_relay_config::TranslationConfig;
use voice_relay_core::{FinalTranscript, Segment, SpeechVendor, StreamKey, TranscriptOrigin};

struct BufferEntry {
    transcript: String,
    created_at: Instant,
}

/// Per-speaker recent-segment buffer used for smart-merge.
struct SegmentBuffer {
    entries: VecDeque<BufferEntry>,
    max_len: usize,
}

impl SegmentBuffer {
    fn new(max_len: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    fn last(&self) -> Option<&BufferEntry> {
        self.entries.back()
    }

    fn push_bounded(&mut self, entry: BufferEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    fn replace_last(&mut self, entry: BufferEntry) {
        self.entries.pop_back();
        self.push_bounded(entry);
    }

    /// "Finalize-for-publish" pass: after emit, fold the last two
    /// tuples together if they meet the merge predicate, this time treating
    /// a trailing comma as a clause terminator too.
    fn finalize_last_two(&mut self, config: &TranslationConfig) {
        if self.entries.len() < 2 {
            return;
        }
        let last = &self.entries[self.entries.len() - 1];
        let prev = &self.entries[self.entries.len() - 2];
        let gap = last.created_at.saturating_duration_since(prev.created_at);
        if should_merge(&prev.transcript, &last.transcript, gap, config, true) {
            let last = self.entries.pop_back().unwrap();
            let prev = self.entries.pop_back().unwrap();
            self.entries.push_back(BufferEntry {
                transcript: format!("{} {}", prev.transcript, last.transcript),
                created_at: last.created_at,
            });
        }
    }
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

fn ends_in_terminal_punctuation(s: &str, include_comma: bool) -> bool {
    match s.trim_end().chars().last() {
        Some('.') | Some('!') | Some('?') => true,
        Some(',') => include_comma,
        _ => false,
    }
}

fn should_merge(prev: &str, next: &str, gap: Duration, config: &TranslationConfig, include_comma: bool) -> bool {
    word_count(prev) <= 5
        && word_count(next) <= 5
        && gap.as_secs_f64() < config.merge_window_sec
        && !ends_in_terminal_punctuation(prev, include_comma)
}

pub struct BatchSegmentWorker {
    vendor: Arc<dyn SpeechVendor>,
    translation_processor: Arc<TranslationProcessor>,
    buffers: DashMap<StreamKey, Mutex<SegmentBuffer>>,
    config: TranslationConfig,
}

impl BatchSegmentWorker {
    pub fn new(
        vendor: Arc<dyn SpeechVendor>,
        translation_processor: Arc<TranslationProcessor>,
        config: TranslationConfig,
    ) -> Self {
        Self {
            vendor,
            translation_processor,
            buffers: DashMap::new(),
            config,
        }
    }

    pub fn drop_buffer(&self, key: &StreamKey) {
        self.buffers.remove(key);
    }

    /// Transcribe a segment, smart-merge it with the speaker's buffered
    /// tail, and invoke the shared translation fan-out on the result.
    /// BSW never publishes interim events; it only produces finals.
    pub async fn process_segment(&self, segment: Segment) {
        let transcript = match self.vendor.transcribe(&segment.audio_bytes, segment.source_lang).await {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "batch transcription failed; dropping segment");
                return;
            }
        };
        let trimmed = transcript.trim();
        if trimmed.is_empty() {
            return;
        }

        let key = StreamKey::new(segment.session_id.clone(), segment.speaker_id.clone());
        let now = Instant::now();

        let merged_text = {
            let entry = self
                .buffers
                .entry(key.clone())
                .or_insert_with(|| Mutex::new(SegmentBuffer::new(self.config.max_buffer_segments)));
            let mut buffer = entry.lock();

            let merge = buffer
                .last()
                .map(|last| should_merge(&last.transcript, trimmed, now.saturating_duration_since(last.created_at), &self.config, false))
                .unwrap_or(false);

            let text = if merge {
                format!("{} {}", buffer.last().unwrap().transcript, trimmed)
            } else {
                trimmed.to_string()
            };

            if merge {
                buffer.replace_last(BufferEntry {
                    transcript: text.clone(),
                    created_at: now,
                });
            } else {
                buffer.push_bounded(BufferEntry {
                    transcript: text.clone(),
                    created_at: now,
                });
            }
            buffer.finalize_last_two(&self.config);
            text
        };

        self.translation_processor
            .process(FinalTranscript {
                session_id: segment.session_id,
                speaker_id: segment.speaker_id,
                source_lang: segment.source_lang,
                text: merged_text,
                origin: TranscriptOrigin::Batch,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_unterminated_segments_merge() {
        let cfg = TranslationConfig::default();
        assert!(should_merge("hi there", "how are you", Duration::from_millis(200), &cfg, false));
    }

    #[test]
    fn terminal_punctuation_blocks_merge() {
        let cfg = TranslationConfig::default();
        assert!(!should_merge("hi there.", "how are you", Duration::from_millis(200), &cfg, false));
    }

    #[test]
    fn long_segment_does_not_merge() {
        let cfg = TranslationConfig::default();
        let long = "one two three four five six seven";
        assert!(!should_merge(long, "ok", Duration::from_millis(200), &cfg, false));
    }

    #[test]
    fn comma_blocks_merge_only_when_requested() {
        let cfg = TranslationConfig::default();
        assert!(should_merge("well,", "yes", Duration::from_millis(200), &cfg, false));
        assert!(!should_merge("well,", "yes", Duration::from_millis(200), &cfg, true));
    }

    #[test]
    fn gap_beyond_window_blocks_merge() {
        let cfg = TranslationConfig::default();
        assert!(!should_merge("hi", "there", Duration::from_secs(5), &cfg, false));
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::synth_cache::SynthCache;
    use crate::vendor::StubVendor;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use voice_relay_core::{
        BusPublisher, CallRepository, Language, Participant, Session, SessionBusEvent, SessionId,
        TargetLanguageMap, UserId,
    };
    use voice_relay_config::VendorConfig;

    struct FixedRepository {
        targets: TargetLanguageMap,
    }

    #[async_trait]
    impl CallRepository for FixedRepository {
        async fn get_target_languages(
            &self,
            _session_id: &SessionId,
            _speaker_id: &UserId,
            _include_speaker: bool,
        ) -> TargetLanguageMap {
            self.targets.clone()
        }

        async fn get_participant_language(&self, _session_id: &SessionId, _user_id: &UserId) -> Option<Language> {
            None
        }

        async fn get_call_by_session_id(&self, _session_id: &SessionId) -> Option<Session> {
            None
        }

        async fn get_connected_participants(
            &self,
            _session_id: &SessionId,
            _exclude_user_id: Option<&UserId>,
        ) -> Vec<Participant> {
            Vec::new()
        }
    }

    struct CollectingBus {
        events: StdMutex<Vec<SessionBusEvent>>,
    }

    #[async_trait]
    impl BusPublisher for CollectingBus {
        async fn publish(&self, event: SessionBusEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn segment(session: &str, speaker: &str) -> Segment {
        Segment {
            session_id: SessionId::from(session),
            speaker_id: UserId::from(speaker),
            source_lang: Language::English,
            audio_bytes: vec![1, 2, 3],
            trigger_reason: voice_relay_core::TriggerReason::Pause,
            duration: Duration::from_millis(300),
        }
    }

    #[tokio::test]
    async fn back_to_back_short_segments_are_merged_before_publish() {
        let vendor = Arc::new(StubVendor::new());
        vendor.set_transcript(&[1, 2, 3], "hi there");

        let mut targets = TargetLanguageMap::new();
        targets.insert(Language::Hebrew, vec![UserId::from("bob")]);
        let repo = Arc::new(FixedRepository { targets });
        let bus = Arc::new(CollectingBus {
            events: StdMutex::new(Vec::new()),
        });
        let cache = Arc::new(SynthCache::new(10));

        let processor = Arc::new(TranslationProcessor::new(
            vendor.clone(),
            repo,
            bus.clone(),
            cache,
            TranslationConfig::default(),
            VendorConfig::default(),
        ));
        let bsw = BatchSegmentWorker::new(vendor, processor, TranslationConfig::default());

        bsw.process_segment(segment("s1", "alice")).await;
        bsw.process_segment(segment("s1", "alice")).await;

        let events = bus.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[1] {
            SessionBusEvent::Translation { transcript, .. } => {
                assert_eq!(transcript, "hi there hi there");
            }
            _ => panic!("expected translation event"),
        }
    }
}
