//! Shared Translation Processor ("extract a
//! `TranslationProcessor` that both [STP and BSW] paths invoke, sharing
//! `SynthCache`, `Dedup`, and `CallRepository`").
//!
//! Given one stable `FinalTranscript`, fans out translate+synthesize work
//! per target language, isolating failures so one vendor hiccup doesn't
//! drop translations for every other listener.

use crate::context::StreamContext;
use crate::dedup::Dedup;
use crate::synth_cache::SynthCache;
use crate::PipelineError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;
use voice_relay_config::{TranslationConfig, VendorConfig};
use voice_relay_core::{
    normalize_transcript, BusPublisher, CallRepository, FinalTranscript, Language, SessionBusEvent,
    SpeechVendor, StreamKey, TranscriptOrigin,
};

pub struct TranslationProcessor {
    vendor: Arc<dyn SpeechVendor>,
    repository: Arc<dyn CallRepository>,
    bus: Arc<dyn BusPublisher>,
    synth_cache: Arc<SynthCache>,
    dedup: Dedup<(StreamKey, String)>,
    contexts: DashMap<StreamKey, Arc<StreamContext>>,
    config: TranslationConfig,
    vendor_config: VendorConfig,
}

impl TranslationProcessor {
    pub fn new(
        vendor: Arc<dyn SpeechVendor>,
        repository: Arc<dyn CallRepository>,
        bus: Arc<dyn BusPublisher>,
        synth_cache: Arc<SynthCache>,
        config: TranslationConfig,
        vendor_config: VendorConfig,
    ) -> Self {
        let dedup_ttl = Duration::from_secs(config.message_dedup_ttl_sec);
        Self {
            vendor,
            repository,
            bus,
            synth_cache,
            dedup: Dedup::new(dedup_ttl),
            contexts: DashMap::new(),
            config,
            vendor_config,
        }
    }

    fn context_for(&self, key: &StreamKey) -> Arc<StreamContext> {
        self.contexts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(StreamContext::new(self.config.stream_context_memory_max_size)))
            .clone()
    }

    pub fn drop_context(&self, key: &StreamKey) {
        self.contexts.remove(key);
    }

    /// Process one stable transcript to completion: dedup, fan out
    /// translation+synthesis per target language, publish, and extend the
    /// stream's rolling context.
    pub async fn process(&self, transcript: FinalTranscript) -> Result<(), PipelineError> {
        let trimmed = transcript.text.trim();
        if trimmed.chars().count() < 2 {
            return Ok(());
        }

        let key = StreamKey::new(transcript.session_id.clone(), transcript.speaker_id.clone());
        let normalized = normalize_transcript(trimmed);

        if !self.dedup.check_and_insert((key.clone(), normalized.clone())) {
            return Ok(());
        }
        metrics::counter!(voice_relay_core::metric_names::FINALS_PROCESSED).increment(1);

        let context = self.context_for(&key);
        let targets = self
            .repository
            .get_target_languages(&transcript.session_id, &transcript.speaker_id, true)
            .await;

        let context_snippet = context.context_snippet(self.config.context_snippet_max_chars);
        let is_streaming = matches!(transcript.origin, TranscriptOrigin::Streaming);

        let mut tasks = Vec::with_capacity(targets.len());
        for (target_lang, recipients) in targets {
            if recipients.is_empty() {
                continue;
            }
            tasks.push(self.translate_and_publish(
                    transcript.session_id.clone(),
                    transcript.speaker_id.clone(),
                    trimmed.to_string(),
                    normalized.clone(),
                    transcript.source_lang,
                    target_lang,
                    recipients,
                    context.clone(),
                    context_snippet.clone(),
                    is_streaming,
            ));
        }
        futures::future::join_all(tasks).await;

        context.append_utterance(trimmed, self.config.translation_context_max_chars);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn translate_and_publish(
        &self,
        session_id: voice_relay_core::SessionId,
        speaker_id: voice_relay_core::UserId,
        transcript_text: String,
        normalized: String,
        source_lang: Language,
        target_lang: Language,
        recipient_ids: Vec<voice_relay_core::UserId>,
        context: Arc<StreamContext>,
        context_snippet: String,
        is_streaming: bool,
    ) {
        let has_context = !context_snippet.is_empty();

        let translation = if target_lang == source_lang {
            transcript_text.clone()
        } else if let Some(cached) = context.memory_lookup(&normalized, target_lang) {
            cached
        } else {
            let ctx_arg = if has_context { Some(context_snippet.as_str()) } else { None };
            let call = self
                .vendor
                .translate(&transcript_text, source_lang, target_lang, ctx_arg);
            match timeout(Duration::from_secs(self.vendor_config.translate_timeout_sec), call).await {
                Ok(Ok(text)) => {
                    context.memory_insert(normalized.clone(), target_lang, text.clone());
                    text
                }
                Ok(Err(err)) => {
                    warn!(target_lang = %target_lang, error = %err, "translation failed; skipping this language");
                    return;
                }
                Err(_) => {
                    warn!(target_lang = %target_lang, "translation timed out; skipping this language");
                    return;
                }
            }
        };

        let audio_content = self.synthesize(&translation, target_lang).await;

        self.bus
            .publish(SessionBusEvent::Translation {
                session_id,
                speaker_id,
                recipient_ids,
                transcript: transcript_text,
                translation,
                audio_content,
                source_lang,
                target_lang,
                is_streaming,
                has_context,
            })
            .await;
        metrics::counter!(voice_relay_core::metric_names::TRANSLATIONS_PUBLISHED).increment(1);
    }

    async fn synthesize(&self, text: &str, lang: Language) -> Option<String> {
        if let Some(cached) = self.synth_cache.get(text, lang, None) {
            return Some(BASE64.encode(cached));
        }
        let call = self.vendor.synthesize(text, lang, None);
        match timeout(Duration::from_secs(self.vendor_config.tts_timeout_sec), call).await {
            Ok(Ok(audio)) => {
                self.synth_cache.put(text, lang, None, audio.clone());
                Some(BASE64.encode(audio))
            }
            Ok(Err(err)) => {
                warn!(lang = %lang, error = %err, "synthesis failed; publishing without audio");
                None
            }
            Err(_) => {
                warn!(lang = %lang, "synthesis timed out; publishing without audio");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::StubVendor;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use voice_relay_core::{Participant, Session, TargetLanguageMap, UserId};

    struct FixedRepository {
        targets: TargetLanguageMap,
    }

    #[async_trait]
    impl CallRepository for FixedRepository {
        async fn get_target_languages(
            &self,
            _session_id: &voice_relay_core::SessionId,
            _speaker_id: &UserId,
            _include_speaker: bool,
        ) -> TargetLanguageMap {
            self.targets.clone()
        }

        async fn get_participant_language(
            &self,
            _session_id: &voice_relay_core::SessionId,
            _user_id: &UserId,
        ) -> Option<Language> {
            None
        }

        async fn get_call_by_session_id(&self, _session_id: &voice_relay_core::SessionId) -> Option<Session> {
            None
        }

        async fn get_connected_participants(
            &self,
            _session_id: &voice_relay_core::SessionId,
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

    fn transcript(text: &str) -> FinalTranscript {
        FinalTranscript {
            session_id: voice_relay_core::SessionId::from("s1"),
            speaker_id: UserId::from("alice"),
            source_lang: Language::English,
            text: text.to_string(),
            origin: TranscriptOrigin::Streaming,
        }
    }

    fn processor(targets: TargetLanguageMap) -> (Arc<StubVendor>, Arc<CollectingBus>, TranslationProcessor) {
        let vendor = Arc::new(StubVendor::new());
        let repo = Arc::new(FixedRepository { targets });
        let bus = Arc::new(CollectingBus { events: StdMutex::new(Vec::new()) });
        let cache = Arc::new(SynthCache::new(10));
        let proc = TranslationProcessor::new(
            vendor.clone(),
            repo,
            bus.clone(),
            cache,
            TranslationConfig::default(),
            VendorConfig::default(),
        );
        (vendor, bus, proc)
    }

    #[tokio::test]
    async fn empty_transcript_is_dropped_without_publishing() {
        let mut targets = TargetLanguageMap::new();
        targets.insert(Language::Hebrew, vec![UserId::from("bob")]);
        let (_vendor, bus, proc) = processor(targets);
        proc.process(transcript(" ")).await.unwrap();
        assert!(bus.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_transcript_is_processed_once() {
        let mut targets = TargetLanguageMap::new();
        targets.insert(Language::Hebrew, vec![UserId::from("bob")]);
        let (_vendor, bus, proc) = processor(targets);
        proc.process(transcript("hello there")).await.unwrap();
        proc.process(transcript("hello there")).await.unwrap();
        assert_eq!(bus.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_language_target_bypasses_vendor_translate() {
        let mut targets = TargetLanguageMap::new();
        targets.insert(Language::English, vec![UserId::from("alice")]);
        let (vendor, bus, proc) = processor(targets);
        proc.process(transcript("hello there")).await.unwrap();
        assert_eq!(vendor.translate_call_count(), 0);
        let events = bus.events.lock().unwrap();
        match &events[0] {
            SessionBusEvent::Translation { translation, .. } => assert_eq!(translation, "hello there"),
            _ => panic!("expected translation event"),
        }
    }

    #[tokio::test]
    async fn one_language_failure_does_not_block_others() {
        let mut targets = TargetLanguageMap::new();
        targets.insert(Language::Hebrew, vec![UserId::from("bob")]);
        targets.insert(Language::Russian, vec![UserId::from("carl")]);
        let (vendor, bus, proc) = processor(targets);
        vendor.fail_translate_next(Language::Hebrew, 1);
        proc.process(transcript("hello there")).await.unwrap();
        assert_eq!(bus.events.lock().unwrap().len(), 1);
    }
}
