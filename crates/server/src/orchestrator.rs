//! Orchestrator: owns the session table, per-participant runtime
//! state, and the connection-to-session reverse index. Glues the
//! Connection Fabric to the Call Repository and the pipeline's per-speaker
//! chunker + interim session pair.
//!
//! The session table itself is not duplicated here: `InMemoryCallRepository`
//! already is the session/participant store, so "owns the session
//! table" is realized as the Orchestrator holding the shared repository
//! handle and driving its mutation surface, rather than a second map.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voice_relay_config::{ChunkerConfig, InterimConfig, OrchestratorConfig};
use voice_relay_core::{
    BusPublisher, CallRepository, FinalTranscript, Language, SessionBusEvent, SessionId,
    SpeechVendor, StreamKey, UserId,
};
use voice_relay_persistence::InMemoryCallRepository;
use voice_relay_pipeline::{BatchSegmentWorker, InterimSession, PauseChunker, TranslationProcessor, VoiceActivityDetector};
use voice_relay_transport::ConnectionFabric;

struct SpeakerRuntime {
    chunker: Arc<PauseChunker>,
    interim: Arc<InterimSession>,
    silence_poll: JoinHandle<()>,
}

/// Everything the Orchestrator wires together per connection and per
/// active speaker.
pub struct Orchestrator {
    repository: Arc<InMemoryCallRepository>,
    bus: Arc<dyn BusPublisher>,
    fabric: Arc<ConnectionFabric>,
    vendor: Arc<dyn SpeechVendor>,
    vad: Arc<VoiceActivityDetector>,
    translation_processor: Arc<TranslationProcessor>,
    bsw: Arc<BatchSegmentWorker>,
    chunker_config: ChunkerConfig,
    interim_config: InterimConfig,
    orchestrator_config: OrchestratorConfig,
    speakers: DashMap<StreamKey, SpeakerRuntime>,
    /// Scheduled "went offline" presence timers, cancelled by a reconnect
    /// within the grace period.
    presence_timers: DashMap<UserId, CancellationToken>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<InMemoryCallRepository>,
        bus: Arc<dyn BusPublisher>,
        fabric: Arc<ConnectionFabric>,
        vendor: Arc<dyn SpeechVendor>,
        vad: Arc<VoiceActivityDetector>,
        translation_processor: Arc<TranslationProcessor>,
        bsw: Arc<BatchSegmentWorker>,
        chunker_config: ChunkerConfig,
        interim_config: InterimConfig,
        orchestrator_config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            bus,
            fabric,
            vendor,
            vad,
            translation_processor,
            bsw,
            chunker_config,
            interim_config,
            orchestrator_config,
            speakers: DashMap::new(),
            presence_timers: DashMap::new(),
        }
    }

    /// Entry point for a new connection. Creates
    /// the participant row if needed, cancels any pending offline timer for
    /// this user, registers with the Connection Fabric, and announces
    /// presence.
    pub async fn handle_connection(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        language: Language,
        outbound_capacity: usize,
    ) -> tokio::sync::mpsc::Receiver<SessionBusEvent> {
        if let Some((_, token)) = self.presence_timers.remove(user_id) {
            token.cancel();
            debug!(user_id = %user_id, "cancelled scheduled offline timer on reconnect");
        }

        if !session_id.is_lobby() {
            self.repository
                .upsert_participant(session_id.clone(), user_id.clone(), language);
            self.bus
                .publish(SessionBusEvent::ParticipantJoined {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    language,
                })
                .await;
        }

        self.bus
            .publish(SessionBusEvent::UserStatusChanged {
                user_id: user_id.clone(),
                online: true,
            })
            .await;

        self.fabric
            .register(session_id.clone(), user_id.clone(), language, outbound_capacity)
    }

    /// Mirror image of `handle_connection`: mark the
    /// participant disconnected, schedule a delayed offline presence event,
    /// and end the session once too few participants remain connected.
    pub async fn on_disconnect(&self, session_id: &SessionId, user_id: &UserId) {
        self.fabric.unregister(session_id, user_id);

        if !session_id.is_lobby() {
            self.repository.set_connected(session_id, user_id, false);
            self.bus
                .publish(SessionBusEvent::ParticipantLeft {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                })
                .await;

            if self.repository.connected_count(session_id) < self.orchestrator_config.min_participants {
                self.repository.end_session(session_id);
                metrics::gauge!(voice_relay_core::metric_names::ACTIVE_SESSIONS).decrement(1.0);
                self.bus
                    .publish(SessionBusEvent::CallEnded {
                        session_id: session_id.clone(),
                        reason: "insufficient_participants".to_string(),
                    })
                    .await;
                self.teardown_session(session_id);
            }
        }

        self.schedule_offline(user_id.clone());
    }

    fn schedule_offline(&self, user_id: UserId) {
        let token = CancellationToken::new();
        self.presence_timers.insert(user_id.clone(), token.clone());
        let bus = self.bus.clone();
        let grace = Duration::from_secs(self.orchestrator_config.offline_grace_period_sec);
        tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(grace) => {
                        bus.publish(SessionBusEvent::UserStatusChanged { user_id, online: false }).await;
                    }
                    _ = token.cancelled() => {}
                }
        });
    }

    /// Drop every speaker runtime belonging to `session_id` (called once a
    /// call ends).
    fn teardown_session(&self, session_id: &SessionId) {
        let keys: Vec<StreamKey> = self
            .speakers
            .iter()
            .filter(|entry| &entry.key().session_id == session_id)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            self.drop_speaker(&key);
        }
    }

    fn drop_speaker(&self, key: &StreamKey) {
        if let Some((_, runtime)) = self.speakers.remove(key) {
            runtime.chunker.shutdown();
            runtime.interim.stop_session();
            runtime.silence_poll.abort();
        }
        self.translation_processor.drop_context(key);
        self.bsw.drop_buffer(key);
    }

    /// Get or lazily create the chunker + interim session pair for one
    /// speaker, wiring both to the shared translation fan-out ("extract
    /// a `TranslationProcessor` that both paths invoke").
    ///
    /// A pause or silence segment is also treated as the streaming driver's
    /// end-of-utterance boundary: the same VAD-informed signal drives both
    /// the batch path (a `Segment`) and the streaming path (`signal_end_of_
    /// utterance`), since they observe the same underlying silence.
    pub fn ensure_speaker(&self, key: StreamKey, source_lang: Language) {
        if self.speakers.contains_key(&key) {
            return;
        }

        let bsw = self.bsw.clone();
        let chunker_key = key.clone();
        let interim_holder: Arc<once_cell::sync::OnceCell<Arc<InterimSession>>> =
        Arc::new(once_cell::sync::OnceCell::new());
        let interim_holder_for_chunker = interim_holder.clone();

        let chunker = Arc::new(PauseChunker::new(
                chunker_key,
                self.chunker_config.clone(),
                self.vad.clone(),
                move |segment| {
                    use voice_relay_core::TriggerReason;
                    let is_utterance_boundary =
                    matches!(segment.trigger_reason, TriggerReason::Pause | TriggerReason::Silence);
                    if is_utterance_boundary {
                        if let Some(interim) = interim_holder_for_chunker.get() {
                            interim.signal_end_of_utterance();
                        }
                    }
                    let bsw = bsw.clone();
                    tokio::spawn(async move {
                            bsw.process_segment(segment).await;
                    });
                },
        ));

        let interim = Arc::new(InterimSession::new(
                key.clone(),
                self.interim_config.clone(),
                self.vendor.clone(),
                self.bus.clone(),
        ));
        let _ = interim_holder.set(interim.clone());

        let processor = self.translation_processor.clone();
        let on_final = Arc::new(move |transcript: FinalTranscript| {
                let processor = processor.clone();
                tokio::spawn(async move {
                        if let Err(err) = processor.process(transcript).await {
                            warn!(error = %err, "translation processor failed for streaming final");
                        }
                });
        });
        interim.start_session(source_lang, on_final);

        let poll_chunker = chunker.clone();
        let poll_lang = source_lang;
        let silence_poll = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(200));
                loop {
                    ticker.tick().await;
                    poll_chunker.check_silence_timeout(poll_lang);
                }
        });

        self.speakers.insert(
            key,
            SpeakerRuntime {
                chunker,
                interim,
                silence_poll,
            },
        );
    }

    /// Feed one inbound PCM16 frame to both the chunker and the streaming
    /// driver for this speaker.
    pub fn feed_audio(&self, key: &StreamKey, frame: &voice_relay_core::AudioFrame) {
        if let Some(runtime) = self.speakers.get(key) {
            runtime.chunker.feed(frame);
            runtime.interim.feed(frame.bytes.clone());
        }
    }

    pub fn flush_speaker(&self, key: &StreamKey, source_lang: Language) {
        if let Some(runtime) = self.speakers.get(key) {
            runtime.chunker.flush(source_lang);
            runtime.interim.stop_session();
        }
    }

    pub fn remove_speaker(&self, key: &StreamKey) {
        self.drop_speaker(key);
    }

    pub fn repository(&self) -> &Arc<InMemoryCallRepository> {
        &self.repository
    }

    pub fn active_speaker_count(&self) -> usize {
        self.speakers.len()
    }

    /// Shutdown sequence ("sends a sentinel into every chunker and Interim
    /// Session; cancels pending vendor calls with bounded wait (<= 1 s)").
    /// The sentinel is `InterimSession::stop_session`; outstanding vendor
    /// calls already in flight are left to the bounded wait below rather
    /// than forcibly aborted, so a call that finishes within the drain
    /// window still completes and publishes normally.
    pub fn begin_shutdown(self: &Arc<Self>) {
        let this = self.clone();
        tokio::spawn(async move {
            let keys: Vec<StreamKey> = this.speakers.iter().map(|entry| entry.key().clone()).collect();
            info!(speakers = keys.len(), "shutdown: stopping active speaker runtimes");
            for key in &keys {
                if let Some(runtime) = this.speakers.get(key) {
                    runtime.chunker.shutdown();
                    runtime.interim.stop_session();
                }
            }
            tokio::time::sleep(Duration::from_secs(this.orchestrator_config.shutdown_drain_timeout_sec)).await;
            for key in &keys {
                this.drop_speaker(key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use voice_relay_config::{TranslationConfig, VendorConfig};
    use voice_relay_pipeline::{StubVendor, SynthCache};
    use voice_relay_transport::SessionBus;

    struct CollectingBus {
        events: StdMutex<Vec<SessionBusEvent>>,
    }

    #[async_trait]
    impl BusPublisher for CollectingBus {
        async fn publish(&self, event: SessionBusEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn build() -> (Arc<Orchestrator>, Arc<CollectingBus>) {
        let repo = Arc::new(InMemoryCallRepository::new());
        let bus: Arc<CollectingBus> = Arc::new(CollectingBus {
                events: StdMutex::new(Vec::new()),
        });
        let session_bus = Arc::new(SessionBus::default());
        let fabric = Arc::new(ConnectionFabric::new(session_bus));
        let vendor = Arc::new(StubVendor::new());
        let vad = Arc::new(VoiceActivityDetector::new(voice_relay_config::VadConfig::default()));
        let cache = Arc::new(SynthCache::new(10));
        let processor = Arc::new(TranslationProcessor::new(
                vendor.clone(),
                repo.clone(),
                bus.clone(),
                cache,
                TranslationConfig::default(),
                VendorConfig::default(),
        ));
        let bsw = Arc::new(BatchSegmentWorker::new(vendor.clone(), processor.clone(), TranslationConfig::default()));

        let orchestrator = Arc::new(Orchestrator::new(
                repo,
                bus.clone(),
                fabric,
                vendor,
                vad,
                processor,
                bsw,
                ChunkerConfig::default(),
                InterimConfig::default(),
                OrchestratorConfig::default(),
        ));
        (orchestrator, bus)
    }

    #[tokio::test]
    async fn session_ends_once_connected_drops_below_minimum() {
        let (orchestrator, bus) = build();
        let session_id = SessionId::from("s1");

        let _a = orchestrator
            .handle_connection(&session_id, &UserId::from("alice"), Language::English, 8)
            .await;
        let _b = orchestrator
            .handle_connection(&session_id, &UserId::from("bob"), Language::Hebrew, 8)
            .await;

        orchestrator.on_disconnect(&session_id, &UserId::from("bob")).await;
        assert_eq!(orchestrator.repository().connected_count(&session_id), 1);

        let events = bus.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionBusEvent::CallEnded { .. })));
    }

    #[tokio::test]
    async fn reconnect_within_grace_cancels_offline_timer() {
        let (orchestrator, bus) = build();
        let session_id = SessionId::from("s1");
        let user_id = UserId::from("alice");

        let _a = orchestrator.handle_connection(&session_id, &user_id, Language::English, 8).await;
        orchestrator.on_disconnect(&session_id, &user_id).await;
        let _a = orchestrator.handle_connection(&session_id, &user_id, Language::English, 8).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = bus.events.lock().unwrap();
        let offline_events = events
            .iter()
            .filter(|e| matches!(e, SessionBusEvent::UserStatusChanged { online: false, .. }))
            .count();
        assert_eq!(offline_events, 0);
    }
}
