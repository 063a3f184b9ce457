//! Interim Session: the streaming STT driver for one `(session_id,
//! speaker_id)`. Publishes interim captions as they arrive, rate
//! limits and dedups them, and on each final result clears the caption and
//! invokes the registered callback exactly once.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use voice_relay_config::InterimConfig;
use voice_relay_core::{
    BusPublisher, FinalTranscript, Language, SessionBusEvent, SpeechVendor, StreamKey,
    TranscriptOrigin,
};

/// Invoked exactly once per final transcript; isolated from the driver loop
/// so a panicking callback can't take down the session.
pub type FinalCallback = Arc<dyn Fn(FinalTranscript) + Send + Sync>;

struct Shared {
    callback: Mutex<FinalCallback>,
}

struct RunningHandle {
    task: JoinHandle<()>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    shared: Arc<Shared>,
}

enum State {
    None,
    Running(RunningHandle),
    Ended,
}

pub struct InterimSession {
    key: StreamKey,
    config: InterimConfig,
    vendor: Arc<dyn SpeechVendor>,
    bus: Arc<dyn BusPublisher>,
    state: Mutex<State>,
}

impl InterimSession {
    pub fn new(
        key: StreamKey,
        config: InterimConfig,
        vendor: Arc<dyn SpeechVendor>,
        bus: Arc<dyn BusPublisher>,
    ) -> Self {
        Self {
            key,
            config,
            vendor,
            bus,
            state: Mutex::new(State::None),
        }
    }

    /// Start driving streaming STT for `source_lang`. If a previous task is
    /// still alive, only its callback is refreshed; if it has finished
    /// (crash, timeout), it is discarded and a fresh task is started ("Session restart").
    pub fn start_session(&self, source_lang: Language, on_final: FinalCallback) {
        let mut state = self.state.lock();
        if let State::Running(handle) = &*state {
            if !handle.task.is_finished() {
                *handle.shared.callback.lock() = on_final;
                return;
            }
        }

        let (audio_tx, audio_rx) = mpsc::channel(32);
        let (result_tx, result_rx) = mpsc::channel(32);
        let shared = Arc::new(Shared {
                callback: Mutex::new(on_final),
        });

        let vendor = self.vendor.clone();
        let bus = self.bus.clone();
        let key = self.key.clone();
        let config = self.config.clone();
        let shared_for_task = shared.clone();

        let task = tokio::spawn(async move {
                let driver = tokio::spawn(async move {
                        if let Err(err) = vendor.streaming_transcribe(source_lang, audio_rx, result_tx).await {
                            error!(error = %err, "streaming STT driver ended with error");
                        }
                });
                Self::run_result_loop(key, config, source_lang, bus, shared_for_task, result_rx).await;
                let _ = driver.await;
        });

        *state = State::Running(RunningHandle {
                task,
                audio_tx,
                shared,
        });
    }

    /// Feed one PCM16 chunk into the active streaming session; a no-op if
    /// no session is running. Non-blocking: a full channel drops the chunk
    /// rather than stalling the audio ingestion loop.
    pub fn feed(&self, chunk: Vec<u8>) {
        let state = self.state.lock();
        if let State::Running(handle) = &*state {
            let _ = handle.audio_tx.try_send(chunk);
        }
    }

    /// The sentinel "end of utterance" frame.
    pub fn signal_end_of_utterance(&self) {
        self.feed(Vec::new());
    }

    pub fn stop_session(&self) {
        let mut state = self.state.lock();
        if let State::Running(handle) = &*state {
            handle.task.abort();
        }
        *state = State::Ended;
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.state.lock(), State::Running(handle) if !handle.task.is_finished())
    }

    async fn run_result_loop(
        key: StreamKey,
        config: InterimConfig,
        source_lang: Language,
        bus: Arc<dyn BusPublisher>,
        shared: Arc<Shared>,
        mut results: mpsc::Receiver<voice_relay_core::StreamingResult>,
    ) {
        let mut last_published: Option<String> = None;
        let mut last_publish_at: Option<Instant> = None;
        let publish_interval = Duration::from_millis(config.publish_interval_ms);

        while let Some(result) = results.recv().await {
            if result.text.chars().count() < config.min_chars_to_publish {
                continue;
            }

            let text = truncate_interim_text(&result.text, config.max_text_length);

            if !result.is_final {
                if last_published.as_deref() == Some(text.as_str()) {
                    continue;
                }
                if let Some(at) = last_publish_at {
                    if at.elapsed() < publish_interval {
                        continue;
                    }
                }
            }

            bus.publish(SessionBusEvent::InterimTranscript {
                session_id: key.session_id.clone(),
                speaker_id: key.speaker_id.clone(),
                text: text.clone(),
                source_lang,
                is_final: result.is_final,
                confidence: result.confidence,
                timestamp: Utc::now(),
            })
            .await;
            last_published = Some(text.clone());
            last_publish_at = Some(Instant::now());

            if result.is_final {
                bus.publish(SessionBusEvent::InterimClear {
                    session_id: key.session_id.clone(),
                    speaker_id: key.speaker_id.clone(),
                    timestamp: Utc::now(),
                })
                .await;

                let callback = shared.callback.lock().clone();
                let transcript = FinalTranscript {
                    session_id: key.session_id.clone(),
                    speaker_id: key.speaker_id.clone(),
                    source_lang,
                    text,
                    origin: TranscriptOrigin::Streaming,
                };
                let outcome =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(transcript)));
                if outcome.is_err() {
                    error!("on_final_transcript callback panicked; session continues");
                }
            }
        }
    }
}

/// Cap a published interim caption at `max_chars`, marking the cut with a
/// trailing ellipsis ("Truncate if too long").
fn truncate_interim_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::StubVendor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use voice_relay_core::{SessionId, UserId};

    struct CollectingBus {
        events: StdMutex<Vec<SessionBusEvent>>,
    }

    #[async_trait::async_trait]
    impl BusPublisher for CollectingBus {
        async fn publish(&self, event: SessionBusEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn key() -> StreamKey {
        StreamKey::new(SessionId::from("s1"), UserId::from("alice"))
    }

    #[tokio::test]
    async fn final_transcript_triggers_callback_exactly_once() {
        let vendor = Arc::new(StubVendor::new());
        vendor.set_default_transcript("hello world");
        let bus = Arc::new(CollectingBus {
                events: StdMutex::new(Vec::new()),
        });
        let session = InterimSession::new(key(), InterimConfig::default(), vendor, bus.clone());

        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        session.start_session(
            Language::English,
            Arc::new(move |_final: FinalTranscript| {
                    calls2.fetch_add(1, Ordering::SeqCst);
            }),
        );

        session.feed(vec![1u8; 10]);
        session.signal_end_of_utterance();

        for _ in 0..20 {
            if calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let events = bus.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionBusEvent::InterimClear { .. })));
    }

    #[tokio::test]
    async fn restart_while_running_only_swaps_callback() {
        let vendor = Arc::new(StubVendor::new());
        let bus = Arc::new(CollectingBus {
                events: StdMutex::new(Vec::new()),
        });
        let session = InterimSession::new(key(), InterimConfig::default(), vendor, bus);
        session.start_session(Language::English, Arc::new(|_| {}));
        assert!(session.is_running());
        session.start_session(Language::English, Arc::new(|_| {}));
        assert!(session.is_running());
    }

    #[test]
    fn truncate_interim_text_leaves_short_text_unchanged() {
        assert_eq!(truncate_interim_text("hello", 500), "hello");
    }

    #[test]
    fn truncate_interim_text_marks_the_cut_with_an_ellipsis() {
        let long = "a".repeat(10);
        assert_eq!(truncate_interim_text(&long, 4), "aaaa...");
    }
}
