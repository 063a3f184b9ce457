//! Connection Fabric: registers per-`(session_id, user_id)`
//! connections, subscribes each to its session's bus topic, and filters
//! outbound events by recipient identity and language before handing them
//! to the connection's own outbound queue.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use voice_relay_core::{Language, SessionBusEvent, SessionId, UserId};

use crate::bus::SessionBus;

struct Connection {
    language: Arc<Mutex<Language>>,
    task: JoinHandle<()>,
}

/// Delivery filter for one subscriber.
fn should_deliver(event: &SessionBusEvent, user_id: &UserId, language: Language) -> bool {
    match event {
        SessionBusEvent::Translation {
            recipient_ids,
            target_lang,
            ..
        } => recipient_ids.contains(user_id) && *target_lang == language,
        SessionBusEvent::InterimTranscript { speaker_id, .. }
        | SessionBusEvent::InterimClear { speaker_id, .. } => speaker_id != user_id,
        _ => true,
    }
}

pub struct ConnectionFabric {
    bus: Arc<SessionBus>,
    connections: DashMap<(SessionId, UserId), Connection>,
}

impl ConnectionFabric {
    pub fn new(bus: Arc<SessionBus>) -> Self {
        Self {
            bus,
            connections: DashMap::new(),
        }
    }

    /// Register a connection, subscribing it to `session_id`'s bus topic.
    /// Returns the receiver the caller's socket-write loop should drain.
    pub fn register(
        &self,
        session_id: SessionId,
        user_id: UserId,
        language: Language,
        outbound_capacity: usize,
    ) -> mpsc::Receiver<SessionBusEvent> {
        let (tx, rx) = mpsc::channel(outbound_capacity);
        let mut bus_rx = self.bus.subscribe(&session_id);
        let filter_user = user_id.clone();
        let language_cell = Arc::new(Mutex::new(language));
        let language_for_task = language_cell.clone();

        let task = tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(event) => {
                        let current_lang = *language_for_task.lock();
                        if should_deliver(&event, &filter_user, current_lang) && tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.connections.insert(
            (session_id, user_id),
            Connection {
                language: language_cell,
                task,
            },
        );
        rx
    }

    pub fn unregister(&self, session_id: &SessionId, user_id: &UserId) {
        if let Some((_, connection)) = self.connections.remove(&(session_id.clone(), user_id.clone())) {
            connection.task.abort();
        }
    }

    /// Update the language a connection's filter matches against, e.g.
    /// after a participant changes their call language mid-session.
    pub fn update_language(&self, session_id: &SessionId, user_id: &UserId, language: Language) {
        if let Some(connection) = self.connections.get(&(session_id.clone(), user_id.clone())) {
            *connection.language.lock() = language;
        }
    }

    pub fn is_registered(&self, session_id: &SessionId, user_id: &UserId) -> bool {
        self.connections.contains_key(&(session_id.clone(), user_id.clone()))
    }

    pub fn connection_count(&self, session_id: &SessionId) -> usize {
        self.connections.iter().filter(|entry| &entry.key().0 == session_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use voice_relay_core::BusPublisher;

    #[tokio::test]
    async fn translation_event_only_reaches_matching_recipient_and_language() {
        let bus = Arc::new(SessionBus::new(16));
        let fabric = ConnectionFabric::new(bus.clone());
        let session_id = SessionId::from("s1");

        let mut bob_rx = fabric.register(session_id.clone(), UserId::from("bob"), Language::Hebrew, 8);
        let mut carl_rx = fabric.register(session_id.clone(), UserId::from("carl"), Language::Russian, 8);

        // give the subscriber tasks a moment to attach before publishing
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(SessionBusEvent::Translation {
            session_id: session_id.clone(),
            speaker_id: UserId::from("alice"),
            recipient_ids: vec![UserId::from("bob")],
            transcript: "hi".into(),
            translation: "שלום".into(),
            audio_content: None,
            source_lang: Language::English,
            target_lang: Language::Hebrew,
            is_streaming: true,
            has_context: false,
        })
        .await;

        let received = tokio::time::timeout(Duration::from_millis(200), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, SessionBusEvent::Translation { .. }));

        let nothing = tokio::time::timeout(Duration::from_millis(50), carl_rx.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn interim_events_are_not_delivered_to_the_speaker() {
        let bus = Arc::new(SessionBus::new(16));
        let fabric = ConnectionFabric::new(bus.clone());
        let session_id = SessionId::from("s1");

        let mut alice_rx = fabric.register(session_id.clone(), UserId::from("alice"), Language::English, 8);
        let mut bob_rx = fabric.register(session_id.clone(), UserId::from("bob"), Language::Hebrew, 8);
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(SessionBusEvent::InterimTranscript {
            session_id: session_id.clone(),
            speaker_id: UserId::from("alice"),
            text: "hel".into(),
            source_lang: Language::English,
            is_final: false,
            confidence: 0.5,
            timestamp: chrono::Utc::now(),
        })
        .await;

        let nothing = tokio::time::timeout(Duration::from_millis(50), alice_rx.recv()).await;
        assert!(nothing.is_err());

        let received = tokio::time::timeout(Duration::from_millis(200), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(received, SessionBusEvent::InterimTranscript { .. }));
    }
}
