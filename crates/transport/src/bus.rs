//! Session Bus: publish/subscribe by session identifier.
//! One topic per `session_id`; best-effort delivery, no replay, no
//! persistence. A lagging subscriber simply misses events rather than
//! blocking the publisher.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use voice_relay_core::{BusPublisher, SessionBusEvent, SessionId};

pub struct SessionBus {
    topics: DashMap<SessionId, broadcast::Sender<SessionBusEvent>>,
    capacity: usize,
}

impl SessionBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender_for(&self, session_id: &SessionId) -> broadcast::Sender<SessionBusEvent> {
        self.topics
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to one session's topic. Returns a fresh receiver that only
    /// sees events published after this call ("no replay").
    pub fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<SessionBusEvent> {
        self.sender_for(session_id).subscribe()
    }

    /// Drop a topic once nobody cares, so idle sessions don't accumulate
    /// empty `broadcast::Sender`s.
    pub fn close_topic(&self, session_id: &SessionId) {
        self.topics.remove(session_id);
    }
}

impl Default for SessionBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl BusPublisher for SessionBus {
    async fn publish(&self, event: SessionBusEvent) {
        let topic = event.topic();
        let sender = self.sender_for(&topic);
        // No receivers is not an error.
        let _ = sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_relay_core::UserId;

    #[tokio::test]
    async fn subscriber_receives_events_published_after_subscribe() {
        let bus = SessionBus::new(16);
        let session_id = SessionId::from("s1");
        let mut rx = bus.subscribe(&session_id);

        bus.publish(SessionBusEvent::CallEnded {
            session_id: session_id.clone(),
            reason: "done".to_string(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        matches!(event, SessionBusEvent::CallEnded { .. });
    }

    #[tokio::test]
    async fn distinct_sessions_do_not_cross_topics() {
        let bus = SessionBus::new(16);
        let mut rx_a = bus.subscribe(&SessionId::from("a"));
        let _rx_b = bus.subscribe(&SessionId::from("b"));

        bus.publish(SessionBusEvent::ParticipantLeft {
            session_id: SessionId::from("a"),
            user_id: UserId::from("alice"),
        })
        .await;

        let event = tokio::time::timeout(std::time::Duration::from_millis(50), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        matches!(event, SessionBusEvent::ParticipantLeft { .. });
    }
}
