//! Ingestion stream: one durable-shaped, append-ordered record
//! log per `(session_id, speaker_id)`, acknowledged by `record_id`.
//! Backed here by a bounded in-memory ring per stream key; the interface
//! is what a production deployment would swap onto a real log.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use voice_relay_core::{Language, SessionId, StreamKey, UserId};

use crate::TransportError;

#[derive(Debug, Clone)]
pub struct IngestionRecord {
    pub session_id: SessionId,
    pub speaker_id: UserId,
    pub source_lang: Language,
    pub data: Vec<u8>,
    pub record_id: u64,
}

pub struct IngestionStream {
    records: DashMap<StreamKey, Mutex<VecDeque<IngestionRecord>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl IngestionStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a record; fails with `IngestionBackpressure` once the
    /// per-key unacknowledged queue is already at capacity.
    pub fn append(
        &self,
        session_id: SessionId,
        speaker_id: UserId,
        source_lang: Language,
        data: Vec<u8>,
    ) -> Result<u64, TransportError> {
        let key = StreamKey::new(session_id.clone(), speaker_id.clone());
        let entry = self.records.entry(key).or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = entry.lock();
        if queue.len() >= self.capacity {
            return Err(TransportError::IngestionBackpressure);
        }

        let record_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        queue.push_back(IngestionRecord {
                session_id,
                speaker_id,
                source_lang,
                data,
                record_id,
        });
        Ok(record_id)
    }

    /// Acknowledge a record, removing it from the pending queue. Acking an
    /// unknown or already-acked id is a silent no-op.
    pub fn ack(&self, key: &StreamKey, record_id: u64) -> Result<(), TransportError> {
        match self.records.get(key) {
            Some(entry) => {
                entry.lock().retain(|record| record.record_id != record_id);
                Ok(())
            }
            None => Err(TransportError::Ack),
        }
    }

    pub fn pending_count(&self, key: &StreamKey) -> usize {
        self.records.get(key).map(|entry| entry.lock().len()).unwrap_or(0)
    }

    pub fn clear(&self, key: &StreamKey) {
        self.records.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> StreamKey {
        StreamKey::new(SessionId::from("s1"), UserId::from("alice"))
    }

    #[test]
    fn append_then_ack_drains_the_queue() {
        let stream = IngestionStream::new(4);
        let id = stream
            .append(SessionId::from("s1"), UserId::from("alice"), Language::English, vec![1, 2])
            .unwrap();
        assert_eq!(stream.pending_count(&key()), 1);
        stream.ack(&key(), id).unwrap();
        assert_eq!(stream.pending_count(&key()), 0);
    }

    #[test]
    fn appends_beyond_capacity_are_rejected() {
        let stream = IngestionStream::new(1);
        stream
            .append(SessionId::from("s1"), UserId::from("alice"), Language::English, vec![1])
            .unwrap();
        let second = stream.append(SessionId::from("s1"), UserId::from("alice"), Language::English, vec![2]);
        assert!(matches!(second, Err(TransportError::IngestionBackpressure)));
    }

    #[test]
    fn ack_of_unknown_key_errors() {
        let stream = IngestionStream::new(4);
        assert!(stream.ack(&key(), 1).is_err());
    }
}
