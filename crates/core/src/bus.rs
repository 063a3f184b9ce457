//! Session bus event shapes.
//!
//! One topic per `session_id`; best-effort delivery, no replay, no
//! persistence.

use crate::ids::{SessionId, UserId};
use crate::language::Language;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tagged union of everything published on a session's bus topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionBusEvent {
    #[serde(rename = "interim_transcript")]
    InterimTranscript {
        session_id: SessionId,
        speaker_id: UserId,
        text: String,
        source_lang: Language,
        is_final: bool,
        confidence: f32,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "interim_clear")]
    InterimClear {
        session_id: SessionId,
        speaker_id: UserId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "translation")]
    Translation {
        session_id: SessionId,
        speaker_id: UserId,
        recipient_ids: Vec<UserId>,
        transcript: String,
        translation: String,
        /// Base64-encoded for this JSON transport; present iff synthesis
        /// succeeded ("the event is still emitted with audio absent").
        audio_content: Option<String>,
        source_lang: Language,
        target_lang: Language,
        is_streaming: bool,
        has_context: bool,
    },

    #[serde(rename = "participant_joined")]
    ParticipantJoined {
        session_id: SessionId,
        user_id: UserId,
        language: Language,
    },

    #[serde(rename = "participant_left")]
    ParticipantLeft {
        session_id: SessionId,
        user_id: UserId,
    },

    #[serde(rename = "mute_status_changed")]
    MuteStatusChanged {
        session_id: SessionId,
        user_id: UserId,
        muted: bool,
    },

    #[serde(rename = "call_ended")]
    CallEnded {
        session_id: SessionId,
        reason: String,
    },

    #[serde(rename = "incoming_call")]
    IncomingCall {
        session_id: SessionId,
        caller_id: UserId,
        callee_id: UserId,
    },

    #[serde(rename = "contact_request")]
    ContactRequest {
        from_user_id: UserId,
        to_user_id: UserId,
    },

    #[serde(rename = "user_status_changed")]
    UserStatusChanged { user_id: UserId, online: bool },
}

impl SessionBusEvent {
    /// The topic this event is published on. Most events carry an explicit
    /// `session_id`; contact/presence events not scoped to a call use the
    /// reserved `lobby` topic.
    pub fn topic(&self) -> SessionId {
        match self {
            SessionBusEvent::InterimTranscript { session_id, .. }
            | SessionBusEvent::InterimClear { session_id, .. }
            | SessionBusEvent::Translation { session_id, .. }
            | SessionBusEvent::ParticipantJoined { session_id, .. }
            | SessionBusEvent::ParticipantLeft { session_id, .. }
            | SessionBusEvent::MuteStatusChanged { session_id, .. }
            | SessionBusEvent::CallEnded { session_id, .. }
            | SessionBusEvent::IncomingCall { session_id, .. } => session_id.clone(),
            SessionBusEvent::ContactRequest { .. } | SessionBusEvent::UserStatusChanged { .. } => {
                SessionId::from(SessionId::LOBBY)
            }
        }
    }
}

/// Abstraction over the Session Bus's publish side, so the
/// translation fan-out primitives in `voice-relay-pipeline` don't need a
/// dependency on `voice-relay-transport`'s concrete fan-out implementation.
#[async_trait]
pub trait BusPublisher: Send + Sync + 'static {
    async fn publish(&self, event: SessionBusEvent);
}
