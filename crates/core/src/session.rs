//! `Session` and `Participant` entities.

use crate::ids::{SessionId, UserId};
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A call. Created by the Orchestrator on first join, destroyed when the
/// last participant leaves or the fabric ends the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub call_language: Language,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: SessionId, call_language: Language) -> Self {
        Self {
            session_id,
            call_language,
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// A call participant. The row is retained for history after disconnect
/// (`connected = false`); it is never deleted by the Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub language: Language,
    pub muted: bool,
    pub connected: bool,
}

impl Participant {
    pub fn new(session_id: SessionId, user_id: UserId, language: Language) -> Self {
        Self {
            session_id,
            user_id,
            language,
            muted: false,
            connected: true,
        }
    }
}
