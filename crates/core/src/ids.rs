//! Structural identifiers.
//!
//! The source this was distilled from keys maps with ad-hoc
//! `"session_id:speaker_id"` strings everywhere. `StreamKey` replaces that
//! with a structurally-equal value type so maps can take it as a key
//! directly ("string-keyed maps as implicit graphs").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque session identifier. The reserved value `"lobby"` denotes the
/// distinguished presence-only session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub const LOBBY: &'static str = "lobby";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn is_lobby(&self) -> bool {
        self.0 == Self::LOBBY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque participant identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Structural key for everything keyed by `(session_id, speaker_id)`:
/// `StreamContext`, `SegmentBuffer`, per-speaker chunkers and interim
/// sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub session_id: SessionId,
    pub speaker_id: UserId,
}

impl StreamKey {
    pub fn new(session_id: SessionId, speaker_id: UserId) -> Self {
        Self {
            session_id,
            speaker_id,
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session_id, self.speaker_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lobby_session_is_recognized() {
        assert!(SessionId::from("lobby").is_lobby());
        assert!(!SessionId::from("call-1").is_lobby());
    }

    #[test]
    fn stream_key_equality_is_structural() {
        let a = StreamKey::new(SessionId::from("s1"), UserId::from("u1"));
        let b = StreamKey::new(SessionId::from("s1"), UserId::from("u1"));
        assert_eq!(a, b);
        assert_eq!(format!("{a}"), "s1:u1");
    }
}
