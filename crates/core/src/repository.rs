//! Call Repository: a read-through view over the persistent
//! store. Only the core's read-through is specified; treats the
//! durable user/contact/call-record store itself as an external
//! collaborator named by this interface.

use crate::ids::{SessionId, UserId};
use crate::language::Language;
use crate::session::{Participant, Session};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
}

/// `language -> [listener_user_id]`, read fresh on every STP/BSW query
/// ("not cached across calls (freshness > locality)").
pub type TargetLanguageMap = HashMap<Language, Vec<UserId>>;

#[async_trait]
pub trait CallRepository: Send + Sync + 'static {
    /// Target-language map for `session_id` given the speaker, optionally
    /// including the speaker's own language bucket.
    async fn get_target_languages(
        &self,
        session_id: &SessionId,
        speaker_id: &UserId,
        include_speaker: bool,
    ) -> TargetLanguageMap;

    /// A single participant's configured language, if they are a
    /// participant of `session_id` at all.
    async fn get_participant_language(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> Option<Language>;

    async fn get_call_by_session_id(&self, session_id: &SessionId) -> Option<Session>;

    /// Connected participants of a call, optionally excluding one user
    /// (e.g. the speaker themselves).
    async fn get_connected_participants(
        &self,
        session_id: &SessionId,
        exclude_user_id: Option<&UserId>,
    ) -> Vec<Participant>;
}
