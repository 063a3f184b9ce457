//! `InMemoryCallRepository`: the `CallRepository` read-through plus the
//! mutation surface the Orchestrator uses to maintain it.

use async_trait::async_trait;
use dashmap::DashMap;
use voice_relay_core::{
    CallRepository, Language, Participant, Session, SessionId, TargetLanguageMap, UserId,
};

#[derive(Default)]
pub struct InMemoryCallRepository {
    sessions: DashMap<SessionId, Session>,
    participants: DashMap<(SessionId, UserId), Participant>,
}

impl InMemoryCallRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_session(&self, session_id: SessionId, call_language: Language) -> Session {
        let session = Session::new(session_id.clone(), call_language);
        self.sessions.insert(session_id, session.clone());
        session
    }

    /// Mark a session ended ("if remaining connected participants
    /// < 2, mark session ended"). The row is retained, not removed.
    pub fn end_session(&self, session_id: &SessionId) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.active = false;
        }
    }

    pub fn remove_session(&self, session_id: &SessionId) {
        self.sessions.remove(session_id);
        self.participants.retain(|(sid, _), _| sid != session_id);
    }

    /// Add or reconnect a participant. Existing rows for the same
    /// `(session_id, user_id)` are overwritten with `connected = true`.
    pub fn upsert_participant(&self, session_id: SessionId, user_id: UserId, language: Language) -> Participant {
        let participant = Participant::new(session_id.clone(), user_id.clone(), language);
        self.participants.insert((session_id, user_id), participant.clone());
        participant
    }

    pub fn set_connected(&self, session_id: &SessionId, user_id: &UserId, connected: bool) {
        if let Some(mut participant) = self
            .participants
            .get_mut(&(session_id.clone(), user_id.clone()))
        {
            participant.connected = connected;
        }
    }

    pub fn set_muted(&self, session_id: &SessionId, user_id: &UserId, muted: bool) {
        if let Some(mut participant) = self
            .participants
            .get_mut(&(session_id.clone(), user_id.clone()))
        {
            participant.muted = muted;
        }
    }

    /// Number of currently connected participants in a session; used by
    /// the Orchestrator's `< 2 remaining -> end session` rule.
    pub fn connected_count(&self, session_id: &SessionId) -> usize {
        self.participants
            .iter()
            .filter(|entry| &entry.key().0 == session_id && entry.value().connected)
            .count()
    }
}

#[async_trait]
impl CallRepository for InMemoryCallRepository {
    async fn get_target_languages(
        &self,
        session_id: &SessionId,
        speaker_id: &UserId,
        include_speaker: bool,
    ) -> TargetLanguageMap {
        let mut map = TargetLanguageMap::new();
        for entry in self.participants.iter() {
            let (sid, uid) = entry.key();
            if sid != session_id || !entry.value().connected {
                continue;
            }
            if uid == speaker_id && !include_speaker {
                continue;
            }
            map.entry(entry.value().language).or_default().push(uid.clone());
        }
        map
    }

    async fn get_participant_language(&self, session_id: &SessionId, user_id: &UserId) -> Option<Language> {
        self.participants
            .get(&(session_id.clone(), user_id.clone()))
            .map(|p| p.language)
    }

    async fn get_call_by_session_id(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    async fn get_connected_participants(
        &self,
        session_id: &SessionId,
        exclude_user_id: Option<&UserId>,
    ) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|entry| &entry.key().0 == session_id && entry.value().connected)
            .filter(|entry| exclude_user_id.map_or(true, |excluded| &entry.key().1 != excluded))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid() -> SessionId {
        SessionId::from("s1")
    }

    #[tokio::test]
    async fn target_languages_excludes_speaker_unless_requested() {
        let repo = InMemoryCallRepository::new();
        repo.create_session(sid(), Language::English);
        repo.upsert_participant(sid(), UserId::from("alice"), Language::English);
        repo.upsert_participant(sid(), UserId::from("bob"), Language::Hebrew);

        let without_speaker = repo.get_target_languages(&sid(), &UserId::from("alice"), false).await;
        assert!(!without_speaker
            .get(&Language::English)
            .map(|v| v.contains(&UserId::from("alice")))
            .unwrap_or(false));

        let with_speaker = repo.get_target_languages(&sid(), &UserId::from("alice"), true).await;
        assert!(with_speaker.get(&Language::English).unwrap().contains(&UserId::from("alice")));
        assert_eq!(with_speaker.get(&Language::Hebrew).unwrap(), &vec![UserId::from("bob")]);
    }

    #[tokio::test]
    async fn disconnected_participants_are_excluded_from_targets_and_lists() {
        let repo = InMemoryCallRepository::new();
        repo.create_session(sid(), Language::English);
        repo.upsert_participant(sid(), UserId::from("alice"), Language::English);
        repo.upsert_participant(sid(), UserId::from("bob"), Language::Hebrew);
        repo.set_connected(&sid(), &UserId::from("bob"), false);

        let targets = repo.get_target_languages(&sid(), &UserId::from("alice"), true).await;
        assert!(targets.get(&Language::Hebrew).is_none());

        let connected = repo.get_connected_participants(&sid(), None).await;
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].user_id, UserId::from("alice"));
    }

    #[tokio::test]
    async fn connected_count_drives_session_end_threshold() {
        let repo = InMemoryCallRepository::new();
        repo.create_session(sid(), Language::English);
        repo.upsert_participant(sid(), UserId::from("alice"), Language::English);
        repo.upsert_participant(sid(), UserId::from("bob"), Language::Hebrew);
        assert_eq!(repo.connected_count(&sid()), 2);
        repo.set_connected(&sid(), &UserId::from("bob"), false);
        assert_eq!(repo.connected_count(&sid()), 1);
    }

    #[tokio::test]
    async fn get_call_by_session_id_reflects_end_session() {
        let repo = InMemoryCallRepository::new();
        repo.create_session(sid(), Language::English);
        repo.end_session(&sid());
        let session = repo.get_call_by_session_id(&sid()).await.unwrap();
        assert!(!session.active);
    }
}
