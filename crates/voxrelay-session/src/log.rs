//! Bounded conversation debug log.
//!
//! Purely a debugging aid exposed via `/conversations`; it plays no role in
//! the turn pipeline itself. Bounded to `MAX_CONVERSATIONS` sessions, evicting
//! the oldest session by insertion order once the cap is hit. Backed by an
//! `IndexMap` rather than a `VecDeque` since eviction needs to remove by key,
//! not just from the front.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::Mutex;

use voxrelay_core::{ChatMessage, SessionId};

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationEntry {
    pub session: SessionId,
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

pub struct ConversationLog {
    capacity: usize,
    entries: Mutex<IndexMap<SessionId, ConversationEntry>>,
}

impl ConversationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(voxrelay_core::config::MAX_CONVERSATIONS)
    }

    /// Append a user turn to `session`'s entry, creating it if absent. If
    /// this creates a new entry and the log is now over capacity, evict the
    /// oldest entry (by insertion order, not `session`). Called as soon as a
    /// turn's user text is known, before its debounce/dedup outcome —
    /// so a superseded, cancelled, or failed turn still leaves its question
    /// in the log even though it never gets a recorded answer.
    pub fn record_user(&self, session: &SessionId, user_text: &str) {
        self.append(session, voxrelay_core::Role::User, user_text);
    }

    /// Append an assistant turn to `session`'s entry. Called once a turn's
    /// reply text is known (dedup hit or a completed upstream fetch).
    pub fn record_assistant(&self, session: &SessionId, assistant_text: &str) {
        self.append(session, voxrelay_core::Role::Assistant, assistant_text);
    }

    /// Append `user` and `assistant` turns together, as a single call. Used
    /// by tests that don't care about the user/assistant logging split.
    pub fn record_turn(&self, session: &SessionId, user_text: &str, assistant_text: &str) {
        self.record_user(session, user_text);
        self.record_assistant(session, assistant_text);
    }

    fn append(&self, session: &SessionId, role: voxrelay_core::Role, content: &str) {
        let mut entries = self.entries.lock().unwrap();

        if !entries.contains_key(session) && entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }

        let entry = entries.entry(session.clone()).or_insert_with(|| ConversationEntry {
            session: session.clone(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        });
        entry.messages.push(ChatMessage {
            role,
            content: content.to_string(),
        });
        entry.updated_at = Utc::now();

        // Re-insertion must not change eviction order for an existing key.
        entries.move_index(entries.get_index_of(session).unwrap(), entries.len() - 1);
    }

    /// All sessions currently logged, oldest first.
    pub fn list(&self) -> Vec<ConversationEntry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    /// Remove `session`'s entry entirely. Returns `true` if it existed.
    pub fn delete(&self, session: &SessionId) -> bool {
        self.entries.lock().unwrap().shift_remove(session).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_turn_creates_and_appends() {
        let log = ConversationLog::new(10);
        let session = SessionId("u1".to_string());
        log.record_turn(&session, "hi", "hello there");
        let entries = log.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].messages.len(), 2);
    }

    #[test]
    fn capacity_evicts_oldest_session() {
        let log = ConversationLog::new(2);
        log.record_turn(&SessionId("a".to_string()), "hi", "hey");
        log.record_turn(&SessionId("b".to_string()), "hi", "hey");
        log.record_turn(&SessionId("c".to_string()), "hi", "hey");

        let entries = log.list();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.session.as_str() != "a"));
    }

    #[test]
    fn re_recording_a_session_moves_it_to_newest() {
        let log = ConversationLog::new(2);
        log.record_turn(&SessionId("a".to_string()), "hi", "hey");
        log.record_turn(&SessionId("b".to_string()), "hi", "hey");
        log.record_turn(&SessionId("a".to_string()), "again", "again hey");
        log.record_turn(&SessionId("c".to_string()), "hi", "hey");

        let entries = log.list();
        let sessions: Vec<_> = entries.iter().map(|e| e.session.as_str().to_string()).collect();
        assert!(sessions.contains(&"a".to_string()));
        assert!(!sessions.contains(&"b".to_string()));
    }

    #[test]
    fn record_user_alone_logs_the_question_with_no_reply() {
        let log = ConversationLog::new(10);
        let session = SessionId("u1".to_string());
        log.record_user(&session, "hi");
        let entries = log.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].messages.len(), 1);
        assert_eq!(entries[0].messages[0].role, voxrelay_core::Role::User);
    }

    #[test]
    fn record_assistant_appends_to_the_entry_opened_by_record_user() {
        let log = ConversationLog::new(10);
        let session = SessionId("u1".to_string());
        log.record_user(&session, "hi");
        log.record_assistant(&session, "hello there");
        let entries = log.list();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].messages.len(), 2);
        assert_eq!(entries[0].messages[1].role, voxrelay_core::Role::Assistant);
    }

    #[test]
    fn delete_removes_entry() {
        let log = ConversationLog::new(10);
        let session = SessionId("u1".to_string());
        log.record_turn(&session, "hi", "hello");
        assert!(log.delete(&session));
        assert!(log.is_empty());
        assert!(!log.delete(&session));
    }
}
