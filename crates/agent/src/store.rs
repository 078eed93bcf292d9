use std::collections::HashMap;
use std::sync::Arc;

use grantwise_core::domain::consultation::ConsultationRecord;
use grantwise_core::domain::session::{ChatSession, SessionId};
use tokio::sync::{Mutex, RwLock};

use crate::llm::ChatMessage;

/// Messages kept per session. Older turns are dropped first; the welcome message stays.
pub const HISTORY_LIMIT: usize = 200;

/// One consultation: its lifecycle, its record, and the message log.
#[derive(Clone, Debug)]
pub struct SessionEntry {
    pub session: ChatSession,
    pub record: ConsultationRecord,
    pub history: Vec<ChatMessage>,
}

impl SessionEntry {
    pub fn new(session: ChatSession, record: ConsultationRecord) -> Self {
        Self { session, record, history: Vec::new() }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.history.push(message);
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(1..=excess);
        }
    }

    /// The last `window` messages, oldest first.
    pub fn recent_history(&self, window: usize) -> &[ChatMessage] {
        let start = self.history.len().saturating_sub(window);
        &self.history[start..]
    }
}

pub type SharedEntry = Arc<Mutex<SessionEntry>>;

/// Sessions keyed by id. Each entry sits behind its own lock so turns of one session run one at
/// a time while other sessions proceed independently.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SharedEntry>>,
}

impl InMemorySessionStore {
    pub async fn insert(&self, entry: SessionEntry) -> SharedEntry {
        let id = entry.session.id.clone();
        let shared = Arc::new(Mutex::new(entry));
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::clone(&shared));
        shared
    }

    pub async fn get(&self, id: &SessionId) -> Option<SharedEntry> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Point-in-time copies of every session, oldest first.
    pub async fn sessions(&self) -> Vec<ChatSession> {
        let entries = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect::<Vec<_>>()
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshot.push(entry.lock().await.session.clone());
        }
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use grantwise_core::domain::consultation::ConsultationRecord;
    use grantwise_core::domain::session::{ChatSession, SessionId};

    use super::{InMemorySessionStore, SessionEntry, HISTORY_LIMIT};
    use crate::llm::ChatMessage;

    fn entry(id: &str) -> SessionEntry {
        SessionEntry::new(ChatSession::new(SessionId(id.to_string())), ConsultationRecord::new())
    }

    #[tokio::test]
    async fn stored_entries_are_shared_handles() {
        let store = InMemorySessionStore::default();
        let handle = store.insert(entry("S-1")).await;
        handle.lock().await.record.budget = Some(5_000_000);

        let fetched = store.get(&SessionId("S-1".to_string())).await.expect("stored");
        assert_eq!(fetched.lock().await.record.budget, Some(5_000_000));
        assert!(store.get(&SessionId("S-2".to_string())).await.is_none());
    }

    #[tokio::test]
    async fn sessions_lists_every_entry() {
        let store = InMemorySessionStore::default();
        store.insert(entry("S-1")).await;
        store.insert(entry("S-2")).await;

        let ids =
            store.sessions().await.into_iter().map(|session| session.id.0).collect::<Vec<_>>();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"S-1".to_string()));
    }

    #[test]
    fn recent_history_keeps_the_tail() {
        let mut entry = entry("S-1");
        for index in 0..5 {
            entry.push_message(ChatMessage::user(format!("message {index}")));
        }

        let recent = entry.recent_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "message 3");
        assert_eq!(entry.recent_history(10).len(), 5);
    }

    #[test]
    fn stored_history_is_capped_but_keeps_the_welcome() {
        let mut entry = entry("S-1");
        entry.push_message(ChatMessage::assistant("welcome"));
        for index in 0..HISTORY_LIMIT + 50 {
            entry.push_message(ChatMessage::user(format!("message {index}")));
        }

        assert_eq!(entry.history.len(), HISTORY_LIMIT);
        assert_eq!(entry.history[0].content, "welcome");
        assert_eq!(entry.history[1].content, "message 51");
        let last = entry.history.last().map(|message| message.content.as_str());
        assert_eq!(last, Some(format!("message {}", HISTORY_LIMIT + 49).as_str()));
    }
}
