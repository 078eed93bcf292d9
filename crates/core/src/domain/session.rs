use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, SessionStatus::Completed | SessionStatus::Abandoned)
    }

    /// Completed sessions reopen only when their record is corrected; abandoned ones stay closed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self.status, next),
            (SessionStatus::Active, SessionStatus::Completed)
                | (SessionStatus::Active, SessionStatus::Abandoned)
                | (SessionStatus::Completed, SessionStatus::Active)
                | (SessionStatus::Completed, SessionStatus::Completed)
        )
    }

    pub fn transition_to(&mut self, next: SessionStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(next) {
            return Err(DomainError::InvalidSessionTransition { from: self.status, to: next });
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        self.completed_at = match next {
            SessionStatus::Completed => Some(now),
            _ => None,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatSession, SessionId, SessionStatus};
    use crate::errors::DomainError;

    fn session() -> ChatSession {
        ChatSession::new(SessionId("S-1".to_string()))
    }

    #[test]
    fn completion_stamps_timestamp() {
        let mut session = session();
        session.transition_to(SessionStatus::Completed).expect("active -> completed");

        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
        assert!(session.is_terminal());
    }

    #[test]
    fn reopening_clears_completion_timestamp() {
        let mut session = session();
        session.transition_to(SessionStatus::Completed).expect("active -> completed");
        session.transition_to(SessionStatus::Active).expect("completed -> active");

        assert_eq!(session.completed_at, None);
        assert!(!session.is_terminal());
    }

    #[test]
    fn abandoned_sessions_cannot_resume() {
        let mut session = session();
        session.transition_to(SessionStatus::Abandoned).expect("active -> abandoned");
        let error = session
            .transition_to(SessionStatus::Active)
            .expect_err("abandoned -> active should fail");

        assert!(matches!(
            error,
            DomainError::InvalidSessionTransition {
                from: SessionStatus::Abandoned,
                to: SessionStatus::Active
            }
        ));
    }
}
