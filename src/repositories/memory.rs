use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::notification::Notification;
use crate::models::session::{Session, SessionKind};
use crate::repositories::store::{NotificationStore, SessionStore, TransitionUpdate};

/// In-memory store with the same compare-and-swap semantics as `PgStore`.
///
/// Backs the lifecycle tests and local development; the CAS runs under a
/// single mutex so concurrent transitions resolve exactly like the guarded
/// UPDATE does: one commits, the rest observe a precondition miss.
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_sessions(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| AppError::Internal("Session store mutex poisoned".to_string()))
    }

    fn lock_notifications(&self) -> Result<std::sync::MutexGuard<'_, Vec<Notification>>> {
        self.notifications
            .lock()
            .map_err(|_| AppError::Internal("Notification store mutex poisoned".to_string()))
    }

    /// Rewrites a session's `created_at`, for tests that need an aged row.
    pub fn backdate_session(&self, id: Uuid, created_at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.lock_sessions()?;
        let session = sessions.get_mut(&id).ok_or(AppError::NotFound)?;
        session.created_at = created_at;
        if let Some(started) = session.started_at {
            if started > created_at {
                session.started_at = Some(created_at);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.lock_sessions()?;

        // Check and insert under one lock, so two concurrent creates for the
        // same participant cannot both commit. The guarded UPDATE's partial
        // unique indexes give the PostgreSQL store the same guarantee.
        let clash = sessions.values().any(|s| {
            s.kind == session.kind
                && !s.status.is_terminal()
                && (s.is_participant(session.participant_a_id)
                    || session.participant_b_id.is_some_and(|b| s.is_participant(b)))
        });
        if clash {
            return Err(AppError::Conflict(
                "Participant already has a non-terminal session of this kind".to_string(),
            ));
        }

        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.lock_sessions()?.get(&id).cloned())
    }

    async fn find_non_terminal_by_user(
        &self,
        user_id: Uuid,
        kind: SessionKind,
    ) -> Result<Option<Session>> {
        Ok(self
            .lock_sessions()?
            .values()
            .find(|s| {
                s.kind == kind && !s.status.is_terminal() && s.is_participant(user_id)
            })
            .cloned())
    }

    async fn transition_session(
        &self,
        id: Uuid,
        update: &TransitionUpdate,
    ) -> Result<Option<Session>> {
        let mut sessions = self.lock_sessions()?;
        let Some(current) = sessions.get(&id) else {
            return Ok(None);
        };

        // The CAS precondition. A racing writer that already moved the
        // session on makes this a no-op, exactly like the guarded UPDATE.
        if current.status != update.expected {
            return Ok(None);
        }

        // Binding the acceptor of an open invite must not give them a second
        // non-terminal session of this kind.
        if let Some(b) = update.bind_participant_b {
            let kind = current.kind;
            let clash = sessions.values().any(|s| {
                s.id != id && s.kind == kind && !s.status.is_terminal() && s.is_participant(b)
            });
            if clash {
                return Err(AppError::Conflict(
                    "Participant already has a non-terminal session of this kind".to_string(),
                ));
            }
        }

        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::Internal("Session vanished mid-update".to_string()))?;
        session.status = update.next;
        if let Some(b) = update.bind_participant_b {
            session.participant_b_id = Some(b);
        }
        if session.started_at.is_none() {
            session.started_at = update.started_at;
        }
        if let Some(ended) = update.ended_at {
            session.ended_at = Some(ended);
        }
        if let Some(outcome) = &update.outcome {
            session.outcome = Some(outcome.clone());
        }

        Ok(Some(session.clone()))
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let mut stale: Vec<Session> = self
            .lock_sessions()?
            .values()
            .filter(|s| {
                !s.status.is_terminal() && s.started_at.unwrap_or(s.created_at) <= cutoff
            })
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.created_at);
        Ok(stale)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.lock_notifications()?.push(notification.clone());
        Ok(())
    }

    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let mut unread: Vec<Notification> = self
            .lock_notifications()?
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .cloned()
            .collect();
        unread.sort_by_key(|n| n.created_at);
        Ok(unread)
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let mut notifications = self.lock_notifications()?;
        match notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{SessionStatus, SessionSubtype};
    use chrono::Duration;

    fn pending_game(a: Uuid, b: Uuid) -> Session {
        Session {
            id: Uuid::new_v4(),
            kind: SessionKind::Game,
            subtype: SessionSubtype::Quiz,
            participant_a_id: a,
            participant_b_id: Some(b),
            status: SessionStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            outcome: None,
        }
    }

    fn update(expected: SessionStatus, next: SessionStatus) -> TransitionUpdate {
        TransitionUpdate {
            expected,
            next,
            bind_participant_b: None,
            started_at: next.is_live().then(Utc::now),
            ended_at: next.is_terminal().then(Utc::now),
            outcome: None,
        }
    }

    #[tokio::test]
    async fn conflicting_transitions_resolve_to_one_winner() {
        let store = MemoryStore::new();
        let session = pending_game(Uuid::from_u128(1), Uuid::from_u128(2));
        store.create_session(&session).await.unwrap();

        // Accept and decline race for the same pending invitation.
        let accepted = store
            .transition_session(session.id, &update(SessionStatus::Pending, SessionStatus::Active))
            .await
            .unwrap();
        assert!(accepted.is_some());
        assert!(accepted.unwrap().started_at.is_some());

        let declined = store
            .transition_session(
                session.id,
                &update(SessionStatus::Pending, SessionStatus::Declined),
            )
            .await
            .unwrap();
        assert!(declined.is_none(), "loser of the race must observe a CAS miss");
    }

    #[tokio::test]
    async fn stale_selection_uses_phase_clock() {
        let store = MemoryStore::new();
        let old = pending_game(Uuid::from_u128(1), Uuid::from_u128(2));
        let fresh = pending_game(Uuid::from_u128(3), Uuid::from_u128(4));
        store.create_session(&old).await.unwrap();
        store.create_session(&fresh).await.unwrap();
        store
            .backdate_session(old.id, Utc::now() - Duration::minutes(10))
            .unwrap();

        let stale = store.find_stale(Utc::now() - Duration::minutes(5)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }

    #[tokio::test]
    async fn create_holds_the_lock_across_check_and_insert() {
        let store = MemoryStore::new();
        let alice = Uuid::from_u128(1);

        // Two creates for the same initiator, as left by two racing requests
        // whose pre-checks both saw an empty store. Only one may commit.
        let first = pending_game(alice, Uuid::from_u128(2));
        let second = pending_game(alice, Uuid::from_u128(3));
        store.create_session(&first).await.unwrap();
        let clash = store.create_session(&second).await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));
        assert!(store.get_session(second.id).await.unwrap().is_none());

        // A busy target blocks a create just like a busy initiator.
        let directed_at_busy = pending_game(Uuid::from_u128(4), alice);
        let clash = store.create_session(&directed_at_busy).await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn binding_a_busy_acceptor_is_a_conflict() {
        let store = MemoryStore::new();
        let carol = Uuid::from_u128(5);

        // Carol is already in a live game.
        let mut busy = pending_game(Uuid::from_u128(1), carol);
        busy.status = SessionStatus::Active;
        store.create_session(&busy).await.unwrap();

        // An open invite she tries to accept must not bind her a second one.
        let mut open = pending_game(Uuid::from_u128(2), carol);
        open.participant_b_id = None;
        store.create_session(&open).await.unwrap();

        let bind = TransitionUpdate {
            bind_participant_b: Some(carol),
            ..update(SessionStatus::Pending, SessionStatus::Active)
        };
        let result = store.transition_session(open.id, &bind).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(
            store.get_session(open.id).await.unwrap().unwrap().status,
            SessionStatus::Pending
        );
    }

    #[tokio::test]
    async fn terminal_sessions_are_never_stale() {
        let store = MemoryStore::new();
        let mut session = pending_game(Uuid::from_u128(1), Uuid::from_u128(2));
        session.status = SessionStatus::Cancelled;
        session.created_at = Utc::now() - Duration::minutes(30);
        store.create_session(&session).await.unwrap();

        let stale = store.find_stale(Utc::now()).await.unwrap();
        assert!(stale.is_empty());
    }
}
