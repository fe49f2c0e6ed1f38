use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::notification::Notification;
use crate::models::session::{Session, SessionKind, SessionOutcome, SessionStatus};

/// The write half of a committed state-machine transition.
///
/// `expected` is the status the machine validated against; the store must
/// apply the update only if the row still carries it (compare-and-swap).
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub expected: SessionStatus,
    pub next: SessionStatus,
    /// Binds the acceptor of an open invite, atomically with the status swap.
    pub bind_participant_b: Option<Uuid>,
    /// Stamped on the first transition into a live status.
    pub started_at: Option<DateTime<Utc>>,
    /// Stamped on any transition into a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<SessionOutcome>,
}

/// Persists sessions and performs precondition-guarded status updates.
///
/// Every writer, participant actions and the reaper alike, goes through
/// `transition_session`; nothing blind-writes a status.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session. Fails with `Conflict` when a bound
    /// participant already holds a non-terminal session of the same kind;
    /// the check is atomic with the insert, so concurrent creates for the
    /// same participant commit at most one session.
    async fn create_session(&self, session: &Session) -> Result<()>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>>;

    /// The user's current non-terminal session of `kind`, if any. Backs the
    /// one-live-session-per-kind invariant.
    async fn find_non_terminal_by_user(
        &self,
        user_id: Uuid,
        kind: SessionKind,
    ) -> Result<Option<Session>>;

    /// Atomically applies `update` if the session still carries
    /// `update.expected`. Returns the updated row, or `None` when a racing
    /// writer got there first (the caller maps that to `Conflict`).
    /// Binding `bind_participant_b` fails with `Conflict` when the acceptor
    /// already holds a non-terminal session of the same kind.
    async fn transition_session(
        &self,
        id: Uuid,
        update: &TransitionUpdate,
    ) -> Result<Option<Session>>;

    /// Non-terminal sessions whose phase clock (`started_at`, else
    /// `created_at`) is at or before `cutoff`, oldest first.
    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>>;
}

/// Persists the polled notification feed.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Unread notifications for `user_id`, ordered by `created_at` ascending
    /// so per-session ordering holds.
    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>>;

    /// Marks a notification read. Returns `false` when it does not exist or
    /// is addressed to someone else.
    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// The full storage surface the services operate on.
pub trait SignalStore: SessionStore + NotificationStore {}

impl<T: SessionStore + NotificationStore> SignalStore for T {}
