use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::notification::{Notification, NotificationKind};
use crate::models::session::{Session, SessionKind, SessionStatus, SessionSubtype};
use crate::repositories::store::{NotificationStore, SessionStore, TransitionUpdate};

/// The sqlx-backed store used by the server and the reaper CLI.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Raw `sessions` row; status/kind tags are parsed at the edge so unknown
/// values surface as errors instead of leaking through.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    kind: String,
    subtype: String,
    participant_a_id: Uuid,
    participant_b_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    outcome: Option<serde_json::Value>,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Session> {
        let outcome = row
            .outcome
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Malformed session outcome: {}", e)))?;

        Ok(Session {
            id: row.id,
            kind: SessionKind::parse(&row.kind)?,
            subtype: SessionSubtype::parse(&row.subtype)?,
            participant_a_id: row.participant_a_id,
            participant_b_id: row.participant_b_id,
            status: SessionStatus::parse(&row.status)?,
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            outcome,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    user_id: Uuid,
    actor_id: Option<Uuid>,
    kind: String,
    session_ref: Option<Uuid>,
    payload: Option<serde_json::Value>,
    is_read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Notification> {
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            actor_id: row.actor_id,
            kind: NotificationKind::parse(&row.kind)?,
            session_ref: row.session_ref,
            payload: row.payload,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

const SESSION_COLUMNS: &str = "id, kind, subtype, participant_a_id, participant_b_id, status, \
                               created_at, started_at, ended_at, outcome";

fn non_terminal_tags() -> Vec<String> {
    ["calling", "ringing", "connected", "pending", "active"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Maps a unique-violation on the partial per-participant indexes to
/// `Conflict`; those fire when a write would give a user a second
/// non-terminal session of the same kind.
fn map_live_session_clash(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(ref db) = e {
        if db.code().as_deref() == Some("23505") {
            return AppError::Conflict(
                "Participant already has a non-terminal session of this kind".to_string(),
            );
        }
    }
    AppError::Database(e)
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, kind, subtype, participant_a_id, participant_b_id,
                                  status, created_at, started_at, ended_at, outcome)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.id)
        .bind(session.kind.as_str())
        .bind(session.subtype.as_str())
        .bind(session.participant_a_id)
        .bind(session.participant_b_id)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(
            session
                .outcome
                .as_ref()
                .map(|o| serde_json::to_value(o).unwrap_or(serde_json::Value::Null)),
        )
        .execute(&self.pool)
        .await
        .map_err(map_live_session_clash)?;

        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn find_non_terminal_by_user(
        &self,
        user_id: Uuid,
        kind: SessionKind,
    ) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE kind = $1
              AND status = ANY($2)
              AND (participant_a_id = $3 OR participant_b_id = $3)
            LIMIT 1
            "#,
            SESSION_COLUMNS
        ))
        .bind(kind.as_str())
        .bind(non_terminal_tags())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Session::try_from).transpose()
    }

    async fn transition_session(
        &self,
        id: Uuid,
        update: &TransitionUpdate,
    ) -> Result<Option<Session>> {
        // Single guarded UPDATE: the WHERE clause is the CAS precondition.
        // Zero rows means a racing writer already moved the session on.
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE sessions
            SET status = $3,
                participant_b_id = COALESCE($4, participant_b_id),
                started_at = COALESCE(started_at, $5),
                ended_at = COALESCE($6, ended_at),
                outcome = COALESCE($7, outcome)
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(update.expected.as_str())
        .bind(update.next.as_str())
        .bind(update.bind_participant_b)
        .bind(update.started_at)
        .bind(update.ended_at)
        .bind(
            update
                .outcome
                .as_ref()
                .map(|o| serde_json::to_value(o).unwrap_or(serde_json::Value::Null)),
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(map_live_session_clash)?;

        row.map(Session::try_from).transpose()
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {}
            FROM sessions
            WHERE status = ANY($1)
              AND COALESCE(started_at, created_at) <= $2
            ORDER BY created_at ASC
            "#,
            SESSION_COLUMNS
        ))
        .bind(non_terminal_tags())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, actor_id, kind, session_ref,
                                       payload, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.actor_id)
        .bind(notification.kind.as_str())
        .bind(notification.session_ref)
        .bind(notification.payload.clone())
        .bind(notification.is_read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, actor_id, kind, session_ref, payload, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND is_read = false
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
