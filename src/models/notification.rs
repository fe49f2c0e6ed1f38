use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The event a notification signals to its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CallIncoming,
    CallRinging,
    CallAnswered,
    CallDeclined,
    CallEnded,
    CallMissed,
    CallFailed,
    GameInvitationReceived,
    GameStarted,
    GameDeclined,
    GameCancelled,
    GameFinished,
    GameExpired,
    PlayerAnswered,
    ForfeitResponded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CallIncoming => "call_incoming",
            NotificationKind::CallRinging => "call_ringing",
            NotificationKind::CallAnswered => "call_answered",
            NotificationKind::CallDeclined => "call_declined",
            NotificationKind::CallEnded => "call_ended",
            NotificationKind::CallMissed => "call_missed",
            NotificationKind::CallFailed => "call_failed",
            NotificationKind::GameInvitationReceived => "game_invitation_received",
            NotificationKind::GameStarted => "game_started",
            NotificationKind::GameDeclined => "game_declined",
            NotificationKind::GameCancelled => "game_cancelled",
            NotificationKind::GameFinished => "game_finished",
            NotificationKind::GameExpired => "game_expired",
            NotificationKind::PlayerAnswered => "player_answered",
            NotificationKind::ForfeitResponded => "forfeit_responded",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "call_incoming" => Ok(NotificationKind::CallIncoming),
            "call_ringing" => Ok(NotificationKind::CallRinging),
            "call_answered" => Ok(NotificationKind::CallAnswered),
            "call_declined" => Ok(NotificationKind::CallDeclined),
            "call_ended" => Ok(NotificationKind::CallEnded),
            "call_missed" => Ok(NotificationKind::CallMissed),
            "call_failed" => Ok(NotificationKind::CallFailed),
            "game_invitation_received" => Ok(NotificationKind::GameInvitationReceived),
            "game_started" => Ok(NotificationKind::GameStarted),
            "game_declined" => Ok(NotificationKind::GameDeclined),
            "game_cancelled" => Ok(NotificationKind::GameCancelled),
            "game_finished" => Ok(NotificationKind::GameFinished),
            "game_expired" => Ok(NotificationKind::GameExpired),
            "player_answered" => Ok(NotificationKind::PlayerAnswered),
            "forfeit_responded" => Ok(NotificationKind::ForfeitResponded),
            other => {
                Err(AppError::Validation(format!("Unknown notification kind: {}", other)))
            }
        }
    }
}

/// A signal delivered via polling.
///
/// Rows persist until explicitly marked read, so delivery is at-least-once:
/// a missed poll tick delays a signal, it never loses one. Ordering is
/// guaranteed only within a single `session_ref`, by `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// The recipient.
    pub user_id: Uuid,
    /// The participant whose action produced this signal, if any.
    pub actor_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub session_ref: Option<Uuid>,
    /// Event-specific data, e.g. sequence markers for in-game progress.
    pub payload: Option<serde_json::Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
