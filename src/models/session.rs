use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// The kind of live interaction a session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Call,
    Game,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Call => "call",
            SessionKind::Game => "game",
        }
    }

    /// Parses a kind tag, rejecting unknown values at the boundary.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "call" => Ok(SessionKind::Call),
            "game" => Ok(SessionKind::Game),
            other => Err(AppError::Validation(format!("Unknown session kind: {}", other))),
        }
    }

    /// The status a freshly created session of this kind starts in.
    pub fn initial_status(&self) -> SessionStatus {
        match self {
            SessionKind::Call => SessionStatus::Calling,
            SessionKind::Game => SessionStatus::Pending,
        }
    }

    /// The terminal status the reaper forces stale sessions of this kind into.
    pub fn reaped_status(&self) -> SessionStatus {
        match self {
            SessionKind::Call => SessionStatus::Failed,
            SessionKind::Game => SessionStatus::Expired,
        }
    }
}

/// The flavor of a session within its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSubtype {
    // Call subtypes
    Audio,
    Video,
    // Game subtypes
    Quiz,
    Puzzle,
    Challenge,
}

impl SessionSubtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionSubtype::Audio => "audio",
            SessionSubtype::Video => "video",
            SessionSubtype::Quiz => "quiz",
            SessionSubtype::Puzzle => "puzzle",
            SessionSubtype::Challenge => "challenge",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "audio" => Ok(SessionSubtype::Audio),
            "video" => Ok(SessionSubtype::Video),
            "quiz" => Ok(SessionSubtype::Quiz),
            "puzzle" => Ok(SessionSubtype::Puzzle),
            "challenge" => Ok(SessionSubtype::Challenge),
            other => Err(AppError::Validation(format!("Unknown session subtype: {}", other))),
        }
    }

    /// The kind this subtype belongs to.
    pub fn kind(&self) -> SessionKind {
        match self {
            SessionSubtype::Audio | SessionSubtype::Video => SessionKind::Call,
            SessionSubtype::Quiz | SessionSubtype::Puzzle | SessionSubtype::Challenge => {
                SessionKind::Game
            }
        }
    }
}

/// The lifecycle status of a session.
///
/// One enum covers both kinds; each kind only ever uses its own subset,
/// enforced by the transition tables in `machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    // Call lifecycle
    Calling,
    Ringing,
    Connected,
    Ended,
    Declined,
    Missed,
    Failed,
    // Game lifecycle (Declined is shared)
    Pending,
    Active,
    Finished,
    Cancelled,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Calling => "calling",
            SessionStatus::Ringing => "ringing",
            SessionStatus::Connected => "connected",
            SessionStatus::Ended => "ended",
            SessionStatus::Declined => "declined",
            SessionStatus::Missed => "missed",
            SessionStatus::Failed => "failed",
            SessionStatus::Pending => "pending",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "calling" => Ok(SessionStatus::Calling),
            "ringing" => Ok(SessionStatus::Ringing),
            "connected" => Ok(SessionStatus::Connected),
            "ended" => Ok(SessionStatus::Ended),
            "declined" => Ok(SessionStatus::Declined),
            "missed" => Ok(SessionStatus::Missed),
            "failed" => Ok(SessionStatus::Failed),
            "pending" => Ok(SessionStatus::Pending),
            "active" => Ok(SessionStatus::Active),
            "finished" => Ok(SessionStatus::Finished),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "expired" => Ok(SessionStatus::Expired),
            other => Err(AppError::Validation(format!("Unknown session status: {}", other))),
        }
    }

    /// Whether this status is terminal. Terminal statuses are never re-entered
    /// and never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Ended
                | SessionStatus::Declined
                | SessionStatus::Missed
                | SessionStatus::Failed
                | SessionStatus::Finished
                | SessionStatus::Cancelled
                | SessionStatus::Expired
        )
    }

    /// Whether the session has reached its in-progress phase (connected call
    /// or active game). `started_at` is stamped exactly when this first
    /// becomes true.
    pub fn is_live(&self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Active)
    }

    /// Whether this status was forced by the reaper.
    pub fn is_reaped(&self) -> bool {
        matches!(self, SessionStatus::Failed | SessionStatus::Expired)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A participant hung up a connected call.
    Hangup,
    /// A player conceded an active game.
    Forfeit,
    /// The reaper terminated the session past its age threshold.
    Timeout,
}

/// The recorded result of a terminated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// The winning player, for finished games.
    pub winner_id: Option<Uuid>,
    /// How long the session was live, in seconds.
    pub duration_secs: Option<i64>,
    /// Why the session ended.
    pub reason: Option<EndReason>,
}

/// Represents one live two-party interaction: a call or a game.
///
/// `participant_a_id` is the initiator and is always set. `participant_b_id`
/// is the second participant: set at creation for directed invites (all
/// calls, targeted game invites), and bound on accept for open game invites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub kind: SessionKind,
    pub subtype: SessionSubtype,
    pub participant_a_id: Uuid,
    pub participant_b_id: Option<Uuid>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<SessionOutcome>,
}

impl Session {
    /// Whether `user_id` is one of the session's participants.
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participant_a_id == user_id || self.participant_b_id == Some(user_id)
    }

    /// The counterpart of `user_id` in this session, if one is bound.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_a_id == user_id {
            self.participant_b_id
        } else if self.participant_b_id == Some(user_id) {
            Some(self.participant_a_id)
        } else {
            None
        }
    }
}
