//! The signal bus: turns committed transitions into notification rows.
//!
//! Emission is a side effect of a committed transition only; a rejected or
//! conflicting attempt never produces a notification. Rows persist until the
//! recipient marks them read, so delivery over the polling transport is
//! at-least-once.

use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::notification::{Notification, NotificationKind};
use crate::models::session::{EndReason, Session, SessionKind, SessionStatus};
use crate::repositories::store::SignalStore;

fn notification(
    recipient: Uuid,
    actor_id: Option<Uuid>,
    kind: NotificationKind,
    session_ref: Uuid,
    payload: Option<serde_json::Value>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id: recipient,
        actor_id,
        kind,
        session_ref: Some(session_ref),
        payload,
        is_read: false,
        created_at: Utc::now(),
    }
}

/// Notifies the invited party of a freshly created session.
///
/// Open game invites have no addressee yet; discovery of those is the
/// matchmaking feed's concern, not the signal bus's.
pub async fn emit_invited(store: &dyn SignalStore, session: &Session) -> Result<()> {
    let Some(invitee) = session.participant_b_id else {
        return Ok(());
    };

    let kind = match session.kind {
        SessionKind::Call => NotificationKind::CallIncoming,
        SessionKind::Game => NotificationKind::GameInvitationReceived,
    };

    store
        .insert_notification(&notification(
            invitee,
            Some(session.participant_a_id),
            kind,
            session.id,
            Some(serde_json::json!({ "subtype": session.subtype.as_str() })),
        ))
        .await
}

/// Fans out notifications for a committed transition.
///
/// `session` is the post-commit row; `actor_id` is the participant whose
/// action drove the transition, or `None` for the reaper.
pub async fn emit_transition(
    store: &dyn SignalStore,
    session: &Session,
    actor_id: Option<Uuid>,
) -> Result<()> {
    let a = session.participant_a_id;
    let b = session.participant_b_id;

    match (session.kind, session.status) {
        // Callee's device confirmed the ring; tell the caller.
        (SessionKind::Call, SessionStatus::Ringing) => {
            store
                .insert_notification(&notification(
                    a,
                    actor_id,
                    NotificationKind::CallRinging,
                    session.id,
                    None,
                ))
                .await?;
        }

        (SessionKind::Call, SessionStatus::Connected) => {
            store
                .insert_notification(&notification(
                    a,
                    actor_id,
                    NotificationKind::CallAnswered,
                    session.id,
                    None,
                ))
                .await?;
        }

        (SessionKind::Call, SessionStatus::Declined) => {
            store
                .insert_notification(&notification(
                    a,
                    actor_id,
                    NotificationKind::CallDeclined,
                    session.id,
                    None,
                ))
                .await?;
        }

        (SessionKind::Call, SessionStatus::Ended) => {
            // Tell the participant who did not hang up.
            let recipient = match actor_id {
                Some(actor) => session.other_participant(actor),
                None => None,
            };
            if let Some(recipient) = recipient {
                store
                    .insert_notification(&notification(
                        recipient,
                        actor_id,
                        NotificationKind::CallEnded,
                        session.id,
                        None,
                    ))
                    .await?;
            }
        }

        (SessionKind::Call, SessionStatus::Missed) => {
            if let Some(callee) = b {
                store
                    .insert_notification(&notification(
                        callee,
                        Some(a),
                        NotificationKind::CallMissed,
                        session.id,
                        None,
                    ))
                    .await?;
            }
        }

        (SessionKind::Call, SessionStatus::Failed) => {
            for recipient in participants(session) {
                store
                    .insert_notification(&notification(
                        recipient,
                        None,
                        NotificationKind::CallFailed,
                        session.id,
                        None,
                    ))
                    .await?;
            }
        }

        // Invitation accepted, both participants bound: tell both sides.
        (SessionKind::Game, SessionStatus::Active) => {
            for recipient in participants(session) {
                store
                    .insert_notification(&notification(
                        recipient,
                        actor_id,
                        NotificationKind::GameStarted,
                        session.id,
                        Some(serde_json::json!({ "subtype": session.subtype.as_str() })),
                    ))
                    .await?;
            }
        }

        (SessionKind::Game, SessionStatus::Declined) => {
            store
                .insert_notification(&notification(
                    a,
                    actor_id,
                    NotificationKind::GameDeclined,
                    session.id,
                    None,
                ))
                .await?;
        }

        (SessionKind::Game, SessionStatus::Cancelled) => {
            if let Some(invitee) = b {
                store
                    .insert_notification(&notification(
                        invitee,
                        Some(a),
                        NotificationKind::GameCancelled,
                        session.id,
                        None,
                    ))
                    .await?;
            }
        }

        (SessionKind::Game, SessionStatus::Finished) => {
            let payload = session
                .outcome
                .as_ref()
                .map(|o| serde_json::to_value(o).unwrap_or(serde_json::Value::Null));

            for recipient in participants(session) {
                store
                    .insert_notification(&notification(
                        recipient,
                        actor_id,
                        NotificationKind::GameFinished,
                        session.id,
                        payload.clone(),
                    ))
                    .await?;
            }

            // A forfeit additionally pings the conceding player's opponent.
            let forfeited = session
                .outcome
                .as_ref()
                .is_some_and(|o| o.reason == Some(EndReason::Forfeit));
            if forfeited {
                if let Some(opponent) = actor_id.and_then(|id| session.other_participant(id)) {
                    store
                        .insert_notification(&notification(
                            opponent,
                            actor_id,
                            NotificationKind::ForfeitResponded,
                            session.id,
                            None,
                        ))
                        .await?;
                }
            }
        }

        (SessionKind::Game, SessionStatus::Expired) => {
            for recipient in participants(session) {
                store
                    .insert_notification(&notification(
                        recipient,
                        None,
                        NotificationKind::GameExpired,
                        session.id,
                        None,
                    ))
                    .await?;
            }
        }

        // Initial statuses are covered by emit_invited.
        (_, SessionStatus::Calling) | (_, SessionStatus::Pending) => {}

        (kind, status) => {
            tracing::debug!(
                "No signal mapping for {} session in status {}",
                kind.as_str(),
                status.as_str()
            );
        }
    }

    Ok(())
}

/// Notifies the opponent of in-session progress, passing the caller's
/// sequence markers through so the opposing client can merge incrementally.
pub async fn emit_progress(
    store: &dyn SignalStore,
    session: &Session,
    actor_id: Uuid,
    payload: serde_json::Value,
) -> Result<()> {
    if let Some(opponent) = session.other_participant(actor_id) {
        store
            .insert_notification(&notification(
                opponent,
                Some(actor_id),
                NotificationKind::PlayerAnswered,
                session.id,
                Some(payload),
            ))
            .await?;
    }
    Ok(())
}

/// Lists a user's unread notifications, oldest first.
pub async fn list_unread(
    store: &dyn SignalStore,
    user_id: Uuid,
) -> Result<Vec<Notification>> {
    store.list_unread(user_id).await
}

/// Marks a notification read for its recipient.
pub async fn mark_read(
    store: &dyn SignalStore,
    notification_id: Uuid,
    user_id: Uuid,
) -> Result<()> {
    if store.mark_read(notification_id, user_id).await? {
        Ok(())
    } else {
        Err(crate::error::AppError::NotFound)
    }
}

fn participants(session: &Session) -> Vec<Uuid> {
    let mut ids = vec![session.participant_a_id];
    if let Some(b) = session.participant_b_id {
        ids.push(b);
    }
    ids
}
