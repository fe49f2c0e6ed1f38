//! Session lifecycle operations: the only state-changing entry points.
//!
//! Every mutation is validated by the pure state machine and committed with a
//! compare-and-swap against the exact status that was validated, so two
//! near-simultaneous actions on the same session resolve deterministically:
//! one commits, the other observes `Conflict` and is expected to re-fetch.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::machine::{self, SessionAction};
use crate::models::session::{Session, SessionKind, SessionStatus, SessionSubtype};
use crate::repositories::store::{SignalStore, TransitionUpdate};
use crate::services::signals;

/// Creates a session in its kind's initial status and notifies the invitee.
///
/// # Errors
///
/// `Validation` on a subtype that does not belong to the kind, a call
/// without a target, or a self-targeted invite. `Conflict` when the
/// initiator or a directed target already holds a non-terminal session of
/// this kind.
pub async fn initiate(
    store: &dyn SignalStore,
    initiator_id: Uuid,
    kind: SessionKind,
    subtype: SessionSubtype,
    target_id: Option<Uuid>,
) -> Result<Session> {
    if subtype.kind() != kind {
        return Err(AppError::Validation(format!(
            "Subtype {} is not a {} subtype",
            subtype.as_str(),
            kind.as_str()
        )));
    }

    if kind == SessionKind::Call && target_id.is_none() {
        return Err(AppError::Validation("A call requires a target".to_string()));
    }

    if target_id == Some(initiator_id) {
        return Err(AppError::Validation("Cannot invite yourself".to_string()));
    }

    // Early busy checks for precise messages; the store re-checks atomically
    // with the insert, so a racing create cannot slip past these.
    if let Some(existing) = store.find_non_terminal_by_user(initiator_id, kind).await? {
        return Err(AppError::Conflict(format!(
            "Initiator already has a {} session in status {}",
            kind.as_str(),
            existing.status.as_str()
        )));
    }

    if let Some(target) = target_id {
        if store.find_non_terminal_by_user(target, kind).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Target is already in a {} session",
                kind.as_str()
            )));
        }
    }

    let session = Session {
        id: Uuid::new_v4(),
        kind,
        subtype,
        participant_a_id: initiator_id,
        participant_b_id: target_id,
        status: kind.initial_status(),
        created_at: Utc::now(),
        started_at: None,
        ended_at: None,
        outcome: None,
    };

    store.create_session(&session).await?;
    signals::emit_invited(store, &session).await?;

    tracing::info!(
        "Session {} created: {} {} by {}",
        session.id,
        session.subtype.as_str(),
        session.kind.as_str(),
        initiator_id
    );

    Ok(session)
}

/// Invitee accepts or declines an invitation.
pub async fn respond(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
    action: SessionAction,
) -> Result<Session> {
    if !matches!(action, SessionAction::Accept | SessionAction::Decline) {
        return Err(AppError::Validation(
            "Respond accepts only accept or decline".to_string(),
        ));
    }
    act(store, session_id, actor_id, action).await
}

/// Answers a ringing call or starts a pending game.
pub async fn start_or_answer(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
) -> Result<Session> {
    act(store, session_id, actor_id, SessionAction::Start).await
}

/// Terminates a live session, recording the caller-supplied outcome.
pub async fn end_or_finish(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
    winner_id: Option<Uuid>,
    reason: Option<crate::models::session::EndReason>,
) -> Result<Session> {
    act(store, session_id, actor_id, SessionAction::End { winner_id, reason }).await
}

/// Initiator withdraws an unanswered invitation.
pub async fn cancel(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
) -> Result<Session> {
    act(store, session_id, actor_id, SessionAction::Cancel).await
}

/// Callee's client confirms the incoming call is ringing on its side.
/// Fired edge-triggered by the poller on first sight of `call_incoming`.
pub async fn acknowledge(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
) -> Result<Session> {
    act(store, session_id, actor_id, SessionAction::Acknowledge).await
}

/// Relays in-game progress (e.g. "answered question 3") to the opponent.
/// Does not change session state.
pub async fn report_progress(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
    payload: serde_json::Value,
) -> Result<Session> {
    let session = store.get_session(session_id).await?.ok_or(AppError::NotFound)?;

    if !session.is_participant(actor_id) {
        return Err(AppError::Forbidden);
    }
    if session.kind != SessionKind::Game {
        return Err(AppError::Validation("Progress events are game-only".to_string()));
    }
    if session.status.is_reaped() {
        return Err(AppError::Expired);
    }
    if session.status != SessionStatus::Active {
        return Err(AppError::Conflict(format!(
            "Session is {}, expected active",
            session.status.as_str()
        )));
    }

    signals::emit_progress(store, &session, actor_id, payload).await?;
    Ok(session)
}

/// Fetches a session snapshot; participants only.
pub async fn get_session(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
) -> Result<Session> {
    let session = store.get_session(session_id).await?.ok_or(AppError::NotFound)?;
    if !session.is_participant(actor_id) && session.participant_b_id.is_some() {
        return Err(AppError::Forbidden);
    }
    Ok(session)
}

/// Validates and commits one state-machine action.
async fn act(
    store: &dyn SignalStore,
    session_id: Uuid,
    actor_id: Uuid,
    action: SessionAction,
) -> Result<Session> {
    let session = store.get_session(session_id).await?.ok_or(AppError::NotFound)?;

    // Accepting a game must not put the acceptor into two live games.
    if session.kind == SessionKind::Game
        && matches!(action, SessionAction::Accept | SessionAction::Start)
    {
        if let Some(existing) =
            store.find_non_terminal_by_user(actor_id, SessionKind::Game).await?
        {
            if existing.id != session.id {
                return Err(AppError::Conflict(
                    "Actor is already in a game session".to_string(),
                ));
            }
        }
    }

    let transition = machine::apply(&session, actor_id, &action)?;

    let now = Utc::now();
    let mut outcome = transition.outcome;
    if let Some(outcome) = &mut outcome {
        if outcome.duration_secs.is_none() {
            if let Some(started) = session.started_at {
                outcome.duration_secs = Some((now - started).num_seconds());
            }
        }
    }

    let update = TransitionUpdate {
        expected: session.status,
        next: transition.next,
        bind_participant_b: transition.binds_participant_b,
        started_at: transition.next.is_live().then_some(now),
        ended_at: transition.next.is_terminal().then_some(now),
        outcome,
    };

    match store.transition_session(session.id, &update).await? {
        Some(updated) => {
            tracing::debug!(
                "Session {} transitioned {} -> {} by {}",
                updated.id,
                session.status.as_str(),
                updated.status.as_str(),
                actor_id
            );
            signals::emit_transition(store, &updated, Some(actor_id)).await?;
            Ok(updated)
        }
        // A racing writer won the CAS. Re-read so the caller gets the
        // taxonomy the current state deserves.
        None => {
            let current = store.get_session(session.id).await?.ok_or(AppError::NotFound)?;
            if current.status.is_reaped() {
                Err(AppError::Expired)
            } else {
                Err(AppError::Conflict(format!(
                    "Session moved to {} concurrently",
                    current.status.as_str()
                )))
            }
        }
    }
}
