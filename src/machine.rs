//! Pure per-kind transition logic.
//!
//! `apply` validates a requested action against the session's current status
//! and the actor's role, and returns the transition to commit. It performs no
//! IO: the service layer commits the result with a guarded update whose
//! precondition is the exact status validated here, so two near-simultaneous
//! actions resolve deterministically (one commits, the other observes
//! `Conflict`).

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::session::{EndReason, Session, SessionKind, SessionOutcome, SessionStatus};

/// A state-machine action requested by a participant or the reaper.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Callee's device confirms it is ringing (calls only).
    Acknowledge,
    /// Invitee accepts: answers a ringing call or starts a pending game.
    Accept,
    /// Invitee refuses the invitation.
    Decline,
    /// Alias of `Accept` at the boundary: "start" a game, "answer" a call.
    Start,
    /// Terminate a live session, optionally recording an outcome.
    End {
        winner_id: Option<Uuid>,
        reason: Option<EndReason>,
    },
    /// Initiator withdraws an unanswered invitation.
    Cancel,
    /// Reaper forces a stale session into its failure/expiry terminal.
    Reap,
}

/// The committed effect of an accepted action.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The status to CAS the session into.
    pub next: SessionStatus,
    /// For open game invites, the acceptor to bind as `participant_b_id`.
    pub binds_participant_b: Option<Uuid>,
    /// The outcome to record, for transitions into a terminal status.
    pub outcome: Option<SessionOutcome>,
}

impl Transition {
    fn to(next: SessionStatus) -> Self {
        Transition { next, binds_participant_b: None, outcome: None }
    }
}

/// Validates `action` by `actor_id` against the session's current state.
///
/// Failure taxonomy: wrong participant is `Forbidden`, an action the kind
/// does not define is `Validation`, acting on a reaped session is `Expired`,
/// and every other status-precondition mismatch is `Conflict`.
pub fn apply(session: &Session, actor_id: Uuid, action: &SessionAction) -> Result<Transition> {
    // Reaped sessions are a distinct caller-visible case: the other side did
    // not act, the system gave up on the session.
    if session.status.is_reaped() && *action != SessionAction::Reap {
        return Err(AppError::Expired);
    }

    match session.kind {
        SessionKind::Call => apply_call(session, actor_id, action),
        SessionKind::Game => apply_game(session, actor_id, action),
    }
}

fn apply_call(session: &Session, actor_id: Uuid, action: &SessionAction) -> Result<Transition> {
    match action {
        SessionAction::Acknowledge => {
            require_invitee(session, actor_id)?;
            expect_status(session, &[SessionStatus::Calling])?;
            Ok(Transition::to(SessionStatus::Ringing))
        }

        // Only the callee may answer, and only once the ring was acknowledged.
        SessionAction::Accept | SessionAction::Start => {
            require_invitee(session, actor_id)?;
            expect_status(session, &[SessionStatus::Ringing])?;
            Ok(Transition::to(SessionStatus::Connected))
        }

        SessionAction::Decline => {
            require_invitee(session, actor_id)?;
            expect_status(session, &[SessionStatus::Calling, SessionStatus::Ringing])?;
            Ok(Transition::to(SessionStatus::Declined))
        }

        SessionAction::End { reason, .. } => {
            require_participant(session, actor_id)?;
            expect_status(session, &[SessionStatus::Connected])?;
            Ok(Transition {
                next: SessionStatus::Ended,
                binds_participant_b: None,
                outcome: Some(SessionOutcome {
                    winner_id: None,
                    duration_secs: None,
                    reason: Some(reason.unwrap_or(EndReason::Hangup)),
                }),
            })
        }

        // The caller hanging up an unanswered call records it as missed.
        SessionAction::Cancel => {
            require_initiator(session, actor_id)?;
            expect_status(session, &[SessionStatus::Calling, SessionStatus::Ringing])?;
            Ok(Transition::to(SessionStatus::Missed))
        }

        SessionAction::Reap => {
            expect_status(
                session,
                &[SessionStatus::Calling, SessionStatus::Ringing, SessionStatus::Connected],
            )?;
            Ok(Transition {
                next: SessionStatus::Failed,
                binds_participant_b: None,
                outcome: Some(SessionOutcome {
                    winner_id: None,
                    duration_secs: None,
                    reason: Some(EndReason::Timeout),
                }),
            })
        }
    }
}

fn apply_game(session: &Session, actor_id: Uuid, action: &SessionAction) -> Result<Transition> {
    match action {
        SessionAction::Acknowledge => {
            Err(AppError::Validation("acknowledge is not a game action".to_string()))
        }

        SessionAction::Accept | SessionAction::Start => {
            require_invitee(session, actor_id)?;
            expect_status(session, &[SessionStatus::Pending])?;
            Ok(Transition {
                next: SessionStatus::Active,
                // Open invites bind the acceptor here, atomically with the CAS.
                binds_participant_b: if session.participant_b_id.is_none() {
                    Some(actor_id)
                } else {
                    None
                },
                outcome: None,
            })
        }

        SessionAction::Decline => {
            require_invitee(session, actor_id)?;
            expect_status(session, &[SessionStatus::Pending])?;
            Ok(Transition::to(SessionStatus::Declined))
        }

        SessionAction::End { winner_id, reason } => {
            require_participant(session, actor_id)?;
            expect_status(session, &[SessionStatus::Active])?;

            let reason = *reason;
            let winner_id = match reason {
                // Conceding means the opponent wins; the reporter cannot award
                // the forfeit to themselves.
                Some(EndReason::Forfeit) => session.other_participant(actor_id),
                _ => {
                    if let Some(winner) = winner_id {
                        if !session.is_participant(*winner) {
                            return Err(AppError::Validation(
                                "Winner must be a session participant".to_string(),
                            ));
                        }
                    }
                    *winner_id
                }
            };

            Ok(Transition {
                next: SessionStatus::Finished,
                binds_participant_b: None,
                outcome: Some(SessionOutcome { winner_id, duration_secs: None, reason }),
            })
        }

        SessionAction::Cancel => {
            require_initiator(session, actor_id)?;
            expect_status(session, &[SessionStatus::Pending])?;
            Ok(Transition::to(SessionStatus::Cancelled))
        }

        SessionAction::Reap => {
            expect_status(session, &[SessionStatus::Pending, SessionStatus::Active])?;
            Ok(Transition {
                next: SessionStatus::Expired,
                binds_participant_b: None,
                outcome: Some(SessionOutcome {
                    winner_id: None,
                    duration_secs: None,
                    reason: Some(EndReason::Timeout),
                }),
            })
        }
    }
}

/// The actor must be the invited party. When `participant_b_id` is unbound
/// (open game invite) any user except the initiator qualifies.
fn require_invitee(session: &Session, actor_id: Uuid) -> Result<()> {
    match session.participant_b_id {
        Some(b) if b == actor_id => Ok(()),
        Some(_) => Err(AppError::Forbidden),
        None if actor_id != session.participant_a_id => Ok(()),
        None => Err(AppError::Forbidden),
    }
}

fn require_initiator(session: &Session, actor_id: Uuid) -> Result<()> {
    if session.participant_a_id == actor_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn require_participant(session: &Session, actor_id: Uuid) -> Result<()> {
    if session.is_participant(actor_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn expect_status(session: &Session, allowed: &[SessionStatus]) -> Result<()> {
    if allowed.contains(&session.status) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Session is {}, expected {}",
            session.status.as_str(),
            allowed.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" or "),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::SessionSubtype;
    use chrono::Utc;

    fn caller() -> Uuid {
        Uuid::from_u128(0xA)
    }

    fn callee() -> Uuid {
        Uuid::from_u128(0xB)
    }

    fn stranger() -> Uuid {
        Uuid::from_u128(0xC)
    }

    fn call(status: SessionStatus) -> Session {
        Session {
            id: Uuid::new_v4(),
            kind: SessionKind::Call,
            subtype: SessionSubtype::Audio,
            participant_a_id: caller(),
            participant_b_id: Some(callee()),
            status,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            outcome: None,
        }
    }

    fn game(status: SessionStatus, invitee: Option<Uuid>) -> Session {
        Session {
            id: Uuid::new_v4(),
            kind: SessionKind::Game,
            subtype: SessionSubtype::Quiz,
            participant_a_id: caller(),
            participant_b_id: invitee,
            status,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            outcome: None,
        }
    }

    fn end() -> SessionAction {
        SessionAction::End { winner_id: None, reason: None }
    }

    #[test]
    fn call_happy_path() {
        let s = call(SessionStatus::Calling);
        let t = apply(&s, callee(), &SessionAction::Acknowledge).unwrap();
        assert_eq!(t.next, SessionStatus::Ringing);

        let s = call(SessionStatus::Ringing);
        let t = apply(&s, callee(), &SessionAction::Accept).unwrap();
        assert_eq!(t.next, SessionStatus::Connected);

        let s = call(SessionStatus::Connected);
        let t = apply(&s, caller(), &end()).unwrap();
        assert_eq!(t.next, SessionStatus::Ended);
        assert_eq!(t.outcome.unwrap().reason, Some(EndReason::Hangup));
    }

    #[test]
    fn only_callee_answers() {
        let s = call(SessionStatus::Ringing);
        assert!(matches!(apply(&s, caller(), &SessionAction::Accept), Err(AppError::Forbidden)));
        assert!(matches!(apply(&s, stranger(), &SessionAction::Accept), Err(AppError::Forbidden)));
    }

    #[test]
    fn answer_requires_ringing() {
        let s = call(SessionStatus::Calling);
        assert!(matches!(apply(&s, callee(), &SessionAction::Accept), Err(AppError::Conflict(_))));
    }

    #[test]
    fn callee_declines_from_calling_or_ringing() {
        for status in [SessionStatus::Calling, SessionStatus::Ringing] {
            let s = call(status);
            let t = apply(&s, callee(), &SessionAction::Decline).unwrap();
            assert_eq!(t.next, SessionStatus::Declined);
        }
    }

    #[test]
    fn caller_cancel_records_missed() {
        let s = call(SessionStatus::Ringing);
        let t = apply(&s, caller(), &SessionAction::Cancel).unwrap();
        assert_eq!(t.next, SessionStatus::Missed);

        assert!(matches!(apply(&s, callee(), &SessionAction::Cancel), Err(AppError::Forbidden)));
    }

    #[test]
    fn either_participant_hangs_up() {
        let s = call(SessionStatus::Connected);
        assert_eq!(apply(&s, caller(), &end()).unwrap().next, SessionStatus::Ended);
        assert_eq!(apply(&s, callee(), &end()).unwrap().next, SessionStatus::Ended);
        assert!(matches!(apply(&s, stranger(), &end()), Err(AppError::Forbidden)));
    }

    #[test]
    fn terminal_statuses_are_never_left() {
        for status in [SessionStatus::Ended, SessionStatus::Declined, SessionStatus::Missed] {
            let s = call(status);
            for action in [SessionAction::Accept, SessionAction::Decline, end()] {
                assert!(matches!(apply(&s, callee(), &action), Err(AppError::Conflict(_))));
            }
        }
    }

    #[test]
    fn reaped_call_reports_expired() {
        let s = call(SessionStatus::Failed);
        assert!(matches!(apply(&s, callee(), &SessionAction::Accept), Err(AppError::Expired)));
        assert!(matches!(apply(&s, caller(), &end()), Err(AppError::Expired)));
    }

    #[test]
    fn reap_covers_all_nonterminal_call_statuses() {
        for status in [SessionStatus::Calling, SessionStatus::Ringing, SessionStatus::Connected] {
            let s = call(status);
            let t = apply(&s, caller(), &SessionAction::Reap).unwrap();
            assert_eq!(t.next, SessionStatus::Failed);
            assert_eq!(t.outcome.unwrap().reason, Some(EndReason::Timeout));
        }

        let s = call(SessionStatus::Ended);
        assert!(matches!(apply(&s, caller(), &SessionAction::Reap), Err(AppError::Conflict(_))));
    }

    #[test]
    fn game_invite_accept_binds_open_invite() {
        // Directed invite: only the named invitee may accept.
        let s = game(SessionStatus::Pending, Some(callee()));
        let t = apply(&s, callee(), &SessionAction::Accept).unwrap();
        assert_eq!(t.next, SessionStatus::Active);
        assert_eq!(t.binds_participant_b, None);
        assert!(matches!(apply(&s, stranger(), &SessionAction::Accept), Err(AppError::Forbidden)));

        // Open invite: anyone but the initiator may accept, and gets bound.
        let s = game(SessionStatus::Pending, None);
        let t = apply(&s, stranger(), &SessionAction::Accept).unwrap();
        assert_eq!(t.binds_participant_b, Some(stranger()));
        assert!(matches!(apply(&s, caller(), &SessionAction::Accept), Err(AppError::Forbidden)));
    }

    #[test]
    fn game_decline_and_cancel() {
        let s = game(SessionStatus::Pending, Some(callee()));
        assert_eq!(
            apply(&s, callee(), &SessionAction::Decline).unwrap().next,
            SessionStatus::Declined
        );
        assert_eq!(
            apply(&s, caller(), &SessionAction::Cancel).unwrap().next,
            SessionStatus::Cancelled
        );
        assert!(matches!(apply(&s, callee(), &SessionAction::Cancel), Err(AppError::Forbidden)));
    }

    #[test]
    fn game_finish_records_winner() {
        let s = game(SessionStatus::Active, Some(callee()));
        let t = apply(
            &s,
            caller(),
            &SessionAction::End { winner_id: Some(callee()), reason: None },
        )
        .unwrap();
        assert_eq!(t.next, SessionStatus::Finished);
        assert_eq!(t.outcome.unwrap().winner_id, Some(callee()));
    }

    #[test]
    fn game_finish_rejects_outside_winner() {
        let s = game(SessionStatus::Active, Some(callee()));
        let r = apply(
            &s,
            caller(),
            &SessionAction::End { winner_id: Some(stranger()), reason: None },
        );
        assert!(matches!(r, Err(AppError::Validation(_))));
    }

    #[test]
    fn forfeit_awards_the_opponent() {
        let s = game(SessionStatus::Active, Some(callee()));
        let t = apply(
            &s,
            callee(),
            // Winner claim is ignored on forfeit.
            &SessionAction::End { winner_id: Some(callee()), reason: Some(EndReason::Forfeit) },
        )
        .unwrap();
        assert_eq!(t.outcome.unwrap().winner_id, Some(caller()));
    }

    #[test]
    fn acknowledge_is_call_only() {
        let s = game(SessionStatus::Pending, Some(callee()));
        assert!(matches!(
            apply(&s, callee(), &SessionAction::Acknowledge),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn reaped_game_reports_expired_to_actors() {
        let s = game(SessionStatus::Expired, Some(callee()));
        assert!(matches!(apply(&s, callee(), &SessionAction::Accept), Err(AppError::Expired)));
    }
}
