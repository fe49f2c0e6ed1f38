use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::Actor,
    models::session::{EndReason, Session},
    services::{reaper, sessions as session_service},
    state::AppState,
    validation::sessions as session_validation,
};

/// The request payload for initiating a session.
#[derive(Deserialize)]
pub struct InitiateSessionRequest {
    pub kind: String,
    pub subtype: String,
    pub target_id: Option<Uuid>,
}

/// The request payload for responding to an invitation.
#[derive(Deserialize)]
pub struct RespondRequest {
    pub action: String,
}

/// The request payload for ending or finishing a session.
#[derive(Deserialize, Default)]
pub struct FinishRequest {
    pub winner_id: Option<Uuid>,
    pub reason: Option<String>,
}

/// The request payload for reporting in-game progress.
#[derive(Deserialize)]
pub struct ProgressRequest {
    pub payload: serde_json::Value,
}

/// The query parameters for an operator-invoked sweep.
#[derive(Deserialize)]
pub struct ReapQuery {
    #[serde(default)]
    pub threshold_minutes: Option<i64>,
}

fn session_response(status: StatusCode, session: &Session) -> Result<Response> {
    let body = sonic_rs::to_string(session)
        .map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))?;
    Ok((status, body).into_response())
}

/// Creates a session in its initial status.
#[axum::debug_handler]
pub async fn initiate(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<InitiateSessionRequest>,
) -> Result<Response> {
    let (kind, subtype) =
        session_validation::parse_kind_and_subtype(&req.kind, &req.subtype)?;

    let session = session_service::initiate(
        state.store.as_ref(),
        actor.user_id,
        kind,
        subtype,
        req.target_id,
    )
    .await?;

    session_response(StatusCode::CREATED, &session)
}

/// Accepts or declines an invitation.
#[axum::debug_handler]
pub async fn respond(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Response> {
    let action = session_validation::parse_respond_action(&req.action)?;
    let session =
        session_service::respond(state.store.as_ref(), session_id, actor.user_id, action)
            .await?;
    session_response(StatusCode::OK, &session)
}

/// Answers a ringing call or starts a pending game.
#[axum::debug_handler]
pub async fn start_or_answer(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session =
        session_service::start_or_answer(state.store.as_ref(), session_id, actor.user_id)
            .await?;
    session_response(StatusCode::OK, &session)
}

/// Confirms the incoming call is ringing on the callee's device.
#[axum::debug_handler]
pub async fn acknowledge(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session =
        session_service::acknowledge(state.store.as_ref(), session_id, actor.user_id).await?;
    session_response(StatusCode::OK, &session)
}

/// Ends a connected call or finishes an active game.
#[axum::debug_handler]
pub async fn end_or_finish(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
    req: Option<Json<FinishRequest>>,
) -> Result<Response> {
    let req = req.map(|Json(r)| r).unwrap_or_default();

    let reason = match req.reason.as_deref() {
        None => None,
        Some("hangup") => Some(EndReason::Hangup),
        Some("forfeit") => Some(EndReason::Forfeit),
        Some(other) => {
            return Err(AppError::Validation(format!("Unknown end reason: {}", other)));
        }
    };

    let session = session_service::end_or_finish(
        state.store.as_ref(),
        session_id,
        actor.user_id,
        req.winner_id,
        reason,
    )
    .await?;
    session_response(StatusCode::OK, &session)
}

/// Withdraws an unanswered invitation.
#[axum::debug_handler]
pub async fn cancel(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session =
        session_service::cancel(state.store.as_ref(), session_id, actor.user_id).await?;
    session_response(StatusCode::OK, &session)
}

/// Relays in-game progress to the opponent.
#[axum::debug_handler]
pub async fn report_progress(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ProgressRequest>,
) -> Result<Response> {
    session_validation::validate_progress_payload(&req.payload)?;
    let session = session_service::report_progress(
        state.store.as_ref(),
        session_id,
        actor.user_id,
        req.payload,
    )
    .await?;
    session_response(StatusCode::OK, &session)
}

/// Fetches a session snapshot.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let session =
        session_service::get_session(state.store.as_ref(), session_id, actor.user_id).await?;
    session_response(StatusCode::OK, &session)
}

/// Operator-invoked sweep. Always succeeds, reporting what it found and
/// what it terminated, even when both are zero.
#[axum::debug_handler]
pub async fn reap(
    State(state): State<AppState>,
    Query(query): Query<ReapQuery>,
) -> Result<Response> {
    let threshold = query
        .threshold_minutes
        .unwrap_or(state.config.reaper_threshold_minutes);

    let report =
        reaper::reap(state.store.as_ref(), chrono::Duration::minutes(threshold)).await?;

    let body = sonic_rs::to_string(&sonic_rs::json!({
        "stale": report.stale,
        "terminated": report.terminated
    }))
    .map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))?;

    Ok((StatusCode::OK, body).into_response())
}
