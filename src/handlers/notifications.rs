use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    middleware_layer::auth::Actor,
    models::notification::Notification,
    services::signals,
    state::AppState,
};

#[derive(Serialize)]
struct UnreadResponse {
    notifications: Vec<Notification>,
    count: usize,
}

/// Lists the actor's unread notifications, oldest first.
#[axum::debug_handler]
pub async fn list_unread(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Response> {
    let notifications = signals::list_unread(state.store.as_ref(), actor.user_id).await?;

    let count = notifications.len();
    let body = sonic_rs::to_string(&UnreadResponse { notifications, count })
        .map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))?;

    Ok((StatusCode::OK, body).into_response())
}

/// Marks one of the actor's notifications as read.
#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(notification_id): Path<Uuid>,
) -> Result<Response> {
    signals::mark_read(state.store.as_ref(), notification_id, actor.user_id).await?;

    let body = sonic_rs::to_string(&sonic_rs::json!({
        "message": "Notification marked as read"
    }))
    .map_err(|e| AppError::Internal(format!("Serialization failed: {}", e)))?;

    Ok((StatusCode::OK, body).into_response())
}
