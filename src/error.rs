use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A resource not found error.
    #[error("Resource not found")]
    NotFound,

    /// The actor is not an authorized participant for the requested action.
    #[error("Forbidden")]
    Forbidden,

    /// A status precondition mismatch: the session changed under the caller.
    /// Recoverable: re-fetch the session and adapt instead of retrying blindly.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A validation error (malformed kind/subtype/action).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The session was already reaped; no further action is possible.
    #[error("Session expired")]
    Expired,

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Migration(ref e) => {
                tracing::error!("Migration error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Migration error".to_string())
            }

            AppError::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Resource not found".to_string())
            }

            AppError::Forbidden => {
                tracing::warn!("Actor not authorized for this session action");
                (StatusCode::FORBIDDEN, "Forbidden".to_string())
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Expired => {
                tracing::debug!("Action attempted on a reaped session");
                (StatusCode::GONE, "Session expired".to_string())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", status.as_u16()));

        (status, body).into_response()
    }
}
