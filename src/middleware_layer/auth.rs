use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// The authenticated actor identity, injected by the gateway.
///
/// Authentication itself is an external collaborator: the gateway in front
/// of this service validates credentials and forwards the user id in the
/// `x-user-id` header. This core only consumes the identity.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
}

/// Extracts the actor id from the gateway header.
fn extract_actor(request: &Request<Body>) -> Option<Uuid> {
    request
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// A middleware that requires a gateway-authenticated actor identity.
pub async fn require_actor(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = extract_actor(&request).ok_or_else(|| {
        tracing::warn!("Missing or malformed x-user-id header");
        StatusCode::FORBIDDEN
    })?;

    request.extensions_mut().insert(Actor { user_id });
    Ok(next.run(request).await)
}
