use crate::error::{AppError, Result};
use crate::machine::SessionAction;
use crate::models::session::{SessionKind, SessionSubtype};

/// Parses and cross-checks the kind/subtype tags of an initiate request.
///
/// # Arguments
///
/// * `kind` - The session kind tag, e.g. `"call"`.
/// * `subtype` - The subtype tag, e.g. `"audio"` or `"quiz"`.
///
/// # Returns
///
/// A `Result` containing the parsed `(SessionKind, SessionSubtype)` pair.
pub fn parse_kind_and_subtype(kind: &str, subtype: &str) -> Result<(SessionKind, SessionSubtype)> {
    let kind = SessionKind::parse(kind)?;
    let subtype = SessionSubtype::parse(subtype)?;

    if subtype.kind() != kind {
        return Err(AppError::Validation(format!(
            "Subtype {} is not a {} subtype",
            subtype.as_str(),
            kind.as_str()
        )));
    }

    Ok((kind, subtype))
}

/// Parses the action tag of a respond request. Only `accept` and `decline`
/// are part of the respond vocabulary.
pub fn parse_respond_action(action: &str) -> Result<SessionAction> {
    match action {
        "accept" => Ok(SessionAction::Accept),
        "decline" => Ok(SessionAction::Decline),
        other => Err(AppError::Validation(format!(
            "Unknown respond action: {} (expected accept or decline)",
            other
        ))),
    }
}

/// Validates a progress payload: a small JSON object carrying sequence
/// markers such as `question_index`.
pub fn validate_progress_payload(payload: &serde_json::Value) -> Result<()> {
    if !payload.is_object() {
        return Err(AppError::Validation(
            "Progress payload must be a JSON object".to_string(),
        ));
    }

    let serialized_len = payload.to_string().len();
    if serialized_len > 4096 {
        return Err(AppError::Validation(
            "Progress payload must be at most 4096 bytes".to_string(),
        ));
    }

    Ok(())
}
