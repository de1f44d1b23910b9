use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use confidential_ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("internal error")]
    Internal,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

/// Stable machine-readable name for each rejection reason.
fn ledger_reason(e: &LedgerError) -> (StatusCode, &'static str) {
    match e {
        LedgerError::Unauthorized { .. } => (StatusCode::FORBIDDEN, "unauthorized"),
        LedgerError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
        LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LedgerError::InvalidFacility(_) => (StatusCode::BAD_REQUEST, "invalid_facility"),
        LedgerError::DuplicateSubmission(_) => (StatusCode::CONFLICT, "duplicate_submission"),
        LedgerError::InvalidProof(_) => (StatusCode::BAD_REQUEST, "invalid_proof"),
        LedgerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
        LedgerError::Coprocessor(_) => (StatusCode::UNPROCESSABLE_ENTITY, "coprocessor"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg, reason) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone(), None),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone(), None),
            ApiError::Ledger(e) => {
                let (status, reason) = ledger_reason(e);
                (status, e.to_string(), Some(reason))
            }
            ApiError::Config(_) | ApiError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string(), None)
            }
        };

        (status, Json(ErrorBody { error: msg, reason })).into_response()
    }
}
