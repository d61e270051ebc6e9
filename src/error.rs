use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the booking core. Refund failures are deliberately
/// absent: a failed refund never aborts a cancellation and is returned as
/// a warning next to the success result instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("requested slot falls outside opening hours ({window})")]
    OutsideHours { window: String },

    #[error("slot unavailable: conflicts with an existing booking {start}-{end}")]
    SlotUnavailable { start: String, end: String },

    #[error("illegal transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("review not allowed: {reason}")]
    ReviewNotAllowed { reason: String },

    #[error("not allowed: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
}

impl CoreError {
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "not_found",
            CoreError::OutsideHours { .. } => "outside_hours",
            CoreError::SlotUnavailable { .. } => "slot_unavailable",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::ReviewNotAllowed { .. } => "review_not_allowed",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::OutsideHours { .. }
            | CoreError::SlotUnavailable { .. }
            | CoreError::InvalidTransition { .. }
            | CoreError::ReviewNotAllowed { .. } => StatusCode::CONFLICT,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let CoreError::StoreUnavailable(err) = self {
            log::error!("Store error: {err}");
        }
        HttpResponse::build(self.status_code()).json(json!({
            "kind": self.kind(),
            "message": self.to_string(),
        }))
    }
}
