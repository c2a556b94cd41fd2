//! Error taxonomy for request handling.
//!
//! - `AppError`: request-level failures rendered as HTTP responses.
//! - `FormError`: a message for one modal input, rendered as
//!   `{"response_action": "errors", ...}` so the modal stays open.
//! - `FlowError`: what a form-driven lifecycle flow can fail with; always
//!   convertible into a `FormError`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::{json, Value};
use tracing::error;

use referral_core::ReferralId;

/// Inline error for a single modal input block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{block_id}: {message}")]
pub struct FormError {
    pub block_id: String,
    pub message: String,
}

impl FormError {
    pub fn new(block_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            message: message.into(),
        }
    }

    /// Body that makes Slack re-display the modal with the error inline.
    pub fn to_response_body(&self) -> Value {
        json!({
            "response_action": "errors",
            "errors": { self.block_id.clone(): self.message },
        })
    }
}

/// Failure of a form-driven flow (referral submission, service completion).
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] FormError),

    #[error("referral {id} not found")]
    NotFound { block_id: &'static str, id: ReferralId },

    /// A critical downstream write failed; nothing is considered committed.
    #[error("{operation} failed: {source}")]
    Downstream {
        operation: &'static str,
        block_id: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl FlowError {
    /// The inline error shown to the submitter. Downstream details stay in the logs.
    pub fn to_form_error(&self) -> FormError {
        match self {
            FlowError::Validation(form_error) => form_error.clone(),
            FlowError::NotFound { block_id, id } => FormError::new(
                *block_id,
                format!("No referral with ID {} was found. Check the ID and try again.", id),
            ),
            FlowError::Downstream {
                operation,
                block_id,
                ..
            } => FormError::new(
                *block_id,
                format!(
                    "Could not {}. Please try again, or contact an admin if this keeps happening.",
                    operation
                ),
            ),
        }
    }
}

/// Request-level error returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("not configured: {0}")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason.to_string()),
            AppError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            AppError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload too large".to_string(),
            ),
            AppError::NotConfigured(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{} is not configured", what),
            ),
            AppError::Internal(err) => {
                error!("Unhandled error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_error_body_shape() {
        let body = FormError::new("client_name_block", "Required").to_response_body();
        assert_eq!(body["response_action"], "errors");
        assert_eq!(body["errors"]["client_name_block"], "Required");
    }

    #[test]
    fn test_downstream_error_hides_details() {
        let err = FlowError::Downstream {
            operation: "save the referral",
            block_id: "client_name_block",
            source: anyhow::anyhow!("Graph API error: 503 - upstream connect error"),
        };
        let form_error = err.to_form_error();
        assert_eq!(form_error.block_id, "client_name_block");
        assert!(form_error.message.contains("save the referral"));
        assert!(!form_error.message.contains("503"));
    }

    #[test]
    fn test_not_found_names_the_id() {
        let err = FlowError::NotFound {
            block_id: "referral_id_block",
            id: ReferralId::parse("REF-ABCD1234").unwrap(),
        };
        let form_error = err.to_form_error();
        assert_eq!(form_error.block_id, "referral_id_block");
        assert!(form_error.message.contains("REF-ABCD1234"));
    }

    #[test]
    fn test_internal_error_is_generic_500() {
        let response = AppError::Internal(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
