//! API error handling
//!
//! Every failure leaves the API as `{"error": message, "code": slug}` with a
//! matching HTTP status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trustee_types::TrusteeError;
use utoipa::ToSchema;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Hash mismatch: possible data tampering detected.")]
    HashMismatch,

    // =========================================================================
    // Resource Errors
    // =========================================================================
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    // =========================================================================
    // Upstream / Internal Errors
    // =========================================================================
    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Machine readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::ValidationError(_) => "validation_error",
            Self::HashMismatch => "hash_mismatch",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadGateway(_) => "upstream_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::ValidationError(_) | Self::HashMismatch => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
    /// Machine readable error code
    pub code: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        Self {
            error: err.to_string(),
            code: err.error_code().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "Request failed");
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<TrusteeError> for ApiError {
    fn from(err: TrusteeError) -> Self {
        match err {
            TrusteeError::NotFound(msg) => Self::NotFound(msg),
            TrusteeError::InvalidInput(msg) => Self::BadRequest(msg),
            TrusteeError::HashMismatch => Self::HashMismatch,
            e @ TrusteeError::InvalidTransition { .. } => Self::Conflict(e.to_string()),
            TrusteeError::Upstream(msg) => Self::BadGateway(msg),
            TrusteeError::Processing(msg) => Self::Internal(msg),
            e @ (TrusteeError::Storage(_) | TrusteeError::Serialization(_)) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustee_types::DataExchangeState;

    #[test]
    fn test_trustee_error_mapping() {
        let cases = [
            (TrusteeError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (TrusteeError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (TrusteeError::HashMismatch, StatusCode::BAD_REQUEST),
            (
                TrusteeError::InvalidTransition {
                    entry_id: "e1".into(),
                    from: DataExchangeState::NotReady,
                    to: DataExchangeState::Completed,
                },
                StatusCode::CONFLICT,
            ),
            (TrusteeError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (TrusteeError::Processing("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (TrusteeError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn test_error_body_keeps_raw_message() {
        let body = ErrorResponse::from(&ApiError::from(TrusteeError::InvalidInput(
            "unknown serviceId".into(),
        )));
        assert_eq!(body.error, "unknown serviceId");
        assert_eq!(body.code, "bad_request");

        let body = ErrorResponse::from(&ApiError::HashMismatch);
        assert_eq!(body.error, "Hash mismatch: possible data tampering detected.");
    }
}
