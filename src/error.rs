//! # Error Handling
//!
//! Unified error handling for the droplet gateway: the domain taxonomy used
//! by the ingestion pipeline ([`IngestError`], [`ProcessingError`]) and the
//! problem+json response envelope ([`ApiError`]) returned over HTTP.
//!
//! Webhook senders only ever see 200/401/403/404 with generic messages;
//! processing detail stays on the event row and in the activity log.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::crypto::CryptoError;
use crate::telemetry;

/// Domain errors raised while resolving, authenticating, and storing a delivery.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("installation not found")]
    TenantNotFound,
    #[error("installation is not active")]
    TenantInactive,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] crate::events::DecodeError),
    #[error("credential decryption failed: {0}")]
    Decrypt(#[from] CryptoError),
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Errors raised by a single processing attempt against a stored event.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("{0}")]
    Downstream(String),
    #[error("timeout")]
    Timeout,
    #[error("retry limit reached")]
    RetryExhausted,
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            trace_id: Self::current_trace_id(),
        }
    }

    /// Extract current trace ID from the active request context (falls back to
    /// a generated correlation ID for basic client-server log correlation).
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::TenantNotFound => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "Installation not found",
            ),
            IngestError::TenantInactive => Self::new(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Installation is not active",
            ),
            // One uniform message regardless of which check failed.
            IngestError::SignatureInvalid => Self::new(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required",
            ),
            IngestError::InvalidPayload(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                "Invalid payload",
            ),
            IngestError::Decrypt(err) => {
                tracing::error!(error = %err, "credential decryption failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
            IngestError::Db(err) => err.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_not_found_maps_to_404() {
        let api_error: ApiError = IngestError::TenantNotFound.into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
    }

    #[test]
    fn test_tenant_inactive_maps_to_403() {
        let api_error: ApiError = IngestError::TenantInactive.into();
        assert_eq!(api_error.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_signature_invalid_maps_to_401_with_generic_message() {
        let api_error: ApiError = IngestError::SignatureInvalid.into();
        assert_eq!(api_error.status, StatusCode::UNAUTHORIZED);
        // The response must not reveal which check failed.
        assert_eq!(api_error.message, Box::from("Authentication required"));
    }

    #[test]
    fn test_decrypt_failure_is_fatal_not_unauthorized() {
        let api_error: ApiError = IngestError::Decrypt(CryptoError::InvalidFormat).into();
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_problem_json_content_type() {
        let error = ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "missing");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn test_trace_id_generation() {
        let error = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "X", "Test error");
        let trace_id = error.trace_id.expect("trace id present");
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13); // "corr-" + 8 chars
    }
}
