//! Crate-level error type and HTTP mapping.
//!
//! Domain-specific billing errors live in [`crate::subscriptions::BillingError`]
//! and convert into `SubkitError` for transport surfaces.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The main error type for subkit operations.
#[derive(Debug, thiserror::Error)]
pub enum SubkitError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl SubkitError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message safe to expose to clients.
    ///
    /// Client errors (4xx) expose their message; server errors hide details
    /// to prevent information disclosure. Full details are logged server-side.
    fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Unauthorized(msg) => format!("Unauthorized: {}", msg),
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
        }
    }
}

/// Standard error response body for transport surfaces.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    error_id: String,
}

impl IntoResponse for SubkitError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "Request failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });
        (status, body).into_response()
    }
}

/// Result type alias for subkit operations.
pub type Result<T> = std::result::Result<T, SubkitError>;

impl From<serde_json::Error> for SubkitError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SubkitError::BadRequest(format!("JSON error: {}", err))
        } else {
            SubkitError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<std::io::Error> for SubkitError {
    fn from(err: std::io::Error) -> Self {
        SubkitError::Internal(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SubkitError::not_found("plan");
        assert_eq!(err.to_string(), "Not found: plan");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = SubkitError::unauthorized("bad signature");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_safe_message_hides_internal_details() {
        let err = SubkitError::internal("token is 'secret123'");
        assert_eq!(err.safe_message(), "Internal server error");

        let err = SubkitError::bad_request("missing field");
        assert_eq!(err.safe_message(), "Bad request: missing field");
    }

    #[test]
    fn test_from_serde_json_error() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope");
        let err: SubkitError = result.unwrap_err().into();
        assert!(matches!(err, SubkitError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_into_response_status() {
        let response = SubkitError::unauthorized("no signature").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = SubkitError::bad_request("bad body").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
