use crate::database::DatabaseError;
use axum::{
    Json,
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Authorization rejections beyond a plain role mismatch. The snake_case
/// code is what gets written to the audit log; clients only ever see a
/// generic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityViolation {
    #[error("role_escalation_attempt")]
    RoleEscalationAttempt,
    #[error("inactive_user_access")]
    InactiveUserAccess,
    #[error("unverified_email_access")]
    UnverifiedEmailAccess,
    #[error("database_error_during_auth")]
    DatabaseErrorDuringAuth,
}

impl SecurityViolation {
    pub fn code(&self) -> &'static str {
        match self {
            SecurityViolation::RoleEscalationAttempt => "role_escalation_attempt",
            SecurityViolation::InactiveUserAccess => "inactive_user_access",
            SecurityViolation::UnverifiedEmailAccess => "unverified_email_access",
            SecurityViolation::DatabaseErrorDuringAuth => "database_error_during_auth",
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Refresh token is unknown, expired, malformed, or revoked for a
    /// non-security reason.
    #[error("invalid refresh token")]
    InvalidToken,
    /// A superseded refresh token was presented again; the whole chain has
    /// been revoked.
    #[error("refresh token reuse detected")]
    TokenReuseDetected,
    /// Missing or unverifiable access credentials on a protected route.
    #[error("authentication required")]
    Unauthenticated,
    #[error("rate limited, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("permission denied")]
    PermissionDenied,
    #[error("security violation: {0}")]
    SecurityViolation(SecurityViolation),
    /// Boot-time secret validation failure. Fatal: the process must not
    /// serve token-issuing traffic with an insecure secret.
    #[error("signing secret rejected: {0}")]
    SecretValidation(String),
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Client-facing messages stay generic; which check failed is only
        // visible in the audit log.
        let (status, message) = match &self {
            AuthError::InvalidToken | AuthError::TokenReuseDetected => {
                (StatusCode::UNAUTHORIZED, "Invalid refresh token")
            }
            AuthError::Unauthenticated => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::RateLimited { retry_after } => {
                let body = Json(json!({
                    "error": "Too many requests",
                    "retry_after_secs": retry_after.as_secs(),
                }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                if let Ok(value) = retry_after.as_secs().to_string().parse() {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
                return response;
            }
            AuthError::PermissionDenied | AuthError::SecurityViolation(_) => {
                (StatusCode::FORBIDDEN, "Access denied")
            }
            AuthError::BadRequest(msg) => {
                let body = Json(json!({ "error": msg }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AuthError::SecretValidation(_)
            | AuthError::Database(_)
            | AuthError::Config(_)
            | AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
