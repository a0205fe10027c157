// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::registry::FilingError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (remote storage issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),

    // 504 Gateway Timeout
    GatewayTimeout(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::GatewayTimeout(_) => 504,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::ValidationError(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::GatewayTimeout(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
        }
    }

    /// Whether the client may re-issue the request as is
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::BadGateway(_) | ApiError::ServiceUnavailable(_) | ApiError::GatewayTimeout(_)
        )
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code(),
            "retryable": self.is_retryable(),
        })
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        ApiError::ValidationError(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<FilingError> for ApiError {
    fn from(err: FilingError) -> Self {
        match err {
            FilingError::Validation(msg) => ApiError::validation_error(msg),
            FilingError::NotFound(id) => ApiError::not_found(format!("Protocol {} not found", id)),
            e @ FilingError::LockTimeout { .. } => {
                tracing::warn!("{}", e);
                ApiError::service_unavailable("Protocol counter is busy, please retry")
            }
            FilingError::Upload(e) => {
                tracing::error!("Upload failed: {}", e);
                ApiError::BadGateway("Remote storage rejected the document; no protocol number was consumed".into())
            }
            FilingError::Persistence(e) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Persistence failure: {}", e);
                ApiError::internal_server_error("Could not save the protocol; no protocol number was consumed")
            }
            FilingError::Database(e) => {
                tracing::error!("Database failure: {}", e);
                ApiError::internal_server_error("Database operation failed")
            }
            e @ FilingError::CounterExhausted { .. } => {
                tracing::error!("{}", e);
                ApiError::conflict(e.to_string())
            }
            FilingError::Stamp(e) => {
                tracing::error!("Stamping failed: {}", e);
                ApiError::internal_server_error("Could not stamp the document")
            }
            FilingError::Timeout(limit) => {
                ApiError::GatewayTimeout(format!("Filing did not complete within {}s", limit.as_secs()))
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfigured: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid username or password"),
            AuthError::InvalidToken(msg) => ApiError::unauthorized(format!("Invalid JWT token: {}", msg)),
            AuthError::UserExists(name) => ApiError::Conflict(format!("User '{}' already exists", name)),
            AuthError::InvalidUser(msg) => ApiError::validation_error(msg),
            AuthError::UserNotFound(id) => ApiError::not_found(format!("User {} not found", id)),
            other => {
                tracing::error!("Authentication failure: {}", other);
                ApiError::internal_server_error("Authentication is temporarily unavailable")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use crate::types::ProtocolType;
    use std::time::Duration;

    #[test]
    fn filing_errors_map_to_statuses() {
        let cases = [
            (FilingError::validation("pdf is required"), 400, "VALIDATION_ERROR"),
            (FilingError::NotFound("9".into()), 404, "NOT_FOUND"),
            (
                FilingError::LockTimeout { year: 2025, protocol_type: ProtocolType::Incoming },
                503,
                "SERVICE_UNAVAILABLE",
            ),
            (FilingError::Upload(StorageError::Rejected("403".into())), 502, "BAD_GATEWAY"),
            (FilingError::Persistence(sqlx::Error::RowNotFound), 500, "INTERNAL_SERVER_ERROR"),
            (FilingError::Database(sqlx::Error::RowNotFound), 500, "INTERNAL_SERVER_ERROR"),
            (
                FilingError::CounterExhausted { year: 2025, protocol_type: ProtocolType::Outgoing },
                409,
                "CONFLICT",
            ),
            (FilingError::Timeout(Duration::from_secs(60)), 504, "GATEWAY_TIMEOUT"),
        ];

        for (err, status, code) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status_code(), status);
            assert_eq!(api.error_code(), code);
        }
    }

    #[test]
    fn persistence_details_are_not_exposed() {
        let api: ApiError = FilingError::Persistence(sqlx::Error::Protocol("relation x".into())).into();
        assert!(!api.message().contains("relation"));
    }

    #[test]
    fn read_failures_do_not_mention_numbering() {
        let api: ApiError = FilingError::Database(sqlx::Error::PoolTimedOut).into();
        assert_eq!(api.message(), "Database operation failed");
        assert!(!api.message().contains("number"));
    }

    #[test]
    fn json_body_marks_retryable_errors() {
        let api: ApiError = FilingError::LockTimeout { year: 2025, protocol_type: ProtocolType::Outgoing }.into();
        let body = api.to_json();
        assert_eq!(body["error"], json!(true));
        assert_eq!(body["retryable"], json!(true));

        let body = ApiError::validation_error("missing").to_json();
        assert_eq!(body["retryable"], json!(false));
    }

    #[test]
    fn auth_errors_are_unauthorized() {
        let api: ApiError = AuthError::InvalidCredentials.into();
        assert_eq!(api.status_code(), 401);
        let api: ApiError = AuthError::MissingSecret.into();
        assert_eq!(api.status_code(), 500);
        let api: ApiError = AuthError::UserNotFound(3).into();
        assert_eq!(api.status_code(), 404);
    }
}
