use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MfaError>;

#[derive(Debug, Error)]
pub enum MfaError {
    #[error("Two-factor authentication is not enabled")]
    NotEnrolled,

    #[error("Two-factor authentication is already enabled")]
    AlreadyEnrolled,

    #[error("Verification session expired")]
    SessionExpired,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Invalid recovery code")]
    InvalidRecoveryCode,

    #[error("Code already used")]
    CodeAlreadyUsed,

    #[error("Device trust not found")]
    DeviceNotFound,

    #[error("Device trust revoked")]
    DeviceRevoked,

    #[error("Device trust expired")]
    DeviceExpired,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl MfaError {
    /// Stable machine-readable kind, used in responses and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            MfaError::NotEnrolled => "not_enrolled",
            MfaError::AlreadyEnrolled => "already_enrolled",
            MfaError::SessionExpired => "session_expired",
            MfaError::InvalidCode => "invalid_code",
            MfaError::InvalidRecoveryCode => "invalid_recovery_code",
            MfaError::CodeAlreadyUsed => "code_already_used",
            MfaError::DeviceNotFound => "device_not_found",
            MfaError::DeviceRevoked => "device_revoked",
            MfaError::DeviceExpired => "device_expired",
            MfaError::Database(_) | MfaError::Redis(_) => "store_unavailable",
            MfaError::Validation(_) => "validation",
            MfaError::Internal(_) => "internal",
        }
    }

    /// Only infrastructure failures are worth a caller-side retry;
    /// everything else is terminal for the current nonce or token.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MfaError::Database(_) | MfaError::Redis(_))
    }
}

impl IntoResponse for MfaError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            MfaError::NotEnrolled => (StatusCode::PRECONDITION_FAILED, self.to_string()),
            MfaError::AlreadyEnrolled => (StatusCode::CONFLICT, self.to_string()),
            MfaError::SessionExpired
            | MfaError::InvalidCode
            | MfaError::InvalidRecoveryCode
            | MfaError::CodeAlreadyUsed
            | MfaError::DeviceNotFound
            | MfaError::DeviceRevoked
            | MfaError::DeviceExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            MfaError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            // Don't leak store or internal details to callers
            MfaError::Database(_) | MfaError::Redis(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable".to_string(),
            ),
            MfaError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message,
            "kind": self.kind(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for MfaError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        MfaError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for MfaError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        MfaError::Redis(err.to_string())
    }
}

impl From<validator::ValidationErrors> for MfaError {
    fn from(err: validator::ValidationErrors) -> Self {
        MfaError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_retryable() {
        assert!(MfaError::Database("down".into()).is_retryable());
        assert!(MfaError::Redis("down".into()).is_retryable());
        assert!(!MfaError::InvalidCode.is_retryable());
        assert!(!MfaError::CodeAlreadyUsed.is_retryable());
    }

    #[test]
    fn test_kind_is_generic_for_store_failures() {
        assert_eq!(
            MfaError::Database("connection refused".into()).kind(),
            "store_unavailable"
        );
        assert_eq!(MfaError::Redis("timeout".into()).kind(), "store_unavailable");
    }
}
