//! Unified error type for the CRM service. Maps internal errors to HTTP status codes
//! and the `{ success: false, error }` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::error_recovery::CircuitOpen;
use crate::resource_limits::ResourceLimitError;
use crate::storage::postgres::StorageError;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("Database error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CrmError>;

/// Coarse error classes reported in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Database,
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Database => "database",
            Self::Unexpected => "unexpected",
        }
    }
}

impl CrmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(StorageError::UniqueViolation(_))
            | Self::Storage(StorageError::ForeignKeyViolation(_)) => StatusCode::CONFLICT,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Llm(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_)
            | Self::NotFound(_)
            | Self::Unauthorized(_)
            | Self::Forbidden(_)
            | Self::Conflict(_)
            | Self::RateLimited { .. } => ErrorCategory::Validation,
            Self::Storage(StorageError::UniqueViolation(_))
            | Self::Storage(StorageError::ForeignKeyViolation(_)) => ErrorCategory::Validation,
            Self::Storage(_) => ErrorCategory::Database,
            Self::Llm(_) | Self::Internal(_) => ErrorCategory::Unexpected,
        }
    }

    /// Message safe to return to clients. Database and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Storage(StorageError::UniqueViolation(detail)) => {
                format!("Duplicate value: {}", detail)
            }
            Self::Storage(StorageError::ForeignKeyViolation(_)) => {
                "Record is referenced by other data".to_string()
            }
            Self::Storage(_) => "Database error".to_string(),
            Self::Internal(_) => "Unexpected error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<sqlx::Error> for CrmError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<CircuitOpen> for CrmError {
    fn from(err: CircuitOpen) -> Self {
        Self::Llm(err.to_string())
    }
}

impl From<ResourceLimitError> for CrmError {
    fn from(err: ResourceLimitError) -> Self {
        match err {
            ResourceLimitError::RateLimited { retry_after_secs } => {
                Self::RateLimited { retry_after_secs }
            }
            ResourceLimitError::TooManyRequests { .. } => Self::RateLimited { retry_after_secs: 1 },
        }
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.category() {
            ErrorCategory::Validation => tracing::debug!(error = %self, "request rejected"),
            ErrorCategory::Database => tracing::error!(error = %self, "database error"),
            ErrorCategory::Unexpected => tracing::error!(error = ?self, "unexpected error"),
        }

        let mut body = json!({
            "success": false,
            "error": self.public_message(),
        });
        if let Self::RateLimited { retry_after_secs } = &self {
            body["retryAfter"] = json!(retry_after_secs);
        }
        let category = self.category();
        let mut response = (status, Json(body)).into_response();
        // Read back by the metrics middleware.
        response.extensions_mut().insert(category);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CrmError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(CrmError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(CrmError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            CrmError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CrmError::RateLimited { retry_after_secs: 60 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            CrmError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err = CrmError::Storage(StorageError::UniqueViolation("username".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.public_message(), "Duplicate value: username");
    }

    #[test]
    fn test_foreign_key_violation_is_conflict() {
        let err = CrmError::Storage(StorageError::ForeignKeyViolation("leads_assigned_to_fkey".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.public_message(), "Record is referenced by other data");
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = CrmError::Internal(anyhow::anyhow!("connection string leaked"));
        assert_eq!(err.public_message(), "Unexpected error");
        assert_eq!(err.category(), ErrorCategory::Unexpected);
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = CrmError::validation("Invalid lead ID");
        assert_eq!(err.public_message(), "Invalid lead ID");
        assert_eq!(err.category().as_str(), "validation");
    }

    #[test]
    fn test_response_carries_category() {
        let response = CrmError::validation("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.extensions().get::<ErrorCategory>(),
            Some(&ErrorCategory::Validation)
        );
    }

    #[test]
    fn test_busy_server_is_rate_limited() {
        let err = CrmError::from(ResourceLimitError::TooManyRequests { current: 100, max: 100 });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
