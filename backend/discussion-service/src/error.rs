//! Error types for discussion-service
//!
//! Every failure, whether raised by the protocol or surfaced by the store,
//! normalizes to one tagged [`ErrorBody`] shape on the wire.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use doc_store::{Contention, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for discussion-service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Caller identity missing or unverifiable
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Input rejected before any store access
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Failure reported by the document store
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    /// Stable, machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "auth/not-authenticated",
            Self::Validation { code, .. } => *code,
            Self::NotFound { .. } => "not-found",
            Self::PermissionDenied(_) => "permission-denied",
            Self::Store(err) => match err {
                StoreError::NotFound(_) => "not-found",
                StoreError::Conflict(_) | StoreError::AlreadyExists(_) => "aborted",
                StoreError::Unavailable(_) => "unavailable",
                StoreError::QuotaExceeded(_) => "resource-exhausted",
                StoreError::InvalidPath(_) => "validation/invalid-id",
                _ => "internal",
            },
            Self::Internal(_) => "internal",
        }
    }

    /// Client-facing message. Server-side details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Store(err) => match err {
                StoreError::NotFound(_) => "The requested document was not found".to_string(),
                StoreError::Conflict(_) | StoreError::AlreadyExists(_) => {
                    "The operation was aborted due to concurrent changes; please retry".to_string()
                }
                StoreError::Unavailable(_) => {
                    "Service is currently unavailable. Please try again later.".to_string()
                }
                StoreError::QuotaExceeded(_) => "Resource quota exceeded".to_string(),
                StoreError::InvalidPath(reason) => reason.clone(),
                _ => "Database operation failed".to_string(),
            },
            Self::PermissionDenied(message) => message.clone(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.public_message(),
            details: match self {
                Self::Validation { details, .. } => details.clone(),
                _ => None,
            },
        }
    }

    /// Log error with appropriate level and context
    pub fn log(&self) {
        match self.status_code() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::warn!(error = %self, code = self.code(), "Authorization failure");
            }
            StatusCode::CONFLICT | StatusCode::SERVICE_UNAVAILABLE | StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!(error = %self, code = self.code(), "Store contention or outage");
            }
            status if status.is_server_error() => {
                tracing::error!(error = ?self, code = self.code(), "Server error");
            }
            _ => {
                tracing::debug!(error = %self, code = self.code(), "Client error");
            }
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self.code() {
            "auth/not-authenticated" => StatusCode::UNAUTHORIZED,
            "not-found" => StatusCode::NOT_FOUND,
            "permission-denied" => StatusCode::FORBIDDEN,
            "aborted" => StatusCode::CONFLICT,
            "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            "resource-exhausted" => StatusCode::TOO_MANY_REQUESTS,
            code if code.starts_with("validation/") => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        HttpResponse::build(self.status_code()).json(self.to_body())
    }
}

impl Contention for ServiceError {
    fn is_contention(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation {
            code: "validation/invalid-fields",
            message: "Request failed validation".to_string(),
            details: serde_json::to_value(&errors).ok(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_wire_codes() {
        let cases = [
            (StoreError::Conflict("posts/p".into()), "aborted", StatusCode::CONFLICT),
            (StoreError::Unavailable("down".into()), "unavailable", StatusCode::SERVICE_UNAVAILABLE),
            (StoreError::QuotaExceeded("full".into()), "resource-exhausted", StatusCode::TOO_MANY_REQUESTS),
            (StoreError::NotFound("posts/p".into()), "not-found", StatusCode::NOT_FOUND),
            (StoreError::InvalidPath("bad".into()), "validation/invalid-id", StatusCode::BAD_REQUEST),
        ];

        for (store_err, code, status) in cases {
            let err = ServiceError::from(store_err);
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_internal_details_are_not_exposed() {
        let err = ServiceError::Store(StoreError::Malformed {
            path: "posts/p".into(),
            reason: "missing field `title`".into(),
        });
        let body = err.to_body();
        assert_eq!(body.code, "internal");
        assert!(!body.message.contains("title"));
    }

    #[test]
    fn test_only_store_conflicts_are_contention() {
        assert!(ServiceError::Store(StoreError::Conflict("x".into())).is_contention());
        assert!(!ServiceError::not_found("Post", "x").is_contention());
        assert!(!ServiceError::Store(StoreError::Unavailable("x".into())).is_contention());
    }

    #[test]
    fn test_validation_body_carries_code() {
        let body = ServiceError::validation("validation/invalid-direction", "Invalid vote direction").to_body();
        assert_eq!(body.code, "validation/invalid-direction");
        assert_eq!(body.message, "Invalid vote direction");
        assert!(body.details.is_none());
    }
}
