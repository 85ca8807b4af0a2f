//! Error types for discovery-service
//!
//! Callers must be able to tell "fix your request" apart from "retry later",
//! so every variant maps to a distinct HTTP status and carries a stable code.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Missing or malformed parameter for the chosen sort mode
    #[error("Invalid ranking request: {0}")]
    InvalidRankingRequest(String),

    /// Member has neither explicit selections nor interaction history
    #[error("No preference signal for member {0}")]
    NoPreferenceSignal(Uuid),

    /// Transient infrastructure fault (database down, timeout)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DiscoveryError {
    /// Stable machine-readable code used in error bodies and metrics labels
    pub fn code(&self) -> &'static str {
        match self {
            DiscoveryError::InvalidRankingRequest(_) => "INVALID_RANKING_REQUEST",
            DiscoveryError::NoPreferenceSignal(_) => "NO_PREFERENCE_SIGNAL",
            DiscoveryError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            DiscoveryError::NotFound(_) => "NOT_FOUND",
            DiscoveryError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the same request may succeed when retried later
    pub fn is_retryable(&self) -> bool {
        matches!(self, DiscoveryError::StorageUnavailable(_))
    }
}

impl From<sqlx::Error> for DiscoveryError {
    fn from(err: sqlx::Error) -> Self {
        DiscoveryError::StorageUnavailable(err.to_string())
    }
}

impl ResponseError for DiscoveryError {
    fn status_code(&self) -> StatusCode {
        match self {
            DiscoveryError::InvalidRankingRequest(_) => StatusCode::BAD_REQUEST,
            DiscoveryError::NoPreferenceSignal(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DiscoveryError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            DiscoveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DiscoveryError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        HttpResponse::build(status).json(serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }))
    }
}

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;
