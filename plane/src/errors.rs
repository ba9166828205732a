//! Error types for the Shipyard control plane

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use api_models::ErrorResponse;
use thiserror::Error;

/// Main error type for the Shipyard control plane
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    DatabaseError(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: over {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Rate limited")]
    RateLimited,

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for PlatformError {
    fn from(err: anyhow::Error) -> Self {
        PlatformError::Internal(err.to_string())
    }
}

/// Pool and connection failures are reported as `Unavailable`
#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PlatformError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_) => PlatformError::Unavailable(format!("database: {}", err)),
            other => PlatformError::DatabaseError(other),
        }
    }
}

impl PlatformError {
    /// HTTP status the error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            PlatformError::Validation(_) | PlatformError::JsonError(_) => StatusCode::BAD_REQUEST,
            PlatformError::Conflict(_) => StatusCode::CONFLICT,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            PlatformError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PlatformError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlatformError::BadGateway(_) | PlatformError::HttpError(_) => StatusCode::BAD_GATEWAY,
            PlatformError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "validation",
            StatusCode::CONFLICT => "conflict",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::PAYLOAD_TOO_LARGE => "payload_too_large",
            StatusCode::TOO_MANY_REQUESTS => "rate_limited",
            StatusCode::SERVICE_UNAVAILABLE => "unavailable",
            StatusCode::BAD_GATEWAY => "bad_gateway",
            StatusCode::GATEWAY_TIMEOUT => "gateway_timeout",
            _ => "internal",
        }
    }

    /// Message safe to return to a client.
    ///
    /// Validation, conflict and not-found messages are produced by this crate
    /// and carry no internals; everything else is replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self {
            PlatformError::Validation(msg)
            | PlatformError::Conflict(msg)
            | PlatformError::NotFound(msg) => msg.clone(),
            PlatformError::JsonError(_) => "malformed request body".to_string(),
            PlatformError::PayloadTooLarge(_) => "request body too large".to_string(),
            PlatformError::RateLimited => "too many requests".to_string(),
            PlatformError::Unavailable(_) => "service unavailable".to_string(),
            PlatformError::BadGateway(_) | PlatformError::HttpError(_) => "bad gateway".to_string(),
            PlatformError::GatewayTimeout(_) => "gateway timeout".to_string(),
            _ => "internal server error".to_string(),
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            PlatformError::Validation(_)
                | PlatformError::Conflict(_)
                | PlatformError::NotFound(_)
                | PlatformError::JsonError(_)
                | PlatformError::PayloadTooLarge(_)
        )
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: self.kind().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
