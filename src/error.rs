//! Error types for the caching and throttling layer
//!
//! Provides unified error handling using thiserror.
//!
//! Store failures never reach end users: the cache facade converts them into
//! misses or logged no-ops. Only API-level problems and rate-limit rejections
//! are rendered into responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ratelimit::RateLimitRejection;

// == Store Error Enum ==
/// Failure talking to the backing key-value store ("cache unavailable").
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backend reported an I/O or protocol failure
    #[error("Store backend failure: {0}")]
    Backend(String),

    /// The backend did not answer within the configured bound
    #[error("Store operation timed out after {0} ms")]
    Timeout(u64),

    /// A value could not be encoded or decoded
    #[error("Serialization failure: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Convenience Result type for backend operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == API Error Enum ==
/// Errors surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The gated upstream computation failed
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// The gated upstream computation exceeded its time budget
    #[error("Upstream timed out after {0} s")]
    UpstreamTimeout(u64),

    /// The store could not answer an explicit admin request
    #[error("Store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// A gated operation was denied by the limiter
    #[error(transparent)]
    RateLimited(#[from] RateLimitRejection),
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::RateLimited(rejection) = self {
            return rejection.into_response();
        }

        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for handlers.
pub type Result<T> = std::result::Result<T, ApiError>;
