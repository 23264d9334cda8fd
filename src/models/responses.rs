//! Response DTOs for the HTTP surface
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::invalidation::InvalidationReport;
use crate::monitor::{FootprintEstimate, GlobalMetrics, KeyReport};
use crate::provider::Completion;

/// Response body for `GET /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: serde_json::Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for `PUT /cache`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
    /// TTL applied, in seconds
    pub ttl: u64,
}

impl SetResponse {
    pub fn new(key: impl Into<String>, ttl: u64) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
            ttl,
        }
    }
}

/// Response body for `DELETE /cache/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// The key that was deleted
    pub key: String,
    /// Number of entries removed (0 when the key was already gone)
    pub removed: u64,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>, removed: u64) -> Self {
        Self {
            key: key.into(),
            removed,
        }
    }
}

/// Response body for `GET /metrics`
#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub global: GlobalMetrics,
    #[serde(rename = "topKeys")]
    pub top_keys: Vec<KeyReport>,
    pub footprint: FootprintEstimate,
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" when the store answers, else "degraded"
    pub status: String,
    /// Name of the configured store backend
    pub backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(backend: impl Into<String>, store_reachable: bool) -> Self {
        let status = if store_reachable { "healthy" } else { "degraded" };
        Self {
            status: status.to_string(),
            backend: backend.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for `POST /invalidate/:entity/:id`
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Total keys removed across every report
    #[serde(rename = "keysDeleted")]
    pub keys_deleted: u64,
    /// True when no pattern failed
    pub complete: bool,
    pub reports: Vec<InvalidationReport>,
}

impl InvalidateResponse {
    pub fn new(reports: Vec<InvalidationReport>) -> Self {
        Self {
            keys_deleted: reports.iter().map(|r| r.keys_deleted).sum(),
            complete: reports.iter().all(InvalidationReport::is_complete),
            reports,
        }
    }
}

/// Response body for `POST /ai/:operation`
#[derive(Debug, Clone, Serialize)]
pub struct AiResponse {
    #[serde(flatten)]
    pub completion: Completion,
    /// Served from cache rather than the provider
    pub cached: bool,
}

/// Body of a 429 from a gated route
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitErrorBody {
    /// Always "rate_limit_exceeded"
    pub error: &'static str,
    /// Name of the tier that denied the request
    pub reason: String,
    /// Whole seconds until the denying tier resets
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl RateLimitErrorBody {
    pub fn new(reason: impl Into<String>, retry_after: u64) -> Self {
        Self {
            error: "rate_limit_exceeded",
            reason: reason.into(),
            retry_after,
        }
    }
}
