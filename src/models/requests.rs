//! Request DTOs for the HTTP surface
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::cache::{MAX_KEY_LENGTH, MAX_VALUE_SIZE};

/// Request body for `PUT /cache`
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: serde_json::Value,
    /// Optional TTL in seconds (uses the configured default if absent)
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.value.to_string().len() > MAX_VALUE_SIZE {
            return Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            ));
        }
        if self.ttl == Some(0) {
            return Some("TTL must be at least 1 second".to_string());
        }
        None
    }
}

/// Maximum prompt size in bytes for gated AI calls
pub const MAX_PROMPT_LENGTH: usize = 16 * 1024;

/// Maximum lesson id size in bytes
pub const MAX_LESSON_ID_LENGTH: usize = 128;

/// Request body for `POST /ai/:operation`
#[derive(Debug, Clone, Deserialize)]
pub struct AiRequest {
    /// Text sent to the provider
    pub prompt: String,
    /// Lesson the request concerns, part of the cache key when present
    #[serde(default, rename = "lessonId")]
    pub lesson_id: Option<String>,
}

impl AiRequest {
    pub fn validate(&self) -> Option<String> {
        if self.prompt.trim().is_empty() {
            return Some("Prompt cannot be empty".to_string());
        }
        if self.prompt.len() > MAX_PROMPT_LENGTH {
            return Some(format!(
                "Prompt exceeds maximum length of {} bytes",
                MAX_PROMPT_LENGTH
            ));
        }
        match &self.lesson_id {
            Some(id) if id.len() > MAX_LESSON_ID_LENGTH => Some(format!(
                "Lesson id exceeds maximum length of {} bytes",
                MAX_LESSON_ID_LENGTH
            )),
            _ => None,
        }
    }
}

/// Query string for `GET /metrics`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsQuery {
    /// Number of top keys to list
    pub limit: Option<usize>,
}

/// Query string for `POST /invalidate/:entity/:id`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateQuery {
    /// Id of the parent entity whose aggregates also changed
    pub parent: Option<String>,
}
