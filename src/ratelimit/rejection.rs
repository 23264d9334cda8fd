//! HTTP rendering of limiter decisions.

use axum::{
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::RateLimitErrorBody;
use crate::ratelimit::RateLimitDecision;

pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Unix timestamp, in seconds, at which the reported tier resets
pub const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Writes `X-RateLimit-*` headers for a decision. Unthrottled decisions
/// (no tier evaluated) write nothing.
pub fn apply_headers(decision: &RateLimitDecision, headers: &mut HeaderMap) {
    if decision.reported_tier.is_none() {
        return;
    }
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp()));
}

// == Rate Limit Rejection ==
/// A denied decision, rendered as HTTP 429.
#[derive(Error, Debug, Clone)]
#[error("rate limit exceeded on tier '{reason}', retry after {retry_after} s")]
pub struct RateLimitRejection {
    pub reason: String,
    pub retry_after: u64,
    pub decision: RateLimitDecision,
}

impl RateLimitRejection {
    pub fn new(decision: RateLimitDecision, now: DateTime<Utc>) -> Self {
        let reason = decision
            .reported_tier
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            reason,
            retry_after: decision.retry_after_secs(now),
            decision,
        }
    }
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let body = RateLimitErrorBody::new(self.reason, self.retry_after);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

        let headers = response.headers_mut();
        apply_headers(&self.decision, headers);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}
