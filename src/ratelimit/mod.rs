//! Rate Limiting Module
//!
//! Multi-tier quotas (global ceiling, per-caller burst, per-caller daily
//! budget) gating billable operations. Counters live in the shared store so
//! every server instance enforces the same quota.

mod identifier;
mod limiter;
mod policy;
mod rejection;

pub use identifier::{CallerIdentity, USER_ID_HEADER};
pub use limiter::{counter_key, RateLimitDecision, RateLimiter, TierDecision, COUNTER_PREFIX};
pub use policy::{
    FailurePolicy, OperationClass, RateLimitPolicy, RateLimitTier, TierScope, GLOBAL_IDENTIFIER,
};
pub use rejection::{
    apply_headers, RateLimitRejection, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER,
};
