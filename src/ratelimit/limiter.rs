//! Rate Limiter
//!
//! Fixed-window counters kept in the shared store. For each tier the window
//! index is `floor(now / window)`, the counter key is
//! `ratelimit:{operation}:{tier}:{identifier}:{window index}`, and the
//! counter is bumped with the store's atomic increment (TTL set on create).
//!
//! This is fixed-window, not a sliding average: a caller can spend a full
//! quota at the end of one window and another at the start of the next, so
//! up to twice `max_requests` may pass around a boundary.
//!
//! Tiers run in policy order and stop at the first denial. Counters already
//! incremented for earlier tiers are not rolled back, so a request denied by
//! a later tier still consumes quota on the tiers before it.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::ratelimit::{FailurePolicy, OperationClass, RateLimitPolicy, RateLimitTier};

/// Prefix separating counters from cache entries in the shared store.
pub const COUNTER_PREFIX: &str = "ratelimit";

// == Tier Decision ==
/// Outcome of one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierDecision {
    pub tier: String,
    pub allowed: bool,
    pub limit: u64,
    /// Post-increment count, 0 when the store was unreachable
    pub count: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// Decided by the failure policy rather than a counter
    pub degraded: bool,
}

// == Rate Limit Decision ==
/// Overall decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub operation: OperationClass,
    pub identifier: String,
    pub allowed: bool,
    /// Limit of the reported tier
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// The first failing tier on denial, else the tier with the least headroom
    pub reported_tier: Option<String>,
    /// Tiers evaluated, in order
    pub tiers: Vec<TierDecision>,
}

impl RateLimitDecision {
    fn unthrottled(operation: OperationClass, identifier: &str, now: DateTime<Utc>) -> Self {
        Self {
            operation,
            identifier: identifier.to_string(),
            allowed: true,
            limit: 0,
            remaining: 0,
            reset_at: now,
            reported_tier: None,
            tiers: Vec::new(),
        }
    }

    // == Retry After ==
    /// Whole seconds until the reported tier resets, at least 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }

    /// True when any tier was decided by the failure policy.
    pub fn degraded(&self) -> bool {
        self.tiers.iter().any(|t| t.degraded)
    }
}

// == Rate Limiter ==
#[derive(Clone)]
pub struct RateLimiter {
    store: CacheStore,
    policies: HashMap<OperationClass, RateLimitPolicy>,
    failure_policy: FailurePolicy,
}

impl RateLimiter {
    // == Constructor ==
    /// A limiter with no policies; operations without a policy are unthrottled.
    pub fn new(store: CacheStore, failure_policy: FailurePolicy) -> Self {
        Self {
            store,
            policies: HashMap::new(),
            failure_policy,
        }
    }

    /// Registers (or replaces) the policy for an operation class.
    pub fn with_policy(mut self, operation: OperationClass, policy: RateLimitPolicy) -> Self {
        self.policies.insert(operation, policy);
        self
    }

    pub fn policy(&self, operation: OperationClass) -> Option<&RateLimitPolicy> {
        self.policies.get(&operation)
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    // == Check ==
    /// Counts one request from `identifier` against every tier of the
    /// operation's policy.
    pub async fn check(&self, operation: OperationClass, identifier: &str) -> RateLimitDecision {
        self.check_at(operation, identifier, Utc::now()).await
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub async fn check_at(
        &self,
        operation: OperationClass,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let Some(policy) = self.policies.get(&operation) else {
            debug!(operation = %operation, "no rate-limit policy, request unthrottled");
            return RateLimitDecision::unthrottled(operation, identifier, now);
        };

        let mut tiers = Vec::with_capacity(policy.tiers().len());
        for tier in policy.tiers() {
            let decision = self.evaluate_tier(operation, tier, identifier, now).await;
            let denied = !decision.allowed;
            tiers.push(decision);
            if denied {
                break;
            }
        }

        let allowed = tiers.iter().all(|t| t.allowed);
        let reported = if allowed {
            tiers.iter().min_by_key(|t| t.remaining)
        } else {
            tiers.iter().find(|t| !t.allowed)
        };

        let (limit, remaining, reset_at, reported_tier) = match reported {
            Some(t) => (t.limit, t.remaining, t.reset_at, Some(t.tier.clone())),
            None => (0, 0, now, None),
        };

        if !allowed {
            warn!(
                operation = %operation,
                identifier = %identifier,
                tier = reported_tier.as_deref().unwrap_or_default(),
                reset_at = %reset_at,
                "rate limit exceeded"
            );
        }

        RateLimitDecision {
            operation,
            identifier: identifier.to_string(),
            allowed,
            limit,
            remaining,
            reset_at,
            reported_tier,
            tiers,
        }
    }

    async fn evaluate_tier(
        &self,
        operation: OperationClass,
        tier: &RateLimitTier,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> TierDecision {
        let window_index = now.timestamp().max(0) as u64 / tier.window_secs;
        let reset_at = window_start(window_index + 1, tier.window_secs);
        let key = counter_key(operation, tier, identifier, window_index);

        match self
            .store
            .incr_with_ttl(&key, Duration::from_secs(tier.window_secs))
            .await
        {
            Ok(count) => TierDecision {
                tier: tier.name.clone(),
                allowed: count <= tier.max_requests,
                limit: tier.max_requests,
                count,
                remaining: tier.max_requests.saturating_sub(count),
                reset_at,
                degraded: false,
            },
            Err(err) => {
                let allowed = self.failure_policy == FailurePolicy::Open;
                warn!(
                    key = %key,
                    error = %err,
                    allowed,
                    "counter store unavailable, applying failure policy"
                );
                TierDecision {
                    tier: tier.name.clone(),
                    allowed,
                    limit: tier.max_requests,
                    count: 0,
                    remaining: if allowed { tier.max_requests } else { 0 },
                    reset_at,
                    degraded: true,
                }
            }
        }
    }
}

/// Counter key for one tier window.
pub fn counter_key(
    operation: OperationClass,
    tier: &RateLimitTier,
    identifier: &str,
    window_index: u64,
) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        COUNTER_PREFIX,
        operation,
        tier.name,
        tier.identifier_for(identifier),
        window_index
    )
}

fn window_start(window_index: u64, window_secs: u64) -> DateTime<Utc> {
    let secs = window_index.saturating_mul(window_secs).min(i64::MAX as u64) as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use std::sync::Arc;

    /// 10:00:05 UTC, five seconds into a minute window
    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 5).unwrap()
    }

    fn limiter_with(
        backend: Arc<MemoryBackend>,
        policy: RateLimitPolicy,
        failure: FailurePolicy,
    ) -> RateLimiter {
        let store = CacheStore::new(backend, Duration::from_millis(200));
        RateLimiter::new(store, failure).with_policy(OperationClass::AiContext, policy)
    }

    fn single_tier(max: u64, window: u64) -> RateLimitPolicy {
        RateLimitPolicy::new(vec![RateLimitTier::per_identifier("burst", max, window)])
    }

    #[tokio::test]
    async fn test_fixed_window_remaining_and_reset() {
        let limiter = limiter_with(
            Arc::new(MemoryBackend::new(100)),
            single_tier(5, 60),
            FailurePolicy::Closed,
        );

        let mut remaining = Vec::new();
        for _ in 0..5 {
            let d = limiter.check_at(OperationClass::AiContext, "user:1", t0()).await;
            assert!(d.allowed);
            remaining.push(d.remaining);
        }
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let sixth = limiter.check_at(OperationClass::AiContext, "user:1", t0()).await;
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.reset_at, Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap());
        assert_eq!(sixth.retry_after_secs(t0()), 55);
        assert_eq!(sixth.reported_tier.as_deref(), Some("burst"));
    }

    #[tokio::test]
    async fn test_next_window_starts_fresh() {
        let limiter = limiter_with(
            Arc::new(MemoryBackend::new(100)),
            single_tier(1, 60),
            FailurePolicy::Closed,
        );

        assert!(limiter.check_at(OperationClass::AiContext, "u", t0()).await.allowed);
        assert!(!limiter.check_at(OperationClass::AiContext, "u", t0()).await.allowed);

        let next_window = t0() + chrono::Duration::seconds(60);
        assert!(limiter.check_at(OperationClass::AiContext, "u", next_window).await.allowed);
    }

    #[tokio::test]
    async fn test_cache_pressure_cannot_reset_a_counter() {
        let backend = Arc::new(MemoryBackend::new(3));
        let store = CacheStore::new(backend.clone(), Duration::from_millis(200));
        let limiter = limiter_with(backend, single_tier(1, 60), FailurePolicy::Closed);

        let mut admitted = 0;
        for i in 0..5 {
            if limiter.check_at(OperationClass::AiContext, "user:1", t0()).await.allowed {
                admitted += 1;
            }
            for j in 0..3 {
                store.set(&format!("course:{}:{}", i, j), "cached", 300).await;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_identifiers_are_isolated() {
        let limiter = limiter_with(
            Arc::new(MemoryBackend::new(100)),
            single_tier(1, 60),
            FailurePolicy::Closed,
        );

        assert!(limiter.check_at(OperationClass::AiContext, "a", t0()).await.allowed);
        assert!(limiter.check_at(OperationClass::AiContext, "b", t0()).await.allowed);
        assert!(!limiter.check_at(OperationClass::AiContext, "a", t0()).await.allowed);
    }

    #[tokio::test]
    async fn test_global_tier_reported_first() {
        let policy = RateLimitPolicy::new(vec![
            RateLimitTier::per_identifier("burst", 10, 60),
            RateLimitTier::global("global", 2, 30),
        ]);
        let limiter = limiter_with(Arc::new(MemoryBackend::new(100)), policy, FailurePolicy::Closed);

        limiter.check_at(OperationClass::AiContext, "a", t0()).await;
        limiter.check_at(OperationClass::AiContext, "b", t0()).await;
        let denied = limiter.check_at(OperationClass::AiContext, "c", t0()).await;

        assert!(!denied.allowed);
        assert_eq!(denied.reported_tier.as_deref(), Some("global"));
        assert_eq!(denied.limit, 2);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap());
        // Short-circuited before the per-identifier tier
        assert_eq!(denied.tiers.len(), 1);
    }

    #[tokio::test]
    async fn test_earlier_tiers_not_rolled_back_on_later_denial() {
        let backend = Arc::new(MemoryBackend::new(100));
        let policy = RateLimitPolicy::new(vec![
            RateLimitTier::global("global", 100, 60),
            RateLimitTier::per_identifier("burst", 1, 60),
        ]);
        let limiter = limiter_with(backend, policy, FailurePolicy::Closed);

        limiter.check_at(OperationClass::AiContext, "a", t0()).await;
        let denied = limiter.check_at(OperationClass::AiContext, "a", t0()).await;
        assert!(!denied.allowed);
        assert_eq!(denied.reported_tier.as_deref(), Some("burst"));

        // The denied request still consumed a global slot
        let next = limiter.check_at(OperationClass::AiContext, "b", t0()).await;
        assert_eq!(next.tiers[0].tier, "global");
        assert_eq!(next.tiers[0].count, 3);
    }

    #[tokio::test]
    async fn test_allowed_reports_least_headroom() {
        let policy = RateLimitPolicy::standard(1000, 30, 500);
        let limiter = limiter_with(Arc::new(MemoryBackend::new(100)), policy, FailurePolicy::Closed);

        let d = limiter.check_at(OperationClass::AiContext, "user:42", t0()).await;
        assert!(d.allowed);
        assert_eq!(d.reported_tier.as_deref(), Some("burst"));
        assert_eq!(d.limit, 30);
        assert_eq!(d.remaining, 29);
        assert_eq!(d.tiers.len(), 3);
    }

    #[tokio::test]
    async fn test_fail_closed_denies_on_outage() {
        let backend = Arc::new(MemoryBackend::new(100));
        let limiter = limiter_with(backend.clone(), single_tier(5, 60), FailurePolicy::Closed);
        backend.set_available(false);

        let d = limiter.check_at(OperationClass::AiContext, "u", t0()).await;
        assert!(!d.allowed);
        assert!(d.degraded());
        assert_eq!(d.remaining, 0);
    }

    #[tokio::test]
    async fn test_fail_open_allows_on_outage() {
        let backend = Arc::new(MemoryBackend::new(100));
        let limiter = limiter_with(backend.clone(), single_tier(5, 60), FailurePolicy::Open);
        backend.set_available(false);

        let d = limiter.check_at(OperationClass::AiContext, "u", t0()).await;
        assert!(d.allowed);
        assert!(d.degraded());
        assert_eq!(d.remaining, 5);
    }

    #[tokio::test]
    async fn test_unconfigured_operation_is_unthrottled() {
        let limiter = limiter_with(
            Arc::new(MemoryBackend::new(100)),
            single_tier(0, 60),
            FailurePolicy::Closed,
        );
        let d = limiter.check_at(OperationClass::AiChat, "u", t0()).await;
        assert!(d.allowed);
        assert!(d.tiers.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_over_admit() {
        let limiter = limiter_with(
            Arc::new(MemoryBackend::new(100)),
            single_tier(10, 60),
            FailurePolicy::Closed,
        );

        let mut handles = Vec::new();
        for _ in 0..40 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.check_at(OperationClass::AiContext, "u", t0()).await.allowed
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_counter_key_layout() {
        let burst = RateLimitTier::per_identifier("burst", 5, 60);
        let global = RateLimitTier::global("global", 5, 60);
        assert_eq!(
            counter_key(OperationClass::AiChat, &burst, "user:7", 42),
            "ratelimit:ai-chat:burst:user:7:42"
        );
        assert_eq!(
            counter_key(OperationClass::AiChat, &global, "user:7", 42),
            "ratelimit:ai-chat:global:global:42"
        );
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let mut d = RateLimitDecision::unthrottled(OperationClass::AiChat, "u", t0());
        d.reset_at = t0() + chrono::Duration::milliseconds(1500);
        assert_eq!(d.retry_after_secs(t0()), 2);
        d.reset_at = t0() - chrono::Duration::seconds(5);
        assert_eq!(d.retry_after_secs(t0()), 1);
    }
}
