//! Backend Module
//!
//! The contract every key-value store implementation satisfies. The store is
//! the single source of truth for cache entries and rate-limit counters, so
//! every call is a potential network round trip and may fail.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

// == Key-Value Backend ==
/// Raw string key-value store with TTL and atomic counters.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Returns the stored value, or `None` when missing or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` expiring after `ttl`, replacing any prior value.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Removes every listed key; returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64>;

    /// Returns true if a live value exists for `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Enumerates live keys matching a glob pattern.
    ///
    /// Non-atomic and potentially expensive; reserved for bulk invalidation
    /// and diagnostics, never a request's hot path.
    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Atomically increments a counter and returns the new count.
    ///
    /// When the increment creates the counter, its TTL is set to `ttl` as
    /// part of the same atomic step. An existing counter keeps its TTL.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    /// Round-trip liveness check.
    async fn ping(&self) -> StoreResult<()>;

    /// Short label for logs and health output.
    fn name(&self) -> &'static str;
}
