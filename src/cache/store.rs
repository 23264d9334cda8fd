//! Cache Store Module
//!
//! Typed facade over a [`KvBackend`]. Values are stored as JSON text.
//!
//! Store failures are absorbed here: a failed or timed-out read is a miss,
//! a failed write or delete is logged and dropped. A cache outage therefore
//! costs freshness and latency, never the caller's primary operation. The
//! `try_*` variants expose the raw outcome for callers that need to report it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::KvBackend;
use crate::error::{StoreError, StoreResult};

// == Cache Store ==
/// Shared handle to the backing store. Cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KvBackend>,
    /// Upper bound on each backend round trip
    timeout: Duration,
}

impl CacheStore {
    // == Constructor ==
    /// Wraps a backend, bounding every call by `timeout`.
    pub fn new(backend: Arc<dyn KvBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Name of the underlying backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` when missing, expired,
    /// undecodable as `T`, or when the store is unavailable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Fallible read.
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let raw = self.bounded(self.backend.get(key)).await?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    // == Set ==
    /// Stores `value` for `ttl_secs` seconds, replacing any prior value.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        if let Err(err) = self.try_set(key, value, ttl_secs).await {
            warn!(key = %key, error = %err, "cache write failed, continuing without it");
        }
    }

    /// Fallible write.
    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let text = serde_json::to_string(value)?;
        self.bounded(self.backend.set(key, text, Duration::from_secs(ttl_secs)))
            .await?;
        debug!(key = %key, ttl_secs, "cache entry stored");
        Ok(())
    }

    // == Delete ==
    /// Removes `key`. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) {
        self.delete_many(&[key.to_string()]).await;
    }

    /// Removes every listed key. Returns the number that existed, or 0 on failure.
    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        match self.try_delete_many(keys).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(keys = keys.len(), error = %err, "cache delete failed, continuing");
                0
            }
        }
    }

    /// Fallible bulk delete.
    pub async fn try_delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded(self.backend.delete_many(keys)).await
    }

    // == Exists ==
    /// Returns true if a live entry exists. An unavailable store reports false.
    pub async fn exists(&self, key: &str) -> bool {
        match self.bounded(self.backend.exists(key)).await {
            Ok(found) => found,
            Err(err) => {
                warn!(key = %key, error = %err, "cache existence check failed");
                false
            }
        }
    }

    // == Keys Matching ==
    /// Best-effort enumeration of keys matching a glob. Empty on failure.
    ///
    /// Non-atomic and potentially expensive: bulk invalidation and
    /// diagnostics only.
    pub async fn keys_matching(&self, pattern: &str) -> Vec<String> {
        match self.try_keys_matching(pattern).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(pattern = %pattern, error = %err, "key enumeration failed");
                Vec::new()
            }
        }
    }

    /// Fallible enumeration.
    pub async fn try_keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.bounded(self.backend.keys_matching(pattern)).await
    }

    /// Raw serialized text under `key`, used for footprint sampling.
    pub async fn raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.bounded(self.backend.get(key)).await
    }

    // == Counters ==
    /// Atomic increment with TTL-on-create. Errors are returned, not absorbed:
    /// the rate limiter applies its own failure policy.
    pub async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.bounded(self.backend.incr_with_ttl(key, ttl)).await
    }

    // == Ping ==
    /// Liveness check against the backend.
    pub async fn ping(&self) -> StoreResult<()> {
        self.bounded(self.backend.ping()).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Course {
        id: String,
        title: String,
        lessons: u32,
    }

    fn store_with(backend: Arc<MemoryBackend>) -> CacheStore {
        CacheStore::new(backend, Duration::from_millis(200))
    }

    fn sample_course() -> Course {
        Course {
            id: "c-1".to_string(),
            title: "Ownership 101".to_string(),
            lessons: 12,
        }
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        store.set("course:c-1", &sample_course(), 60).await;

        let loaded: Option<Course> = store.get("course:c-1").await;
        assert_eq!(loaded, Some(sample_course()));
        assert!(store.exists("course:c-1").await);
    }

    #[tokio::test]
    async fn test_missing_key_is_absent_not_error() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        let loaded: Option<Course> = store.get("nope").await;
        assert!(loaded.is_none());
        assert!(store.try_get::<Course>("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        store.set("k", &1u32, 60).await;

        store.delete("k").await;
        store.delete("k").await;
        store.delete("never-existed").await;
        assert!(!store.exists("k").await);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        store.set("a", &1u32, 60).await;
        store.set("b", &2u32, 60).await;

        let removed = store
            .delete_many(&["a".to_string(), "b".to_string(), "z".to_string()])
            .await;
        assert_eq!(removed, 2);
        assert_eq!(store.delete_many(&[]).await, 0);
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_miss() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        store.set("k", "plain text", 60).await;

        let loaded: Option<Course> = store.get("k").await;
        assert!(loaded.is_none());
        assert!(matches!(
            store.try_get::<Course>("k").await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_outage_degrades_to_miss_and_noop() {
        let backend = Arc::new(MemoryBackend::new(100));
        let store = store_with(backend.clone());
        store.set("k", &1u32, 60).await;

        backend.set_available(false);
        assert_eq!(store.get::<u32>("k").await, None);
        store.set("k2", &2u32, 60).await;
        store.delete("k").await;
        assert!(!store.exists("k").await);
        assert!(store.keys_matching("*").await.is_empty());
        assert!(store.ping().await.is_err());

        backend.set_available(true);
        assert_eq!(store.get::<u32>("k").await, Some(1));
        assert_eq!(store.get::<u32>("k2").await, None);
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let backend = Arc::new(MemoryBackend::new(100).with_latency(Duration::from_millis(100)));
        let store = CacheStore::new(backend, Duration::from_millis(20));

        assert!(matches!(store.ping().await, Err(StoreError::Timeout(20))));
        assert_eq!(store.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn test_keys_matching() {
        let store = store_with(Arc::new(MemoryBackend::new(100)));
        store.set("user:courses:page:1", &0u8, 60).await;
        store.set("user:courses:page:2", &0u8, 60).await;
        store.set("admin:courses:page:1", &0u8, 60).await;

        let mut keys = store.keys_matching("user:courses*").await;
        keys.sort();
        assert_eq!(keys, vec!["user:courses:page:1", "user:courses:page:2"]);
    }
}
