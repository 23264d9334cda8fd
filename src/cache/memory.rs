//! In-Process Backend Module
//!
//! HashMap storage with TTL expiration, used for single-node deployments and
//! tests. Expiry is enforced on every read; a background sweep reclaims the
//! memory of expired entries.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::entry::{current_timestamp_ms, CacheEntry};
use crate::cache::pattern::KeyPattern;
use crate::cache::KvBackend;
use crate::error::{StoreError, StoreResult};

/// Entries plus an expiry-ordered index of the ones eligible for eviction.
#[derive(Debug, Default)]
struct Shelf {
    entries: HashMap<String, CacheEntry>,
    /// `(expires_at, key)` for every evictable entry, nearest expiry first
    by_expiry: BTreeSet<(u64, String)>,
}

impl Shelf {
    fn insert(&mut self, key: &str, entry: CacheEntry) {
        self.remove(key);
        if entry.evictable {
            self.by_expiry.insert((entry.expires_at, key.to_string()));
        }
        self.entries.insert(key.to_string(), entry);
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        if entry.evictable {
            self.by_expiry.remove(&(entry.expires_at, key.to_string()));
        }
        Some(entry)
    }

    /// Evicts the evictable entry nearest to expiry (expired ones sort first).
    fn evict_one(&mut self) -> Option<String> {
        let (_, key) = self.by_expiry.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

// == Memory Backend ==
/// In-process implementation of [`KvBackend`].
///
/// Cache values are bounded to `max_entries`: when full, the value closest
/// to its expiration (expired ones first) is evicted. Counters created by
/// [`KvBackend::incr_with_ttl`] are never evicted and only leave through
/// TTL expiry, so a burst of cache writes cannot reset a live quota.
#[derive(Debug)]
pub struct MemoryBackend {
    /// Key-value storage
    shelf: RwLock<Shelf>,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Outage simulation switch
    available: AtomicBool,
    /// Artificial delay added to every call
    latency: Option<Duration>,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty backend holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            shelf: RwLock::new(Shelf::default()),
            max_entries: max_entries.max(1),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Adds a fixed delay before every operation, emulating a remote round trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // == Outage Simulation ==
    /// Marks the backend reachable or unreachable. While unreachable every
    /// operation fails with [`StoreError::Backend`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    async fn guard(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    // == Purge Expired ==
    /// Removes all expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut shelf = self.shelf.write().await;
        let expired: Vec<String> = shelf
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            shelf.remove(key);
        }
        expired.len()
    }

    // == Length ==
    /// Number of stored entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.shelf.read().await.entries.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.shelf.read().await.entries.is_empty()
    }

    /// Frees a slot for a new key when at capacity. When only counters
    /// remain there is nothing to evict and the shelf grows past the bound
    /// until they expire.
    fn make_room(&self, shelf: &mut Shelf) {
        if shelf.entries.len() < self.max_entries {
            return;
        }
        if let Some(victim) = shelf.evict_one() {
            debug!(key = %victim, "evicting entry nearest to expiry");
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.guard().await?;
        let shelf = self.shelf.read().await;
        Ok(shelf
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.guard().await?;
        let mut shelf = self.shelf.write().await;
        if !shelf.entries.contains_key(key) {
            self.make_room(&mut shelf);
        }
        shelf.insert(key, CacheEntry::new(value, ttl));
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        self.guard().await?;
        let mut shelf = self.shelf.write().await;
        let removed = keys
            .iter()
            .filter_map(|key| shelf.remove(key))
            .filter(|entry| !entry.is_expired())
            .count();
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.guard().await?;
        let pattern = KeyPattern::compile(pattern)?;
        let now = current_timestamp_ms();
        let shelf = self.shelf.read().await;
        Ok(shelf
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired_at(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        self.guard().await?;
        let now = current_timestamp_ms();
        let mut shelf = self.shelf.write().await;

        // The value changes in place; expiry, and with it the index, does not
        if let Some(entry) = shelf.entries.get_mut(key).filter(|e| !e.is_expired_at(now)) {
            let count: u64 = entry.value.parse().map_err(|_| {
                StoreError::Backend(format!("value at '{}' is not an integer", key))
            })?;
            let count = count + 1;
            entry.value = count.to_string();
            return Ok(count);
        }

        if !shelf.entries.contains_key(key) {
            self.make_room(&mut shelf);
        }
        shelf.insert(key, CacheEntry::counter(ttl));
        Ok(1)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.guard().await
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new(100);
        backend.set("k", "v".to_string(), TTL).await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
        assert!(backend.exists("k").await.unwrap());
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let backend = MemoryBackend::new(100);
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_resets_value() {
        let backend = MemoryBackend::new(100);
        backend.set("k", "v1".to_string(), TTL).await.unwrap();
        backend.set("k", "v2".to_string(), TTL).await.unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some("v2".to_string()));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_not_returned() {
        let backend = MemoryBackend::new(100);
        backend
            .set("k", "v".to_string(), Duration::from_millis(50))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(!backend.exists("k").await.unwrap());
        assert!(backend.keys_matching("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_many_counts_existing_only() {
        let backend = MemoryBackend::new(100);
        backend.set("a", "1".to_string(), TTL).await.unwrap();
        backend.set("b", "2".to_string(), TTL).await.unwrap();

        let removed = backend
            .delete_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_keys_matching() {
        let backend = MemoryBackend::new(100);
        backend.set("admin:courses:page:1", "[]".into(), TTL).await.unwrap();
        backend.set("admin:courses:page:2", "[]".into(), TTL).await.unwrap();
        backend.set("user:courses:page:1", "[]".into(), TTL).await.unwrap();

        let mut keys = backend.keys_matching("admin:courses*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["admin:courses:page:1", "admin:courses:page:2"]);
    }

    #[tokio::test]
    async fn test_incr_creates_then_increments() {
        let backend = MemoryBackend::new(100);
        assert_eq!(backend.incr_with_ttl("c", TTL).await.unwrap(), 1);
        assert_eq!(backend.incr_with_ttl("c", TTL).await.unwrap(), 2);
        assert_eq!(backend.incr_with_ttl("c", TTL).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incr_restarts_after_expiry() {
        let backend = MemoryBackend::new(100);
        let ttl = Duration::from_millis(50);
        backend.incr_with_ttl("c", ttl).await.unwrap();
        backend.incr_with_ttl("c", ttl).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.incr_with_ttl("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_keeps_original_ttl() {
        let backend = MemoryBackend::new(100);
        backend
            .incr_with_ttl("c", Duration::from_millis(100))
            .await
            .unwrap();
        // A later increment with a long TTL must not extend the window
        backend.incr_with_ttl("c", TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!backend.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_non_integer_fails() {
        let backend = MemoryBackend::new(100);
        backend.set("k", "\"text\"".into(), TTL).await.unwrap();
        assert!(backend.incr_with_ttl("k", TTL).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_incr_is_atomic() {
        let backend = std::sync::Arc::new(MemoryBackend::new(100));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                backend.incr_with_ttl("shared", TTL).await.unwrap()
            }));
        }

        let mut seen = Vec::new();
        for handle in handles {
            seen.push(handle.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_capacity_evicts_nearest_expiry() {
        let backend = MemoryBackend::new(2);
        backend.set("short", "1".into(), Duration::from_secs(10)).await.unwrap();
        backend.set("long", "2".into(), Duration::from_secs(1000)).await.unwrap();
        backend.set("new", "3".into(), Duration::from_secs(500)).await.unwrap();

        assert_eq!(backend.len().await, 2);
        assert!(!backend.exists("short").await.unwrap());
        assert!(backend.exists("long").await.unwrap());
        assert!(backend.exists("new").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new(100);
        backend.set("gone", "1".into(), Duration::from_millis(30)).await.unwrap();
        backend.set("kept", "2".into(), TTL).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let backend = MemoryBackend::new(100);
        backend.set_available(false);

        assert!(backend.get("k").await.is_err());
        assert!(backend.set("k", "v".into(), TTL).await.is_err());
        assert!(backend.incr_with_ttl("k", TTL).await.is_err());
        assert!(backend.ping().await.is_err());

        backend.set_available(true);
        assert!(backend.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_capacity_never_evicts_counters() {
        let backend = MemoryBackend::new(2);
        backend
            .incr_with_ttl("ratelimit:c", Duration::from_secs(60))
            .await
            .unwrap();
        for i in 0..5 {
            backend
                .set(&format!("value:{}", i), "v".into(), TTL)
                .await
                .unwrap();
        }

        assert_eq!(backend.incr_with_ttl("ratelimit:c", TTL).await.unwrap(), 2);
        assert_eq!(backend.len().await, 2);
        assert!(backend.exists("value:4").await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_prefers_expired_entries() {
        let backend = MemoryBackend::new(2);
        backend
            .set("stale", "1".into(), Duration::from_millis(20))
            .await
            .unwrap();
        backend.set("fresh", "2".into(), TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        backend.set("new", "3".into(), TTL).await.unwrap();
        assert!(backend.exists("fresh").await.unwrap());
        assert!(backend.exists("new").await.unwrap());
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_overwrite_reindexes_expiry() {
        let backend = MemoryBackend::new(2);
        backend.set("a", "1".into(), Duration::from_secs(10)).await.unwrap();
        backend.set("b", "2".into(), Duration::from_secs(100)).await.unwrap();
        // "a" now outlives "b", so "b" is the next victim
        backend.set("a", "1".into(), Duration::from_secs(1000)).await.unwrap();
        backend.set("c", "3".into(), Duration::from_secs(500)).await.unwrap();

        assert!(backend.exists("a").await.unwrap());
        assert!(!backend.exists("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_never_readable() {
        let backend = MemoryBackend::new(10);
        backend.set("k", "v".into(), TTL).await.unwrap();
        backend.set("k", "v2".into(), Duration::ZERO).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }
}
