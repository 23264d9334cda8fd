//! Cache-Aside Module
//!
//! Turns "compute an expensive value" into "return the cached value, else
//! compute, store and return it", recording every lookup with the monitor.
//!
//! Without single-flight, concurrent callers racing on the same absent key
//! each run `produce` (cache stampede). With single-flight enabled, misses on
//! the same key queue behind a per-key async lock and re-read the cache once
//! the leader has stored its value. A failed computation is never cached, so
//! after a leader failure the next waiter computes on its own. A waiter's
//! lookup is recorded after it re-reads, so the monitor agrees with its `hit`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::cache::CacheStore;
use crate::monitor::CacheMonitor;

type FlightTable = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

// == Cached Value ==
/// A value plus whether it was served from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    /// True when no computation ran for this caller
    pub hit: bool,
}

// == Cache Aside ==
/// Cache-aside wrapper around a [`CacheStore`]. Cheap to clone.
#[derive(Clone)]
pub struct CacheAside {
    store: CacheStore,
    monitor: Arc<CacheMonitor>,
    flights: Option<Arc<FlightTable>>,
}

impl CacheAside {
    // == Constructor ==
    /// Plain cache-aside, no miss coalescing.
    pub fn new(store: CacheStore, monitor: Arc<CacheMonitor>) -> Self {
        Self {
            store,
            monitor,
            flights: None,
        }
    }

    /// Enables per-key single-flight for concurrent misses.
    pub fn with_single_flight(mut self) -> Self {
        self.flights = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn monitor(&self) -> &Arc<CacheMonitor> {
        &self.monitor
    }

    // == With Cache ==
    /// Returns the value cached under `key`, or runs `produce`, stores its
    /// result for `ttl_secs` seconds and returns it.
    ///
    /// Errors from `produce` propagate unchanged and are never cached.
    pub async fn with_cache<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_secs: u64,
        produce: F,
    ) -> Result<Cached<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        if let Some(value) = self.store.get::<T>(key).await {
            let latency_ms = elapsed_ms(started);
            self.monitor.record_hit(key, latency_ms);
            debug!(key = %key, latency_ms, "cache hit");
            return Ok(Cached { value, hit: true });
        }

        let Some(table) = &self.flights else {
            let latency_ms = elapsed_ms(started);
            self.monitor.record_miss(key, latency_ms);
            debug!(key = %key, latency_ms, "cache miss");
            return self.compute(key, ttl_secs, produce).await;
        };

        let flight = Flight::join(table, key);
        let _permit = flight.lock.lock().await;

        // Another caller may have filled the key while we waited. The lookup
        // is recorded only now, so it counts as whatever the caller is served.
        if let Some(value) = self.store.get::<T>(key).await {
            let latency_ms = elapsed_ms(started);
            self.monitor.record_hit(key, latency_ms);
            debug!(key = %key, latency_ms, "filled by concurrent caller");
            return Ok(Cached { value, hit: true });
        }
        let latency_ms = elapsed_ms(started);
        self.monitor.record_miss(key, latency_ms);
        debug!(key = %key, latency_ms, "cache miss");
        self.compute(key, ttl_secs, produce).await
    }

    async fn compute<T, E, F, Fut>(&self, key: &str, ttl_secs: u64, produce: F) -> Result<Cached<T>, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = produce().await?;
        self.store.set(key, &value, ttl_secs).await;
        Ok(Cached { value, hit: false })
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Membership in a per-key flight. Removes the table entry when the last
/// participant leaves, including on cancellation.
struct Flight {
    table: Arc<FlightTable>,
    key: String,
    lock: Arc<AsyncMutex<()>>,
}

impl Flight {
    fn join(table: &Arc<FlightTable>, key: &str) -> Self {
        let lock = table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();
        Self {
            table: table.clone(),
            key: key.to_string(),
            lock,
        }
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) <= 2 {
            table.remove(&self.key);
        }
    }
}
