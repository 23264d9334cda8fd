//! Cache Monitor Module
//!
//! Passive, in-process hit/miss and latency accounting. The backing store
//! exposes no native statistics, so everything here is observed from the
//! caller's side and lives only as long as the process.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::cache::CacheStore;

/// Latency samples retained per key.
pub const MAX_LATENCY_SAMPLES: usize = 100;

/// Distinct keys tracked individually. Lookups on keys beyond this bound
/// still count toward the global totals.
pub const MAX_TRACKED_KEYS: usize = 10_000;

/// Keys sampled by default when estimating the store footprint.
pub const DEFAULT_FOOTPRINT_SAMPLE: usize = 20;

// == Key Metrics ==
/// Cumulative counters for one key plus a bounded latency window.
#[derive(Debug, Clone, Default)]
pub struct KeyMetrics {
    pub hits: u64,
    pub misses: u64,
    /// Most recent latencies in milliseconds, oldest first
    pub latencies: VecDeque<f64>,
}

impl KeyMetrics {
    fn record(&mut self, hit: bool, latency_ms: f64) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        if self.latencies.len() == MAX_LATENCY_SAMPLES {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    /// Mean of the retained latency window.
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latencies.is_empty() {
            0.0
        } else {
            self.latencies.iter().sum::<f64>() / self.latencies.len() as f64
        }
    }
}

// == Reports ==
/// Aggregate health across every observed key.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GlobalMetrics {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was observed
    pub hit_rate: f64,
    /// Mean latency over every recorded lookup, in milliseconds
    pub avg_latency_ms: f64,
    pub tracked_keys: usize,
}

/// Per-key counters, as listed by [`CacheMonitor::top_keys`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyReport {
    pub key: String,
    pub hits: u64,
    pub misses: u64,
}

/// Extrapolated store size. Always an estimate, never an exact figure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FootprintEstimate {
    pub sampled_keys: usize,
    pub total_keys: usize,
    pub avg_entry_bytes: usize,
    pub estimated_bytes: usize,
    pub exact: bool,
}

#[derive(Debug, Default)]
struct MonitorState {
    per_key: HashMap<String, KeyMetrics>,
    hits: u64,
    misses: u64,
    latency_total_ms: f64,
}

// == Cache Monitor ==
/// Thread-safe recorder shared by every request handler.
#[derive(Debug)]
pub struct CacheMonitor {
    state: Mutex<MonitorState>,
    key_limit: usize,
}

impl Default for CacheMonitor {
    fn default() -> Self {
        Self::with_key_limit(MAX_TRACKED_KEYS)
    }
}

impl CacheMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A monitor tracking at most `key_limit` distinct keys individually.
    pub fn with_key_limit(key_limit: usize) -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            key_limit,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, key: &str, hit: bool, latency_ms: f64) {
        let mut state = self.lock();
        if hit {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        state.latency_total_ms += latency_ms;

        if let Some(metrics) = state.per_key.get_mut(key) {
            metrics.record(hit, latency_ms);
        } else if state.per_key.len() < self.key_limit {
            let mut metrics = KeyMetrics::default();
            metrics.record(hit, latency_ms);
            state.per_key.insert(key.to_string(), metrics);
        }
    }

    // == Record Hit ==
    pub fn record_hit(&self, key: &str, latency_ms: f64) {
        self.record(key, true, latency_ms);
    }

    // == Record Miss ==
    pub fn record_miss(&self, key: &str, latency_ms: f64) {
        self.record(key, false, latency_ms);
    }

    // == Global Metrics ==
    /// Totals since process start (or the last [`reset`](Self::reset)).
    pub fn global_metrics(&self) -> GlobalMetrics {
        let state = self.lock();
        let total = state.hits + state.misses;
        let (hit_rate, avg_latency_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                state.hits as f64 / total as f64,
                state.latency_total_ms / total as f64,
            )
        };

        GlobalMetrics {
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            avg_latency_ms,
            tracked_keys: state.per_key.len(),
        }
    }

    // == Top Keys ==
    /// The `limit` most accessed keys, busiest first, ties broken by key.
    pub fn top_keys(&self, limit: usize) -> Vec<KeyReport> {
        let state = self.lock();
        let mut reports: Vec<KeyReport> = state
            .per_key
            .iter()
            .map(|(key, m)| KeyReport {
                key: key.clone(),
                hits: m.hits,
                misses: m.misses,
            })
            .collect();

        reports.sort_by(|a, b| {
            (b.hits + b.misses)
                .cmp(&(a.hits + a.misses))
                .then_with(|| a.key.cmp(&b.key))
        });
        reports.truncate(limit);
        reports
    }

    /// Snapshot of one key's counters.
    pub fn key_metrics(&self, key: &str) -> Option<KeyMetrics> {
        self.lock().per_key.get(key).cloned()
    }

    /// Clears every counter.
    pub fn reset(&self) {
        *self.lock() = MonitorState::default();
    }

    // == Footprint Estimate ==
    /// Estimates the store size by sampling up to `sample` keys and
    /// extrapolating their mean serialized size over the full key count.
    ///
    /// Enumerates the whole keyspace: diagnostics only.
    pub async fn estimate_footprint(&self, store: &CacheStore, sample: usize) -> FootprintEstimate {
        let keys = store.keys_matching("*").await;

        let mut sampled = 0usize;
        let mut bytes = 0usize;
        for key in keys.iter().take(sample) {
            if let Ok(Some(value)) = store.raw(key).await {
                sampled += 1;
                bytes += key.len() + value.len();
            }
        }

        let avg_entry_bytes = if sampled == 0 { 0 } else { bytes / sampled };
        FootprintEstimate {
            sampled_keys: sampled,
            total_keys: keys.len(),
            avg_entry_bytes,
            estimated_bytes: avg_entry_bytes * keys.len(),
            exact: false,
        }
    }
}
