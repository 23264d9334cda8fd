//! Cache Entry Module
//!
//! Defines the structure for individual stored values with TTL support.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// A serialized value plus its expiration instant.
///
/// Entries always carry an expiration; every cache family and every
/// rate-limit counter is bounded by a TTL.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value (JSON text, or a decimal counter)
    pub value: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Whether capacity pressure may remove this entry before it expires
    pub evictable: bool,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry expiring `ttl` from now.
    pub fn new(value: String, ttl: Duration) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl.as_millis() as u64),
            evictable: true,
        }
    }

    /// A fresh counter at 1. Counters leave the store only through expiry.
    pub fn counter(ttl: Duration) -> Self {
        Self {
            evictable: false,
            ..Self::new("1".to_string(), ttl)
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration
    /// instant, so a zero TTL is never readable.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Expiry check against an explicit clock reading.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
