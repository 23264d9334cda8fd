//! Redis Backend Module
//!
//! Networked [`KvBackend`] shared by every server instance. Counter creation
//! and TTL assignment run in a single Lua script so concurrent callers in the
//! same window can never observe a counter without its expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::info;

use crate::cache::KvBackend;
use crate::error::{StoreError, StoreResult};

/// Batch size hint for `SCAN` iterations.
const SCAN_COUNT: usize = 200;

/// INCR, and set the expiry only when this increment created the key.
const INCR_WITH_TTL_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

// == Redis Backend ==
/// Redis implementation backed by an auto-reconnecting connection manager.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    incr_script: Script,
}

impl RedisBackend {
    // == Connect ==
    /// Opens a managed connection to `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to shared store at {}", url);
        Ok(Self {
            conn,
            incr_script: Script::new(INCR_WITH_TTL_SCRIPT),
        })
    }
}

/// Millisecond expiry for `PSETEX`, or `None` when the entry is already expired.
/// Redis rejects a zero expiry, so a zero TTL is written as a delete instead.
fn expiry_ms(ttl: Duration) -> Option<u64> {
    if ttl.is_zero() {
        return None;
    }
    Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1))
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        match expiry_ms(ttl) {
            Some(ms) => {
                let _: () = conn.pset_ex(key, value, ms).await?;
            }
            None => {
                let _: u64 = conn.del(key).await?;
            }
        }
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn keys_matching(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may report a key more than once across iterations
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let count: u64 = self
            .incr_script
            .key(key)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ttl_has_no_expiry() {
        assert_eq!(expiry_ms(Duration::ZERO), None);
    }

    #[test]
    fn test_expiry_keeps_millisecond_precision() {
        assert_eq!(expiry_ms(Duration::from_millis(1500)), Some(1500));
        assert_eq!(expiry_ms(Duration::from_secs(60)), Some(60_000));
        // Sub-millisecond TTLs still produce a valid expiry
        assert_eq!(expiry_ms(Duration::from_micros(10)), Some(1));
    }
}
