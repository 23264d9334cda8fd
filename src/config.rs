//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::ratelimit::FailurePolicy;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Maximum number of entries the in-process backend can hold
    pub max_entries: usize,
    /// Default TTL in seconds for cache families without an explicit TTL
    pub default_ttl: u64,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Upper bound on a single store round trip, in milliseconds
    pub store_timeout_ms: u64,
    /// Coalesce concurrent misses on the same key
    pub single_flight: bool,
    /// Decision taken when the counter store cannot be reached
    pub rate_limit_failure_policy: FailurePolicy,
    /// System-wide AI requests per minute, shared by every caller
    pub ai_global_per_minute: u64,
    /// Per-caller AI context extraction requests per minute
    pub ai_context_per_minute: u64,
    /// Per-caller AI chat requests per minute
    pub ai_chat_per_minute: u64,
    /// Per-caller AI requests per day, per operation class
    pub ai_daily_quota: u64,
    /// Upper bound on a single AI provider call, in seconds
    pub ai_timeout_secs: u64,
    /// Shared store URL, honoured when built with the `redis` feature
    pub redis_url: Option<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `MAX_ENTRIES` - Maximum in-process entries (default: 10000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CLEANUP_INTERVAL` - Expiry sweep frequency in seconds (default: 1)
    /// - `STORE_TIMEOUT_MS` - Store round-trip bound (default: 250)
    /// - `SINGLE_FLIGHT` - Coalesce concurrent misses (default: true)
    /// - `RATE_LIMIT_FAILURE_POLICY` - `open` or `closed` (default: closed)
    /// - `AI_GLOBAL_PER_MINUTE` - Global AI cap (default: 1000)
    /// - `AI_CONTEXT_PER_MINUTE` - Per-user context extraction burst (default: 30)
    /// - `AI_CHAT_PER_MINUTE` - Per-user chat burst (default: 20)
    /// - `AI_DAILY_QUOTA` - Per-user daily budget (default: 500)
    /// - `AI_TIMEOUT_SECS` - AI provider call bound (default: 15)
    /// - `REDIS_URL` - Shared store URL (default: unset)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            store_timeout_ms: env_or("STORE_TIMEOUT_MS", defaults.store_timeout_ms),
            single_flight: env_or("SINGLE_FLIGHT", defaults.single_flight),
            rate_limit_failure_policy: env_or(
                "RATE_LIMIT_FAILURE_POLICY",
                defaults.rate_limit_failure_policy,
            ),
            ai_global_per_minute: env_or("AI_GLOBAL_PER_MINUTE", defaults.ai_global_per_minute),
            ai_context_per_minute: env_or(
                "AI_CONTEXT_PER_MINUTE",
                defaults.ai_context_per_minute,
            ),
            ai_chat_per_minute: env_or("AI_CHAT_PER_MINUTE", defaults.ai_chat_per_minute),
            ai_daily_quota: env_or("AI_DAILY_QUOTA", defaults.ai_daily_quota),
            ai_timeout_secs: env_or("AI_TIMEOUT_SECS", defaults.ai_timeout_secs),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            max_entries: 10_000,
            default_ttl: 300,
            cleanup_interval: 1,
            store_timeout_ms: 250,
            single_flight: true,
            rate_limit_failure_policy: FailurePolicy::Closed,
            ai_global_per_minute: 1000,
            ai_context_per_minute: 30,
            ai_chat_per_minute: 20,
            ai_daily_quota: 500,
            ai_timeout_secs: 15,
            redis_url: None,
        }
    }
}

/// Reads and parses an environment variable, falling back on absence or parse failure.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
