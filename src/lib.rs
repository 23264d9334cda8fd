//! Courseware Cache - caching and throttling layer for a learning platform
//!
//! Cache-aside reads over a shared key-value store, rule-driven invalidation
//! of derived cache families, and multi-tier fixed-window rate limiting for
//! billable AI operations.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod monitor;
pub mod provider;
pub mod ratelimit;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_cleanup_task;
