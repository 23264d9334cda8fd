//! Cache Module
//!
//! Key derivation, the backing store contract and its implementations, the
//! failure-absorbing store facade, and the cache-aside wrapper.

mod aside;
mod backend;
mod entry;
mod key;
mod memory;
mod pattern;
#[cfg(feature = "redis")]
mod redis_backend;
mod store;


// Re-export public types
pub use aside::{CacheAside, Cached};
pub use backend::KvBackend;
pub use entry::CacheEntry;
pub use key::{build_key, encode_component, KeyBuilder, KeyParam, KEY_DELIMITER};
pub use memory::MemoryBackend;
pub use pattern::KeyPattern;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed key length in bytes for admin writes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes for admin writes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
