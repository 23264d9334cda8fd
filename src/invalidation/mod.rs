//! Invalidation Module
//!
//! Maps entity mutations to the cache key patterns that must be purged.

mod router;
mod rules;

pub use router::{InvalidationReport, InvalidationRouter};
pub use rules::{escape_glob, namespaces, EntityType, InvalidationRule, ID_PLACEHOLDER};
