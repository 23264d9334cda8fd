//! Invalidation Router
//!
//! Purges every cache family derived from a mutated entity. Called by write
//! paths after the mutation commits and before the response is returned, so
//! the caller never reads its own write back from a stale entry.
//!
//! Enumeration and bulk delete are best effort. A failing pattern is logged
//! and skipped without rollback; entry TTLs bound how long anything missed
//! can be served.

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::invalidation::EntityType;

// == Invalidation Report ==
/// Outcome of one entity's invalidation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvalidationReport {
    pub entity: EntityType,
    pub entity_id: String,
    /// Patterns evaluated, scoped first
    pub patterns: Vec<String>,
    pub keys_deleted: u64,
    /// Patterns whose enumeration or delete failed
    pub failed_patterns: Vec<String>,
}

impl InvalidationReport {
    /// True when every pattern was enumerated and purged.
    pub fn is_complete(&self) -> bool {
        self.failed_patterns.is_empty()
    }
}

// == Invalidation Router ==
#[derive(Clone)]
pub struct InvalidationRouter {
    store: CacheStore,
}

impl InvalidationRouter {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    // == Invalidate ==
    /// Purges every key matching the entity's rule for `entity_id`.
    pub async fn invalidate(&self, entity: EntityType, entity_id: &str) -> InvalidationReport {
        let patterns = entity.rule().patterns(entity_id);
        let mut keys_deleted = 0u64;
        let mut failed_patterns = Vec::new();

        for pattern in &patterns {
            let keys = match self.store.try_keys_matching(pattern).await {
                Ok(keys) => keys,
                Err(err) => {
                    warn!(entity = %entity, pattern = %pattern, error = %err, "pattern enumeration failed");
                    failed_patterns.push(pattern.clone());
                    continue;
                }
            };

            match self.store.try_delete_many(&keys).await {
                Ok(removed) => keys_deleted += removed,
                Err(err) => {
                    warn!(entity = %entity, pattern = %pattern, keys = keys.len(), error = %err, "bulk delete failed");
                    failed_patterns.push(pattern.clone());
                }
            }
        }

        info!(
            entity = %entity,
            entity_id = %entity_id,
            keys_deleted,
            failed = failed_patterns.len(),
            "cache invalidated"
        );

        InvalidationReport {
            entity,
            entity_id: entity_id.to_string(),
            patterns,
            keys_deleted,
            failed_patterns,
        }
    }

    // == Invalidate Cascade ==
    /// Invalidates the mutated entity first, then its declared parent when
    /// `parent_id` is given (e.g. a lesson delete also changes its course's
    /// aggregate counts).
    pub async fn invalidate_cascade(
        &self,
        entity: EntityType,
        entity_id: &str,
        parent_id: Option<&str>,
    ) -> Vec<InvalidationReport> {
        let mut reports = vec![self.invalidate(entity, entity_id).await];

        if let (Some(parent), Some(parent_id)) = (entity.parent(), parent_id) {
            reports.push(self.invalidate(parent, parent_id).await);
        }
        reports
    }
}
