//! Expiry Sweep Task
//!
//! Reads already treat expired entries as absent; the sweep reclaims their
//! memory so capacity eviction only has to consider live entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryBackend;

/// Spawns a task that purges expired entries every `cleanup_interval_secs`.
///
/// Returns the task handle so shutdown can abort it.
pub fn spawn_cleanup_task(
    backend: Arc<MemoryBackend>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = backend.purge_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
