// Crash recovery: stale Running jobs go back to the queue
use crate::port::{JobStore, StaleSweep, TimeProvider};
use std::sync::Arc;
use tracing::{info, warn};

/// Default age after which a Running job is considered abandoned (30 minutes)
///
/// Must exceed the handler timeout, otherwise live jobs get requeued.
pub const DEFAULT_STALE_AFTER_MS: i64 = 30 * 60 * 1000;

/// Requeues jobs left Running by a crashed or killed processor
pub struct RecoveryService {
    job_store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    stale_after_ms: i64,
}

impl RecoveryService {
    /// # Arguments
    /// * `stale_after_ms` - Optional custom threshold (default: 30 minutes)
    pub fn new(
        job_store: Arc<dyn JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        stale_after_ms: Option<i64>,
    ) -> Self {
        Self {
            job_store,
            time_provider,
            stale_after_ms: stale_after_ms.unwrap_or(DEFAULT_STALE_AFTER_MS),
        }
    }

    /// Sweep Running jobs started more than `stale_after` ago
    ///
    /// Jobs with retries left return to Pending (retry_count + 1); the rest are
    /// marked Failed.
    pub async fn recover_stale_jobs(&self) -> crate::error::Result<StaleSweep> {
        let cutoff = self.time_provider.now_millis() - self.stale_after_ms;
        let sweep = self.job_store.requeue_stale(cutoff).await?;

        if sweep.abandoned > 0 {
            warn!(
                abandoned = sweep.abandoned,
                "Stale jobs out of retries marked FAILED"
            );
        }
        if sweep.requeued > 0 || sweep.abandoned > 0 {
            info!(
                requeued = sweep.requeued,
                abandoned = sweep.abandoned,
                cutoff = cutoff,
                "Stale job recovery complete"
            );
        }
        Ok(sweep)
    }
}
