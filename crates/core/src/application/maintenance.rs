// Maintenance Service
// Terminal-job retention plus storage-engine upkeep (VACUUM)

use crate::error::Result;
use crate::port::{JobStore, Maintenance, MaintenanceConfig, MaintenanceStats, TimeProvider};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// What one maintenance pass did
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub jobs_deleted: u64,
    pub vacuumed: bool,
    pub reclaimed_mb: f64,
    pub stats: MaintenanceStats,
}

pub struct MaintenanceService {
    job_store: Arc<dyn JobStore>,
    maintenance: Arc<dyn Maintenance>,
    time_provider: Arc<dyn TimeProvider>,
    config: MaintenanceConfig,
}

impl MaintenanceService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        maintenance: Arc<dyn Maintenance>,
        time_provider: Arc<dyn TimeProvider>,
        config: MaintenanceConfig,
    ) -> Self {
        Self {
            job_store,
            maintenance,
            time_provider,
            config,
        }
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    pub async fn stats(&self) -> Result<MaintenanceStats> {
        self.maintenance.get_stats().await
    }

    /// Purge terminal jobs past retention, then VACUUM when the database is
    /// oversized or fragmented (or `force_vacuum` is set)
    pub async fn run_full_maintenance(&self, force_vacuum: bool) -> Result<MaintenanceReport> {
        let cutoff = self.time_provider.now_millis() - self.config.job_retention_days * DAY_MS;
        let jobs_deleted = self.job_store.cleanup_older_than(cutoff).await?;

        let stats_before = self.maintenance.get_stats().await?;
        let needs_vacuum = force_vacuum
            || stats_before.db_size_mb > self.config.max_db_size_mb
            || stats_before.fragmentation_percent > self.config.max_fragmentation_percent;

        let reclaimed_mb = if needs_vacuum {
            self.maintenance.vacuum().await?
        } else {
            0.0
        };

        let stats = self.maintenance.get_stats().await?;
        info!(
            jobs_deleted = jobs_deleted,
            vacuumed = needs_vacuum,
            reclaimed_mb = reclaimed_mb,
            db_size_mb = stats.db_size_mb,
            "Maintenance completed"
        );

        Ok(MaintenanceReport {
            jobs_deleted,
            vacuumed: needs_vacuum,
            reclaimed_mb,
            stats,
        })
    }
}
