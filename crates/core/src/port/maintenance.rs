// DB Maintenance port
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Database maintenance statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceStats {
    pub db_size_mb: f64,
    pub db_size_bytes: i64,
    pub job_count: i64,
    pub terminal_job_count: i64,
    pub fragmentation_percent: f64,
}

/// Maintenance configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Retention period for terminal jobs (days)
    pub job_retention_days: i64,

    /// DB size above which the weekly pass runs VACUUM (MB)
    pub max_db_size_mb: f64,

    /// Free-page ratio above which the weekly pass runs VACUUM (%)
    pub max_fragmentation_percent: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            job_retention_days: 30,
            max_db_size_mb: 1000.0,
            max_fragmentation_percent: 20.0,
        }
    }
}

/// Storage-engine level operations; row retention lives on `JobStore`
#[async_trait]
pub trait Maintenance: Send + Sync {
    /// Run VACUUM to reclaim space and optimize DB
    ///
    /// # Returns
    /// Space reclaimed in MB
    async fn vacuum(&self) -> Result<f64>;

    /// Get maintenance statistics
    async fn get_stats(&self) -> Result<MaintenanceStats>;
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns fixed stats and counts VACUUM calls
    #[derive(Default)]
    pub struct MockMaintenance {
        pub stats: Mutex<MaintenanceStats>,
        vacuums: AtomicUsize,
    }

    impl MockMaintenance {
        pub fn with_stats(stats: MaintenanceStats) -> Self {
            Self {
                stats: Mutex::new(stats),
                vacuums: AtomicUsize::new(0),
            }
        }

        pub fn vacuum_count(&self) -> usize {
            self.vacuums.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Maintenance for MockMaintenance {
        async fn vacuum(&self) -> Result<f64> {
            self.vacuums.fetch_add(1, Ordering::SeqCst);
            Ok(0.0)
        }

        async fn get_stats(&self) -> Result<MaintenanceStats> {
            Ok(self.stats.lock().unwrap().clone())
        }
    }
}
