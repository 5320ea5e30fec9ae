// SQLite Maintenance Implementation
use crate::error::map_sqlx_error;
use async_trait::async_trait;
use nfse_core::error::Result;
use nfse_core::port::{Maintenance, MaintenanceStats};
use sqlx::SqlitePool;
use tracing::info;

const MB: f64 = 1024.0 * 1024.0;

/// SQLite maintenance implementation
pub struct SqliteMaintenance {
    pool: SqlitePool,
}

struct PageStats {
    page_count: i64,
    page_size: i64,
    freelist_count: i64,
}

impl PageStats {
    fn size_bytes(&self) -> i64 {
        self.page_count * self.page_size
    }

    fn size_mb(&self) -> f64 {
        self.size_bytes() as f64 / MB
    }

    /// Share of pages sitting on the freelist
    fn fragmentation_percent(&self) -> f64 {
        if self.page_count == 0 {
            0.0
        } else {
            self.freelist_count as f64 / self.page_count as f64 * 100.0
        }
    }
}

impl SqliteMaintenance {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn pragma(&self, name: &str) -> Result<i64> {
        sqlx::query_scalar(&format!("PRAGMA {}", name))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }

    async fn page_stats(&self) -> Result<PageStats> {
        Ok(PageStats {
            page_count: self.pragma("page_count").await?,
            page_size: self.pragma("page_size").await?,
            freelist_count: self.pragma("freelist_count").await?,
        })
    }
}

#[async_trait]
impl Maintenance for SqliteMaintenance {
    async fn vacuum(&self) -> Result<f64> {
        info!("Running VACUUM to optimize database...");

        let size_before = self.page_stats().await?.size_mb();

        // Rebuilds the file: reclaims freelist pages and defragments
        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let size_after = self.page_stats().await?.size_mb();
        let reclaimed = (size_before - size_after).max(0.0);

        info!(
            size_before_mb = size_before,
            size_after_mb = size_after,
            reclaimed_mb = reclaimed,
            "VACUUM completed"
        );

        Ok(reclaimed)
    }

    async fn get_stats(&self) -> Result<MaintenanceStats> {
        let pages = self.page_stats().await?;

        let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let terminal_job_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('COMPLETED', 'FAILED', 'CANCELLED')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(MaintenanceStats {
            db_size_mb: pages.size_mb(),
            db_size_bytes: pages.size_bytes(),
            job_count,
            terminal_job_count,
            fragmentation_percent: pages.fragmentation_percent(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteJobStore};
    use nfse_core::domain::{ConsultPeriodParams, Job, JobParams, NewJob};
    use nfse_core::port::time_provider::mocks::MockTimeProvider;
    use nfse_core::port::JobStore;
    use std::sync::Arc;

    async fn setup() -> SqlitePool {
        let pool = create_pool(":memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_maintenance_stats() {
        let pool = setup().await;
        let store = SqliteJobStore::new(pool.clone(), Arc::new(MockTimeProvider::new(0)));
        for (id, period) in [("a", "2025-01"), ("b", "2025-02")] {
            let job = Job::new(
                id,
                0,
                NewJob::new(
                    "t-1",
                    JobParams::ConsultPeriod(ConsultPeriodParams {
                        period: period.parse().unwrap(),
                        force_refresh: false,
                    }),
                ),
            );
            store.enqueue(&job).await.unwrap();
        }
        store.claim_pending(1).await.unwrap();
        store.cancel(&"b".to_string()).await.unwrap();

        let stats = SqliteMaintenance::new(pool).get_stats().await.unwrap();

        assert!(stats.db_size_mb > 0.0);
        assert_eq!(stats.db_size_bytes % 512, 0);
        assert_eq!(stats.job_count, 2);
        assert_eq!(stats.terminal_job_count, 1);
        assert!((0.0..=100.0).contains(&stats.fragmentation_percent));
    }

    #[tokio::test]
    async fn test_vacuum() {
        let maintenance = SqliteMaintenance::new(setup().await);

        // No space to reclaim in a fresh in-memory database, but VACUUM must succeed
        let reclaimed = maintenance.vacuum().await.unwrap();
        assert!(reclaimed >= 0.0);
    }

    #[test]
    fn test_fragmentation_percent() {
        let pages = PageStats {
            page_count: 200,
            page_size: 4096,
            freelist_count: 50,
        };
        assert_eq!(pages.fragmentation_percent(), 25.0);
        assert_eq!(pages.size_bytes(), 819_200);

        let empty = PageStats {
            page_count: 0,
            page_size: 4096,
            freelist_count: 0,
        };
        assert_eq!(empty.fragmentation_percent(), 0.0);
    }
}
