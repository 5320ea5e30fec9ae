//! Scheduler - owns the periodic background loops
//!
//! - discovery: due tenants → sync policy → one CONSULT_PERIOD job per period
//! - credential cleanup: purge expired tenant credentials
//! - job purge: terminal-job retention and conditional VACUUM
//! - reaper: requeue jobs stuck in RUNNING
//!
//! A failing tick is logged and skipped; it never stops its loop.

use crate::application::ingest::IngestService;
use crate::application::maintenance::{MaintenanceReport, MaintenanceService};
use crate::application::processor::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::application::recovery::RecoveryService;
use crate::application::sync_policy::periods_to_consult;
use crate::error::Result;
use crate::port::{StaleSweep, TenantRegistry, TimeProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

const HOUR: Duration = Duration::from_secs(60 * 60);

/// Loop cadences
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub discovery_interval: Duration,
    pub credential_cleanup_interval: Duration,
    pub purge_interval: Duration,
    pub reaper_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_interval: HOUR,
            credential_cleanup_interval: 24 * HOUR,
            purge_interval: 7 * 24 * HOUR,
            reaper_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl SchedulerConfig {
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    pub fn with_credential_cleanup_interval(mut self, interval: Duration) -> Self {
        self.credential_cleanup_interval = interval;
        self
    }

    pub fn with_purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval = interval;
        self
    }
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub tenants: usize,
    pub enqueued: usize,
    pub already_queued: usize,
}

/// Collaborators used by the loops; cheap to share between tasks
pub struct SchedulerTasks {
    tenants: Arc<dyn TenantRegistry>,
    ingest: Arc<IngestService>,
    maintenance: Arc<MaintenanceService>,
    recovery: Arc<RecoveryService>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SchedulerTasks {
    pub fn new(
        tenants: Arc<dyn TenantRegistry>,
        ingest: Arc<IngestService>,
        maintenance: Arc<MaintenanceService>,
        recovery: Arc<RecoveryService>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            tenants,
            ingest,
            maintenance,
            recovery,
            time_provider,
        }
    }

    /// Enqueue consultations for every tenant due for sync
    ///
    /// A tenant whose enqueue fails is logged and skipped.
    pub async fn run_discovery(&self) -> Result<DiscoveryReport> {
        let now = self.time_provider.now();
        let tenants = self
            .tenants
            .active_tenants_due_for_sync(now.timestamp_millis())
            .await?;

        let mut report = DiscoveryReport {
            tenants: tenants.len(),
            ..DiscoveryReport::default()
        };

        for tenant in &tenants {
            let periods = periods_to_consult(tenant, now);
            match self.ingest.enqueue_consults(&tenant.id, &periods).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        if outcome.is_new() {
                            report.enqueued += 1;
                        } else {
                            report.already_queued += 1;
                        }
                    }
                }
                Err(e) => error!(tenant_id = %tenant.id, error = %e, "Failed to enqueue tenant sync"),
            }
        }

        info!(
            tenants = report.tenants,
            enqueued = report.enqueued,
            already_queued = report.already_queued,
            "Tenant discovery completed"
        );
        Ok(report)
    }

    pub async fn run_credential_cleanup(&self) -> Result<u64> {
        let purged = self
            .tenants
            .purge_expired_credentials(self.time_provider.now_millis())
            .await?;
        info!(purged = purged, "Expired credentials purged");
        Ok(purged)
    }

    pub async fn run_job_purge(&self) -> Result<MaintenanceReport> {
        self.maintenance.run_full_maintenance(false).await
    }

    pub async fn run_reaper(&self) -> Result<StaleSweep> {
        self.recovery.recover_stale_jobs().await
    }
}

/// Owns the background loops; constructed at startup, stopped explicitly at shutdown
pub struct Scheduler {
    tasks: Arc<SchedulerTasks>,
    config: SchedulerConfig,
    shutdown: Option<ShutdownSender>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(tasks: SchedulerTasks, config: SchedulerConfig) -> Self {
        Self {
            tasks: Arc::new(tasks),
            config,
            shutdown: None,
            handles: Vec::new(),
        }
    }

    pub fn tasks(&self) -> &Arc<SchedulerTasks> {
        &self.tasks
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawn every loop; no-op when already started
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (tx, _token) = shutdown_channel();

        info!(
            discovery_secs = self.config.discovery_interval.as_secs(),
            reaper_secs = self.config.reaper_interval.as_secs(),
            "Scheduler started"
        );

        self.handles = vec![
            spawn_loop("discovery", self.config.discovery_interval, tx.subscribe(), {
                let tasks = self.tasks.clone();
                move || {
                    let tasks = tasks.clone();
                    async move { tasks.run_discovery().await.map(|_| ()) }
                }
            }),
            spawn_loop(
                "credential-cleanup",
                self.config.credential_cleanup_interval,
                tx.subscribe(),
                {
                    let tasks = self.tasks.clone();
                    move || {
                        let tasks = tasks.clone();
                        async move { tasks.run_credential_cleanup().await.map(|_| ()) }
                    }
                },
            ),
            spawn_loop("job-purge", self.config.purge_interval, tx.subscribe(), {
                let tasks = self.tasks.clone();
                move || {
                    let tasks = tasks.clone();
                    async move { tasks.run_job_purge().await.map(|_| ()) }
                }
            }),
            spawn_loop("reaper", self.config.reaper_interval, tx.subscribe(), {
                let tasks = self.tasks.clone();
                move || {
                    let tasks = tasks.clone();
                    async move { tasks.run_reaper().await.map(|_| ()) }
                }
            }),
        ];
        self.shutdown = Some(tx);
    }

    /// Signal every loop and wait for them to exit; a tick in progress finishes first
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        tx.shutdown();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = ?e, "Scheduler loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: ShutdownToken,
    mut tick_fn: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait() => break,
            }
            if let Err(e) = tick_fn().await {
                error!(task = name, error = %e, "Scheduled task failed, skipping tick");
            }
        }
        info!(task = name, "Scheduler loop stopped");
    })
}
