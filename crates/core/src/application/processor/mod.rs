// Job Processor - claim loop dispatching jobs to their handlers

mod cancel;
pub mod constants;
mod shutdown;

pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::handlers::{HandlerRegistry, JobContext};
use crate::application::recovery::RecoveryService;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{DomainError, Job, JobId};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};
use constants::*;
use futures::future::join_all;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Processor tuning
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub tick_interval: Duration,
    pub batch_size: usize,
    pub handler_timeout: Duration,
    pub retry_base_delay_ms: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

impl ProcessorConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_retry_base_delay_ms(mut self, delay_ms: i64) -> Self {
        self.retry_base_delay_ms = delay_ms.max(0);
        self
    }
}

/// Claims due jobs and runs them through the handler registry
pub struct JobProcessor {
    job_store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    retry_policy: RetryPolicy,
    recovery: Option<Arc<RecoveryService>>,
    config: ProcessorConfig,
    // Cancellation handles of jobs currently executing
    running: Mutex<HashMap<JobId, CancelHandle>>,
}

impl JobProcessor {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        time_provider: Arc<dyn TimeProvider>,
        config: ProcessorConfig,
    ) -> Self {
        let retry_policy = RetryPolicy::new(time_provider, config.retry_base_delay_ms);
        Self {
            job_store,
            handlers,
            retry_policy,
            recovery: None,
            config,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Run a stale-job sweep once before the first claim
    pub fn with_recovery(mut self, recovery: Arc<RecoveryService>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Number of jobs whose handler is currently executing
    pub fn in_flight(&self) -> usize {
        self.running_jobs().len()
    }

    /// Run processor loop with graceful shutdown support
    ///
    /// Shutdown is observed between ticks; an in-flight batch is always awaited.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(
            tick_secs = self.config.tick_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Job processor started"
        );

        if let Some(recovery) = &self.recovery {
            if let Err(e) = recovery.recover_stale_jobs().await {
                error!(error = %e, "Startup recovery failed");
            }
        }

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.tick().await {
                // Full batch: more work is probably due, claim again right away
                Ok(processed) if processed >= self.config.batch_size => continue,
                Ok(_) => {
                    tokio::select! {
                        _ = sleep(self.config.tick_interval) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(error = %e, "Processor tick failed");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        info!("Job processor stopped");
        Ok(())
    }

    /// Claim one batch and run it to completion; returns the number of jobs claimed
    pub async fn tick(&self) -> Result<usize> {
        let jobs = self.job_store.claim_pending(self.config.batch_size).await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let count = jobs.len();
        info!(count = count, "Claimed jobs");

        let results = join_all(jobs.into_iter().map(|job| self.process_job(job))).await;
        for result in results {
            if let Err(e) = result {
                error!(error = %e, "Failed to record job outcome");
            }
        }

        Ok(count)
    }

    /// Cancel a Pending or Running job, interrupting its handler if it is executing here
    pub async fn cancel(&self, job_id: &JobId) -> Result<Job> {
        let job = self.job_store.cancel(job_id).await?;
        if let Some(handle) = self.running_jobs().get(job_id) {
            handle.cancel();
            info!(job_id = %job_id, "Cancellation signalled to running handler");
        }
        Ok(job)
    }

    fn running_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, CancelHandle>> {
        // A poisoned map only means a panic elsewhere while holding the lock
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn process_job(&self, job: Job) -> Result<()> {
        let handler = match self.handlers.get(job.kind) {
            Some(handler) => handler,
            None => {
                let err = AppError::Internal(format!("no handler registered for {}", job.kind));
                return self.record_failure(&job, err).await;
            }
        };

        info!(job_id = %job.id, kind = %job.kind, tenant_id = %job.tenant_id, "Processing job");

        let (handle, token) = cancel_channel();
        self.running_jobs().insert(job.id.clone(), handle);

        // Spawned so a panicking handler only takes down its own task
        let ctx = JobContext::new(job.clone(), token);
        let timeout = self.config.handler_timeout;
        let task = tokio::spawn(async move {
            match tokio::time::timeout(timeout, handler.execute(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Timeout(timeout.as_secs())),
            }
        });
        let outcome = task.await;

        self.running_jobs().remove(&job.id);

        match outcome {
            Ok(Ok(result)) => self.record_success(&job, result).await,
            Ok(Err(err)) => self.record_failure(&job, err).await,
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    "handler panicked"
                } else {
                    "handler task aborted"
                };
                error!(job_id = %job.id, error = ?join_err, "{}", message);
                self.record_failure(&job, AppError::Internal(message.to_string()))
                    .await
            }
        }
    }

    async fn record_success(&self, job: &Job, result: JsonValue) -> Result<()> {
        match self.job_store.complete(&job.id, result).await {
            Ok(()) => {
                info!(job_id = %job.id, kind = %job.kind, "Job completed");
                Ok(())
            }
            // Cancelled while the handler was finishing
            Err(AppError::Domain(DomainError::InvalidStateTransition { from, .. })) => {
                warn!(job_id = %job.id, status = %from, "Job finished after leaving RUNNING, result dropped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn record_failure(&self, job: &Job, err: AppError) -> Result<()> {
        if let AppError::Cancelled(_) = err {
            info!(job_id = %job.id, "Job cancelled");
            return Ok(());
        }

        match self.job_store.fail(&job.id, &err.to_string()).await {
            Ok(()) => {}
            Err(AppError::Domain(DomainError::InvalidStateTransition { from, .. })) => {
                warn!(job_id = %job.id, status = %from, error = %err, "Job failed after leaving RUNNING");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        match self.retry_policy.should_retry(job, &err) {
            RetryDecision::Retry(retry_at) => match self.job_store.retry(&job.id, retry_at).await {
                Ok(_) => {
                    warn!(
                        job_id = %job.id,
                        retry_count = job.retry_count + 1,
                        retry_at = retry_at,
                        error = %err,
                        "Job failed, retry scheduled"
                    );
                    Ok(())
                }
                Err(AppError::Conflict(msg)) => {
                    warn!(job_id = %job.id, reason = %msg, "Retry skipped, unit already queued again");
                    Ok(())
                }
                Err(e) => Err(e),
            },
            RetryDecision::Failed => {
                error!(
                    job_id = %job.id,
                    kind = %job.kind,
                    tenant_id = %job.tenant_id,
                    retry_count = job.retry_count,
                    error = %err,
                    "Job failed permanently"
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::JobHandler;
    use crate::domain::{ConsultPeriodParams, JobKind, JobParams, JobStatus, NewJob};
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::time_provider::mocks::MockTimeProvider;
    use crate::port::FetchError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Behaviour chosen per test
    enum Script {
        Succeed,
        FailTransient,
        FailPermanent,
        Panic,
        Hang,
    }

    struct ScriptedHandler {
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JobHandler for ScriptedHandler {
        fn kind(&self) -> JobKind {
            JobKind::ConsultPeriod
        }

        async fn execute(&self, ctx: &JobContext) -> Result<JsonValue> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::Succeed => Ok(json!({"ok": true})),
                Script::FailTransient => Err(FetchError::Unavailable("503".into()).into()),
                Script::FailPermanent => Err(AppError::MissingCredential(ctx.job.tenant_id.clone())),
                Script::Panic => panic!("handler blew up"),
                Script::Hang => {
                    ctx.run_cancellable(async {
                        sleep(Duration::from_secs(3600)).await;
                        Ok(json!({}))
                    })
                    .await
                }
            }
        }
    }

    struct Harness {
        store: Arc<InMemoryJobStore>,
        clock: Arc<MockTimeProvider>,
        processor: Arc<JobProcessor>,
    }

    fn harness(handler: Arc<ScriptedHandler>, config: ProcessorConfig) -> Harness {
        let clock = Arc::new(MockTimeProvider::new(1_000_000));
        let store = Arc::new(InMemoryJobStore::new(clock.clone()));
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        let processor = Arc::new(JobProcessor::new(
            store.clone(),
            Arc::new(registry),
            clock.clone(),
            config,
        ));
        Harness {
            store,
            clock,
            processor,
        }
    }

    fn consult_job(id: &str, period: &str) -> Job {
        Job::new(
            id,
            1_000_000,
            NewJob::new(
                "t-1",
                JobParams::ConsultPeriod(ConsultPeriodParams {
                    period: period.parse().unwrap(),
                    force_refresh: false,
                }),
            ),
        )
    }

    async fn status(store: &InMemoryJobStore, id: &str) -> Job {
        store.find_by_id(&id.to_string()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_success_completes_job() {
        let h = harness(ScriptedHandler::new(Script::Succeed), ProcessorConfig::default());
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        assert_eq!(h.processor.tick().await.unwrap(), 1);

        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"ok": true})));
        assert_eq!(h.processor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_with_linear_backoff() {
        let handler = ScriptedHandler::new(Script::FailTransient);
        let config = ProcessorConfig::default().with_retry_base_delay_ms(60_000);
        let h = harness(handler.clone(), config);
        let mut job = consult_job("j1", "2025-08");
        job.max_retries = 2;
        h.store.enqueue(&job).await.unwrap();

        h.processor.tick().await.unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.scheduled_at, 1_000_000 + 60_000);
        assert!(job.error_message.unwrap().contains("503"));

        // Not due yet
        assert_eq!(h.processor.tick().await.unwrap(), 0);

        h.clock.advance_millis(60_000);
        h.processor.tick().await.unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.retry_count, 2);
        assert_eq!(job.scheduled_at, 1_060_000 + 2 * 60_000);

        h.clock.advance_millis(120_000);
        h.processor.tick().await.unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_failure_is_final() {
        let h = harness(ScriptedHandler::new(Script::FailPermanent), ProcessorConfig::default());
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        h.processor.tick().await.unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert!(job.error_message.unwrap().contains("credential"));
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let h = harness(ScriptedHandler::new(Script::Panic), ProcessorConfig::default());
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        assert_eq!(h.processor.tick().await.unwrap(), 1);
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_timeout_fails_and_schedules_retry() {
        let config = ProcessorConfig::default().with_handler_timeout(Duration::from_millis(50));
        let h = harness(ScriptedHandler::new(Script::Hang), config);
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        h.processor.tick().await.unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert!(job.error_message.unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_handler() {
        let h = harness(ScriptedHandler::new(Script::Hang), ProcessorConfig::default());
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        let processor = h.processor.clone();
        let tick = tokio::spawn(async move { processor.tick().await });

        // Wait until the handler is executing
        for _ in 0..100 {
            if h.processor.in_flight() == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.processor.in_flight(), 1);

        let cancelled = h.processor.cancel(&"j1".to_string()).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        tokio::time::timeout(Duration::from_secs(2), tick)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let job = status(&h.store, "j1").await;
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(h.processor.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_batch_respects_priority_and_size() {
        let config = ProcessorConfig::default().with_batch_size(2);
        let h = harness(ScriptedHandler::new(Script::Succeed), config);

        let mut low = consult_job("low", "2025-06");
        low.priority = 10;
        let mut high = consult_job("high", "2025-07");
        high.priority = 1;
        let normal = consult_job("normal", "2025-08");
        h.store.enqueue(&low).await.unwrap();
        h.store.enqueue(&normal).await.unwrap();
        h.store.enqueue(&high).await.unwrap();

        assert_eq!(h.processor.tick().await.unwrap(), 2);
        assert_eq!(status(&h.store, "high").await.status, JobStatus::Completed);
        assert_eq!(status(&h.store, "normal").await.status, JobStatus::Completed);
        assert_eq!(status(&h.store, "low").await.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let config = ProcessorConfig::default().with_tick_interval(Duration::from_millis(10));
        let h = harness(ScriptedHandler::new(Script::Succeed), config);
        h.store.enqueue(&consult_job("j1", "2025-08")).await.unwrap();

        let (tx, token) = shutdown_channel();
        let processor = h.processor.clone();
        let run = tokio::spawn(async move { processor.run(token).await });

        for _ in 0..100 {
            if status(&h.store, "j1").await.status == JobStatus::Completed {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(status(&h.store, "j1").await.status, JobStatus::Completed);
    }
}
