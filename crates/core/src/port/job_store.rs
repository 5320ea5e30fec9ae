// Job Store Port (Interface)

use crate::domain::{Job, JobId, JobKind, JobStatus, TenantId};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Largest page the listing API hands out
pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Error message recorded on a Running job the reaper gives up on
pub const ABANDONED_MESSAGE: &str = "abandoned: processor stopped while job was running";

/// Outcome of an enqueue: unit keys allow one in-flight job each
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    /// A new Pending job was written
    Enqueued(Job),
    /// A Pending/Running job already covers the same unit of work
    AlreadyQueued(Job),
}

impl EnqueueOutcome {
    pub fn job(&self) -> &Job {
        match self {
            EnqueueOutcome::Enqueued(job) | EnqueueOutcome::AlreadyQueued(job) => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            EnqueueOutcome::Enqueued(job) | EnqueueOutcome::AlreadyQueued(job) => job,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, EnqueueOutcome::Enqueued(_))
    }
}

/// Listing filter; None fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub tenant_id: Option<TenantId>,
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.tenant_id.as_ref().map_or(true, |t| &job.tenant_id == t)
            && self.status.map_or(true, |s| job.status == s)
            && self.kind.map_or(true, |k| job.kind == k)
    }
}

/// 1-based page request, clamped to `1..=MAX_PER_PAGE` items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.per_page as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

/// Result of a stale-job sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleSweep {
    /// Returned to Pending
    pub requeued: u64,
    /// Out of retries, marked Failed
    pub abandoned: u64,
}

/// Durable job queue. The single owner of job status and timestamps.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly built Pending job unless its unit key is already in flight
    async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome>;

    /// Atomically move up to `limit` due Pending jobs to Running
    ///
    /// Ordered by priority (ascending), then scheduled_at, then insertion order.
    /// No job is ever returned to two callers.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>>;

    /// Running -> Completed (no-op if already Completed)
    async fn complete(&self, id: &JobId, result: serde_json::Value) -> Result<()>;

    /// Running -> Failed, recording the message. Does not schedule a retry.
    async fn fail(&self, id: &JobId, error_message: &str) -> Result<()>;

    /// Failed -> Pending at `retry_at`, consuming one retry
    ///
    /// # Errors
    /// - `DomainError::RetryExhausted` when retry_count >= max_retries
    /// - `AppError::Conflict` when another job for the same unit key is already in flight
    async fn retry(&self, id: &JobId, retry_at: i64) -> Result<Job>;

    /// Pending|Running -> Cancelled
    async fn cancel(&self, id: &JobId) -> Result<Job>;

    /// Delete terminal jobs finished (or created, if never finished) before `cutoff`
    async fn cleanup_older_than(&self, cutoff: i64) -> Result<u64>;

    /// Return Running jobs started before `started_before` to Pending
    async fn requeue_stale(&self, started_before: i64) -> Result<StaleSweep>;

    async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>>;

    /// Newest first
    async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<JobPage>;

    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use crate::port::TimeProvider;
    use std::sync::{Arc, Mutex};

    /// In-memory job store applying the domain state machine
    pub struct InMemoryJobStore {
        // (insertion sequence, job)
        jobs: Mutex<Vec<(u64, Job)>>,
        next_seq: Mutex<u64>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobStore {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                next_seq: Mutex::new(0),
                time_provider,
            }
        }

        pub fn snapshot(&self) -> Vec<Job> {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .map(|(_, job)| job.clone())
                .collect()
        }

        fn with_job<T>(
            &self,
            id: &JobId,
            f: impl FnOnce(&mut Vec<(u64, Job)>, usize) -> Result<T>,
        ) -> Result<T> {
            let mut jobs = self.jobs.lock().unwrap();
            let idx = jobs
                .iter()
                .position(|(_, job)| &job.id == id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;
            f(&mut jobs, idx)
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn enqueue(&self, job: &Job) -> Result<EnqueueOutcome> {
            let mut jobs = self.jobs.lock().unwrap();
            if let Some((_, existing)) = jobs
                .iter()
                .find(|(_, j)| j.unit_key == job.unit_key && j.status.is_active())
            {
                return Ok(EnqueueOutcome::AlreadyQueued(existing.clone()));
            }
            let mut seq = self.next_seq.lock().unwrap();
            *seq += 1;
            jobs.push((*seq, job.clone()));
            Ok(EnqueueOutcome::Enqueued(job.clone()))
        }

        async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();

            let mut due: Vec<usize> = jobs
                .iter()
                .enumerate()
                .filter(|(_, (_, j))| j.status == JobStatus::Pending && j.scheduled_at <= now)
                .map(|(idx, _)| idx)
                .collect();
            due.sort_by_key(|&idx| {
                let (seq, job) = &jobs[idx];
                (job.priority, job.scheduled_at, *seq)
            });

            let mut claimed = Vec::new();
            for idx in due.into_iter().take(limit) {
                let job = &mut jobs[idx].1;
                job.start(now)?;
                claimed.push(job.clone());
            }
            Ok(claimed)
        }

        async fn complete(&self, id: &JobId, result: serde_json::Value) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.with_job(id, |jobs, idx| Ok(jobs[idx].1.complete(now, result)?))
        }

        async fn fail(&self, id: &JobId, error_message: &str) -> Result<()> {
            let now = self.time_provider.now_millis();
            self.with_job(id, |jobs, idx| Ok(jobs[idx].1.fail(now, error_message)?))
        }

        async fn retry(&self, id: &JobId, retry_at: i64) -> Result<Job> {
            self.with_job(id, |jobs, idx| {
                let unit_key = jobs[idx].1.unit_key.clone();
                let in_flight = jobs
                    .iter()
                    .any(|(_, j)| &j.id != id && j.unit_key == unit_key && j.status.is_active());
                if in_flight && jobs[idx].1.can_retry() {
                    return Err(AppError::Conflict(format!(
                        "unit {} already has a job in flight",
                        unit_key
                    )));
                }
                jobs[idx].1.reschedule(retry_at)?;
                Ok(jobs[idx].1.clone())
            })
        }

        async fn cancel(&self, id: &JobId) -> Result<Job> {
            let now = self.time_provider.now_millis();
            self.with_job(id, |jobs, idx| {
                jobs[idx].1.cancel(now)?;
                Ok(jobs[idx].1.clone())
            })
        }

        async fn cleanup_older_than(&self, cutoff: i64) -> Result<u64> {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|(_, j)| {
                !(j.status.is_terminal() && j.completed_at.unwrap_or(j.created_at) < cutoff)
            });
            Ok((before - jobs.len()) as u64)
        }

        async fn requeue_stale(&self, started_before: i64) -> Result<StaleSweep> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            let mut sweep = StaleSweep::default();
            for (_, job) in jobs.iter_mut() {
                let stale = job.status == JobStatus::Running
                    && job.started_at.map_or(true, |s| s < started_before);
                if !stale {
                    continue;
                }
                if job.can_retry() {
                    job.status = JobStatus::Pending;
                    job.retry_count += 1;
                    job.started_at = None;
                    job.scheduled_at = now;
                    sweep.requeued += 1;
                } else {
                    job.fail(now, ABANDONED_MESSAGE)
                        .map_err(AppError::Domain)?;
                    sweep.abandoned += 1;
                }
            }
            Ok(sweep)
        }

        async fn find_by_id(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|(_, j)| &j.id == id)
                .map(|(_, j)| j.clone()))
        }

        async fn list(&self, filter: &JobFilter, page: PageRequest) -> Result<JobPage> {
            let jobs = self.jobs.lock().unwrap();
            let mut matching: Vec<&(u64, Job)> =
                jobs.iter().filter(|(_, j)| filter.matches(j)).collect();
            matching.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at).then(b.0.cmp(&a.0)));

            let total = matching.len() as i64;
            let jobs = matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.per_page as usize)
                .map(|(_, j)| j.clone())
                .collect();

            Ok(JobPage {
                jobs,
                total,
                page: page.page,
                per_page: page.per_page,
            })
        }

        async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, j)| j.status == status)
                .count() as i64)
        }
    }
}
