// Retry logic: linear backoff for failed jobs
use crate::domain::Job;
use crate::error::AppError;
use crate::port::TimeProvider;
use std::sync::Arc;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job at this instant (epoch ms)
    Retry(i64),
    /// Do not retry, job has failed permanently
    Failed,
}

/// Decides whether a failed job gets another attempt and when
///
/// Backoff is linear: `retry_at = now + (retry_count + 1) * base_delay`.
pub struct RetryPolicy {
    time_provider: Arc<dyn TimeProvider>,
    base_delay_ms: i64,
}

impl RetryPolicy {
    /// # Arguments
    /// * `time_provider` - Time provider for current time
    /// * `base_delay_ms` - Base delay in milliseconds (default: 60s)
    pub fn new(time_provider: Arc<dyn TimeProvider>, base_delay_ms: i64) -> Self {
        Self {
            time_provider,
            base_delay_ms,
        }
    }

    /// Delay before the next attempt of a job that has already been retried `retry_count` times
    pub fn backoff_ms(&self, retry_count: i32) -> i64 {
        (retry_count.max(0) as i64 + 1) * self.base_delay_ms
    }

    /// Only retryable errors on jobs with budget left are retried
    pub fn should_retry(&self, job: &Job, error: &AppError) -> RetryDecision {
        if !error.is_retryable() {
            warn!(
                job_id = %job.id,
                error = %error,
                "Non-retryable failure"
            );
            return RetryDecision::Failed;
        }

        if !job.can_retry() {
            warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                "Max retries reached"
            );
            return RetryDecision::Failed;
        }

        let retry_at = self.time_provider.now_millis() + self.backoff_ms(job.retry_count);

        info!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            retry_at = retry_at,
            "Scheduling retry"
        );

        RetryDecision::Retry(retry_at)
    }
}
