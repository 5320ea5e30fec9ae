// Ingest Service - enqueue use cases

use crate::domain::{
    priority, ConsultPeriodParams, Job, JobKind, JobParams, NewJob, Period, Priority,
    SyncDocumentsParams,
};
use crate::error::Result;
use crate::port::{EnqueueOutcome, IdProvider, JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Untyped enqueue request (RPC / CLI input)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub tenant_id: String,
    pub kind: JobKind,
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Not eligible before this instant (epoch ms)
    #[serde(default)]
    pub not_before: Option<i64>,
    #[serde(default)]
    pub max_retries: Option<i32>,
}

fn empty_payload() -> serde_json::Value {
    serde_json::json!({})
}

/// Builds jobs with injected ids and timestamps and hands them to the store
pub struct IngestService {
    job_store: Arc<dyn JobStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl IngestService {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_store,
            id_provider,
            time_provider,
        }
    }

    /// Enqueue a validated job; a job already in flight for the same unit is returned instead
    pub async fn enqueue(&self, new: NewJob) -> Result<EnqueueOutcome> {
        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            new,
        );
        let outcome = self.job_store.enqueue(&job).await?;

        match &outcome {
            EnqueueOutcome::Enqueued(job) => info!(
                job_id = %job.id,
                kind = %job.kind,
                tenant_id = %job.tenant_id,
                unit_key = %job.unit_key,
                priority = job.priority,
                "Job enqueued"
            ),
            EnqueueOutcome::AlreadyQueued(job) => debug!(
                job_id = %job.id,
                unit_key = %job.unit_key,
                status = %job.status,
                "Unit already in flight, enqueue skipped"
            ),
        }
        Ok(outcome)
    }

    /// Validate an untyped request against its kind's schema, then enqueue
    ///
    /// # Errors
    /// `DomainError::InvalidPayload` when required keys are missing or malformed
    pub async fn enqueue_request(&self, req: EnqueueRequest) -> Result<EnqueueOutcome> {
        let mut new = NewJob::from_raw(req.tenant_id, req.kind, &req.payload)?;
        if let Some(priority) = req.priority {
            new = new.with_priority(priority);
        }
        if let Some(at) = req.not_before {
            new = new.not_before(at);
        }
        if let Some(max_retries) = req.max_retries {
            new = new.with_max_retries(max_retries);
        }
        self.enqueue(new).await
    }

    /// One CONSULT_PERIOD job per period at scheduler priority
    pub async fn enqueue_consults(
        &self,
        tenant_id: &str,
        periods: &[Period],
    ) -> Result<Vec<EnqueueOutcome>> {
        let mut outcomes = Vec::with_capacity(periods.len());
        for period in periods {
            let params = JobParams::ConsultPeriod(ConsultPeriodParams {
                period: *period,
                force_refresh: false,
            });
            outcomes.push(self.enqueue(NewJob::new(tenant_id, params)).await?);
        }
        Ok(outcomes)
    }

    /// Operator-triggered sync, claimed ahead of scheduled work
    pub async fn sync_now(
        &self,
        tenant_id: &str,
        periods: Vec<Period>,
        force_refresh: bool,
    ) -> Result<EnqueueOutcome> {
        let params = JobParams::SyncDocuments(SyncDocumentsParams {
            periods,
            force_refresh,
        });
        self.enqueue(NewJob::new(tenant_id, params).with_priority(priority::HIGH))
            .await
    }
}
