//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{
    CancelResponse, EnqueueRequest, EnqueueResponse, JobIdRequest, JobResponse, ListJobsRequest,
    MaintenanceRequest, MaintenanceResponse, StatsRequest, StatsResponse, SyncTenantRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use nfse_core::application::{IngestService, JobProcessor, MaintenanceService};
use nfse_core::domain::JobStatus;
use nfse_core::error::AppError;
use nfse_core::port::{JobFilter, JobPage, JobStore, PageRequest, MAX_PER_PAGE};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    job_store: Arc<dyn JobStore>,
    ingest: Arc<IngestService>,
    processor: Arc<JobProcessor>,
    maintenance: Arc<MaintenanceService>,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        ingest: Arc<IngestService>,
        processor: Arc<JobProcessor>,
        maintenance: Arc<MaintenanceService>,
    ) -> Self {
        Self {
            job_store,
            ingest,
            processor,
            maintenance,
            start_time: Instant::now(),
        }
    }

    /// jobs.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> RpcResult<EnqueueResponse> {
        let outcome = self
            .ingest
            .enqueue_request(params)
            .await
            .map_err(to_rpc_error)?;
        Ok(outcome.into())
    }

    /// jobs.get.v1
    pub async fn get(&self, params: JobIdRequest) -> RpcResult<JobResponse> {
        self.job_store
            .find_by_id(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Job {} not found", params.job_id)))
            })
    }

    /// jobs.list.v1
    pub async fn list(&self, params: ListJobsRequest) -> RpcResult<JobPage> {
        if params.per_page > MAX_PER_PAGE {
            return Err(to_rpc_error(AppError::Validation(format!(
                "per_page must be at most {}",
                MAX_PER_PAGE
            ))));
        }
        let filter = JobFilter {
            tenant_id: params.tenant_id,
            status: params.status,
            kind: params.kind,
        };
        self.job_store
            .list(&filter, PageRequest::new(params.page, params.per_page))
            .await
            .map_err(to_rpc_error)
    }

    /// jobs.cancel.v1
    ///
    /// Goes through the processor so a running handler observes the cancellation.
    pub async fn cancel(&self, params: JobIdRequest) -> RpcResult<CancelResponse> {
        let job = self
            .processor
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        info!(job_id = %job.id, "Job cancelled via RPC");
        Ok(CancelResponse {
            job_id: job.id,
            status: job.status,
        })
    }

    /// tenants.sync.v1
    pub async fn sync_tenant(&self, params: SyncTenantRequest) -> RpcResult<EnqueueResponse> {
        let outcome = self
            .ingest
            .sync_now(&params.tenant_id, params.periods, params.force_refresh)
            .await
            .map_err(to_rpc_error)?;
        Ok(outcome.into())
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsRequest) -> RpcResult<StatsResponse> {
        let mut counts = [0i64; JobStatus::ALL.len()];
        for (slot, status) in counts.iter_mut().zip(JobStatus::ALL) {
            *slot = self
                .job_store
                .count_by_status(status)
                .await
                .map_err(to_rpc_error)?;
        }
        let [pending, running, completed, failed, cancelled] = counts;

        let stats = self.maintenance.stats().await.map_err(to_rpc_error)?;

        Ok(StatsResponse {
            total_jobs: stats.job_count,
            pending_jobs: pending,
            running_jobs: running,
            completed_jobs: completed,
            failed_jobs: failed,
            cancelled_jobs: cancelled,
            db_size_bytes: stats.db_size_bytes,
            fragmentation_percent: stats.fragmentation_percent,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }

    /// admin.maintenance.v1
    pub async fn maintenance(&self, params: MaintenanceRequest) -> RpcResult<MaintenanceResponse> {
        let report = self
            .maintenance
            .run_full_maintenance(params.force_vacuum)
            .await
            .map_err(to_rpc_error)?;

        Ok(MaintenanceResponse {
            vacuumed: report.vacuumed,
            jobs_deleted: report.jobs_deleted,
            reclaimed_mb: report.reclaimed_mb,
            db_size_bytes: report.stats.db_size_bytes,
        })
    }
}
