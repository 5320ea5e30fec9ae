//! RPC Request/Response Types
//!
//! JSON-RPC method parameters and results. Requests are shared with the CLI,
//! so every type derives both directions.

use nfse_core::domain::{Job, JobKind, JobStatus, Period};
use nfse_core::port::{EnqueueOutcome, DEFAULT_PER_PAGE};
use serde::{Deserialize, Serialize};

/// jobs.enqueue.v1 params
pub use nfse_core::application::EnqueueRequest;

/// jobs.enqueue.v1 / tenants.sync.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub unit_key: String,
    /// false when a job for the same unit was already in flight
    pub created: bool,
}

impl From<EnqueueOutcome> for EnqueueResponse {
    fn from(outcome: EnqueueOutcome) -> Self {
        let created = outcome.is_new();
        let job = outcome.into_job();
        Self {
            job_id: job.id,
            status: job.status,
            unit_key: job.unit_key,
            created,
        }
    }
}

/// jobs.get.v1 / jobs.cancel.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIdRequest {
    pub job_id: String,
}

/// jobs.get.v1 result
pub type JobResponse = Job;

/// jobs.list.v1 params
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub kind: Option<JobKind>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// jobs.cancel.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// tenants.sync.v1 params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTenantRequest {
    pub tenant_id: String,
    /// Empty: periods chosen by the sync policy
    #[serde(default)]
    pub periods: Vec<Period>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// admin.stats.v1 params
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

/// admin.stats.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub running_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub cancelled_jobs: i64,
    pub db_size_bytes: i64,
    pub fragmentation_percent: f64,
    pub uptime_seconds: i64,
}

/// admin.maintenance.v1 params
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaintenanceRequest {
    #[serde(default)]
    pub force_vacuum: bool,
}

/// admin.maintenance.v1 result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceResponse {
    pub vacuumed: bool,
    pub jobs_deleted: u64,
    pub reclaimed_mb: f64,
    pub db_size_bytes: i64,
}
