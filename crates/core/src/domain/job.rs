// Job Domain Model

use crate::domain::document::is_path_segment;
use crate::domain::error::{DomainError, Result};
use crate::domain::period::Period;
use crate::domain::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4, stable across retries)
pub type JobId = String;

/// Priority (lower number = claimed sooner)
pub type Priority = i32;

/// Well-known priorities
pub mod priority {
    use super::Priority;

    /// Operator-triggered work (manual "sync now")
    pub const HIGH: Priority = 1;
    /// Scheduler-discovered work
    pub const NORMAL: Priority = 5;
    /// Reports and other deferrable work
    pub const LOW: Priority = 10;
}

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Job Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }

    /// Completed and Cancelled are final; Failed is final once retries are gone,
    /// which callers check through `Job::can_retry`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Allowed edges of the job state machine
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Failed, Pending)
                | (Pending, Cancelled)
                | (Running, Cancelled)
                | (Running, Pending) // stale-job reaper
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::ValidationError(format!("unknown job status: {}", s)))
    }
}

/// Job Kind (fixed set of background work)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    SyncDocuments,
    ProcessDocument,
    GenerateReport,
    ConsultPeriod,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::SyncDocuments,
        JobKind::ProcessDocument,
        JobKind::GenerateReport,
        JobKind::ConsultPeriod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SyncDocuments => "SYNC_DOCUMENTS",
            JobKind::ProcessDocument => "PROCESS_DOCUMENT",
            JobKind::GenerateReport => "GENERATE_REPORT",
            JobKind::ConsultPeriod => "CONSULT_PERIOD",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::InvalidPayload(format!("unknown job kind: {}", s)))
    }
}

/// Consult every period the sync policy selects (or the explicit list) in one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncDocumentsParams {
    #[serde(default)]
    pub periods: Vec<Period>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Fetch and store one tenant period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsultPeriodParams {
    pub period: Period,
    #[serde(default)]
    pub force_refresh: bool,
}

/// Re-read and verify a stored XML document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDocumentParams {
    pub period: Period,
    pub document_number: String,
}

/// Summarize a period into a report blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateReportParams {
    pub period: Period,
    #[serde(default)]
    pub batch_id: Option<String>,
}

/// Typed job payload, one variant per kind
///
/// Persisted as the bare JSON object of the variant; the kind column selects the variant on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum JobParams {
    SyncDocuments(SyncDocumentsParams),
    ProcessDocument(ProcessDocumentParams),
    GenerateReport(GenerateReportParams),
    ConsultPeriod(ConsultPeriodParams),
}

impl JobParams {
    pub fn kind(&self) -> JobKind {
        match self {
            JobParams::SyncDocuments(_) => JobKind::SyncDocuments,
            JobParams::ProcessDocument(_) => JobKind::ProcessDocument,
            JobParams::GenerateReport(_) => JobKind::GenerateReport,
            JobParams::ConsultPeriod(_) => JobKind::ConsultPeriod,
        }
    }

    /// Validate a raw payload bag against the schema of `kind`
    pub fn parse(kind: JobKind, payload: &serde_json::Value) -> Result<Self> {
        if !payload.is_object() {
            return Err(DomainError::InvalidPayload(format!(
                "{} payload must be a JSON object",
                kind
            )));
        }

        let invalid = |e: serde_json::Error| DomainError::InvalidPayload(format!("{}: {}", kind, e));
        let params = match kind {
            JobKind::SyncDocuments => {
                JobParams::SyncDocuments(serde_json::from_value(payload.clone()).map_err(invalid)?)
            }
            JobKind::ProcessDocument => JobParams::ProcessDocument(
                serde_json::from_value(payload.clone()).map_err(invalid)?,
            ),
            JobKind::GenerateReport => JobParams::GenerateReport(
                serde_json::from_value(payload.clone()).map_err(invalid)?,
            ),
            JobKind::ConsultPeriod => {
                JobParams::ConsultPeriod(serde_json::from_value(payload.clone()).map_err(invalid)?)
            }
        };

        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        match self {
            JobParams::ProcessDocument(p) if !is_path_segment(&p.document_number) => {
                Err(DomainError::InvalidPayload(format!(
                    "document_number must be ASCII alphanumerics or '-': '{}'",
                    p.document_number
                )))
            }
            JobParams::GenerateReport(GenerateReportParams {
                batch_id: Some(batch),
                ..
            }) if !is_path_segment(batch) => Err(DomainError::InvalidPayload(format!(
                "batch_id must be ASCII alphanumerics or '-': '{}'",
                batch
            ))),
            _ => Ok(()),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Plain structs of strings and bools: serialization cannot fail
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// The part of the unit key that distinguishes work of the same kind for one tenant
    pub fn scope(&self) -> String {
        match self {
            JobParams::SyncDocuments(p) if p.periods.is_empty() => "policy".to_string(),
            JobParams::SyncDocuments(p) => p
                .periods
                .iter()
                .map(|period| period.to_string())
                .collect::<Vec<_>>()
                .join(","),
            JobParams::ConsultPeriod(p) => p.period.to_string(),
            JobParams::ProcessDocument(p) => format!("{}/{}", p.period, p.document_number),
            JobParams::GenerateReport(p) => {
                format!("{}/{}", p.period, p.batch_id.as_deref().unwrap_or("-"))
            }
        }
    }
}

/// Key identifying one unit of work; at most one Pending/Running job per key
pub fn unit_key(tenant_id: &str, params: &JobParams) -> String {
    format!("{}:{}:{}", tenant_id, params.kind(), params.scope())
}

/// Enqueue request after validation
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: TenantId,
    pub params: JobParams,
    pub priority: Priority,
    /// Not eligible before this instant (epoch ms); None = immediately
    pub not_before: Option<i64>,
    pub max_retries: i32,
}

impl NewJob {
    pub fn new(tenant_id: impl Into<String>, params: JobParams) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            params,
            priority: priority::NORMAL,
            not_before: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Build from an untyped payload bag (RPC / CLI input)
    pub fn from_raw(
        tenant_id: impl Into<String>,
        kind: JobKind,
        payload: &serde_json::Value,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(DomainError::InvalidPayload(
                "tenant_id must not be empty".to_string(),
            ));
        }
        Ok(Self::new(tenant_id, JobParams::parse(kind, payload)?))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn not_before(mut self, at_millis: i64) -> Self {
        self.not_before = Some(at_millis);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries.max(0);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.params.kind()
    }

    pub fn unit_key(&self) -> String {
        unit_key(&self.tenant_id, &self.params)
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub priority: Priority,
    pub params: JobParams,
    pub unit_key: String,

    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,

    pub retry_count: i32,
    pub max_retries: i32,

    // Epoch ms
    pub scheduled_at: i64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Job {
    /// Create a Pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `new` - Validated enqueue request
    pub fn new(id: impl Into<String>, created_at: i64, new: NewJob) -> Self {
        let unit_key = new.unit_key();
        Self {
            id: id.into(),
            tenant_id: new.tenant_id,
            kind: new.params.kind(),
            status: JobStatus::Pending,
            priority: new.priority,
            params: new.params,
            unit_key,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: new.max_retries,
            scheduled_at: new.not_before.unwrap_or(created_at),
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a test job with deterministic ID and timestamp (test-1, test-2, ...).
    ///
    /// **Note**: only for tests. Production code injects ID and time via providers.
    pub fn new_test(tenant_id: impl Into<String>, params: JobParams) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("test-{}", counter),
            (counter * 1000) as i64,
            NewJob::new(tenant_id, params),
        )
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn period(&self) -> Option<Period> {
        match &self.params {
            JobParams::ConsultPeriod(p) => Some(p.period),
            JobParams::ProcessDocument(p) => Some(p.period),
            JobParams::GenerateReport(p) => Some(p.period),
            JobParams::SyncDocuments(p) if p.periods.len() == 1 => Some(p.periods[0]),
            JobParams::SyncDocuments(_) => None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Pending -> Running
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(now_millis);
        self.completed_at = None;
        Ok(())
    }

    /// Running -> Completed; no-op when already Completed
    pub fn complete(&mut self, now_millis: i64, result: serde_json::Value) -> Result<()> {
        if self.status == JobStatus::Completed {
            return Ok(());
        }
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.error_message = None;
        self.completed_at = Some(self.clamp_after_start(now_millis));
        Ok(())
    }

    /// Running -> Failed
    pub fn fail(&mut self, now_millis: i64, error_message: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(self.clamp_after_start(now_millis));
        Ok(())
    }

    /// Failed -> Pending, consuming one retry
    pub fn reschedule(&mut self, retry_at: i64) -> Result<()> {
        if self.status == JobStatus::Failed && !self.can_retry() {
            return Err(DomainError::RetryExhausted {
                job_id: self.id.clone(),
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.transition(JobStatus::Pending)?;
        self.retry_count += 1;
        self.scheduled_at = retry_at;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    /// Pending|Running -> Cancelled
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Cancelled)?;
        self.completed_at = Some(self.clamp_after_start(now_millis));
        Ok(())
    }

    // started_at <= completed_at even if the clock steps backwards
    fn clamp_after_start(&self, now_millis: i64) -> i64 {
        self.started_at.map_or(now_millis, |s| now_millis.max(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn consult(period: &str) -> JobParams {
        JobParams::ConsultPeriod(ConsultPeriodParams {
            period: period.parse().unwrap(),
            force_refresh: false,
        })
    }

    #[test]
    fn test_parse_valid_payloads() {
        let params = JobParams::parse(
            JobKind::ConsultPeriod,
            &json!({"period": "2025-08", "force_refresh": true}),
        )
        .unwrap();
        assert_eq!(params.kind(), JobKind::ConsultPeriod);
        assert_eq!(params.scope(), "2025-08");

        let params = JobParams::parse(JobKind::SyncDocuments, &json!({})).unwrap();
        assert_eq!(params.scope(), "policy");

        let params = JobParams::parse(
            JobKind::ProcessDocument,
            &json!({"period": "2025-08", "document_number": "123"}),
        )
        .unwrap();
        assert_eq!(params.scope(), "2025-08/123");
    }

    #[test]
    fn test_parse_rejects_missing_keys() {
        let err = JobParams::parse(JobKind::ConsultPeriod, &json!({"force_refresh": true}))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));

        let err = JobParams::parse(JobKind::ProcessDocument, &json!({"period": "2025-08"}))
            .unwrap_err();
        assert!(err.to_string().contains("document_number"));
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert!(JobParams::parse(JobKind::ConsultPeriod, &json!({"period": "2025-13"})).is_err());
        assert!(JobParams::parse(JobKind::ConsultPeriod, &json!([])).is_err());
        assert!(JobParams::parse(
            JobKind::ConsultPeriod,
            &json!({"period": "2025-08", "unexpected": 1})
        )
        .is_err());
        assert!(JobParams::parse(
            JobKind::ProcessDocument,
            &json!({"period": "2025-08", "document_number": "  "})
        )
        .is_err());
        assert!(JobParams::parse(
            JobKind::GenerateReport,
            &json!({"period": "2025-08", "batch_id": "../etc"})
        )
        .is_err());
    }

    #[test]
    fn test_parse_rejects_numbers_and_batches_unfit_for_keys() {
        for payload in [
            json!({"period": "2025-08", "document_number": "12.3"}),
            json!({"period": "2025-08", "document_number": "12/3"}),
        ] {
            let err = JobParams::parse(JobKind::ProcessDocument, &payload).unwrap_err();
            assert!(matches!(err, DomainError::InvalidPayload(_)), "{:?}", err);
        }
        let err = JobParams::parse(
            JobKind::GenerateReport,
            &json!({"period": "2025-08", "batch_id": "batch_1"}),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidPayload(_)));

        assert!(JobParams::parse(
            JobKind::GenerateReport,
            &json!({"period": "2025-08", "batch_id": "batch-1"})
        )
        .is_ok());
    }

    #[test]
    fn test_params_round_trip_through_stored_value() {
        let params = consult("2024-12");
        let stored = params.to_value();
        assert_eq!(stored, json!({"period": "2024-12", "force_refresh": false}));
        assert_eq!(JobParams::parse(JobKind::ConsultPeriod, &stored).unwrap(), params);
    }

    #[test]
    fn test_unit_key_shape() {
        let new = NewJob::new("tenant-a", consult("2025-08"));
        assert_eq!(new.unit_key(), "tenant-a:CONSULT_PERIOD:2025-08");
    }

    #[test]
    fn test_kind_and_status_parse() {
        assert_eq!("consult_period".parse::<JobKind>().unwrap(), JobKind::ConsultPeriod);
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("EXPLODE".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_lifecycle_and_retry_budget() {
        let mut job = Job::new_test("tenant-a", consult("2025-08"));
        job.max_retries = 1;
        assert_eq!(job.status, JobStatus::Pending);

        job.start(10_000).unwrap();
        job.fail(11_000, "upstream 503").unwrap();
        assert!(job.can_retry());

        job.reschedule(70_000).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.scheduled_at, 70_000);
        assert!(job.started_at.is_none());

        job.start(70_000).unwrap();
        job.fail(71_000, "upstream 503").unwrap();
        let err = job.reschedule(200_000).unwrap_err();
        assert!(matches!(err, DomainError::RetryExhausted { .. }));
        assert_eq!(job.retry_count, 1);
    }

    #[test]
    fn test_completed_is_final() {
        let mut job = Job::new_test("tenant-a", consult("2025-08"));
        job.start(1).unwrap();
        job.complete(2, json!({"ok": true})).unwrap();
        // idempotent
        job.complete(3, json!({"ok": false})).unwrap();
        assert_eq!(job.completed_at, Some(2));
        assert_eq!(job.result, Some(json!({"ok": true})));

        assert!(job.fail(4, "late").is_err());
        assert!(job.cancel(4).is_err());
        assert!(job.reschedule(5).is_err());
    }

    #[test]
    fn test_cannot_complete_pending_job() {
        let mut job = Job::new_test("tenant-a", consult("2025-08"));
        assert!(job.complete(1, json!({})).is_err());
        assert!(job.cancel(1).is_ok());
        assert!(job.start(2).is_err());
    }

    #[test]
    fn test_completed_at_never_before_started_at() {
        let mut job = Job::new_test("tenant-a", consult("2025-08"));
        job.start(5_000).unwrap();
        job.complete(4_000, json!({})).unwrap();
        assert!(job.started_at.unwrap() <= job.completed_at.unwrap());
    }
}
