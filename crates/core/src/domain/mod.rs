// Domain Layer - Pure business logic and entities

pub mod document;
pub mod error;
pub mod job;
pub mod period;
pub mod tenant;

// Re-exports
pub use document::{is_path_segment, DocumentDescriptor, DocumentKind, FetchedDocument};
pub use error::DomainError;
pub use job::{
    priority, unit_key, ConsultPeriodParams, GenerateReportParams, Job, JobId, JobKind, JobParams,
    JobStatus, NewJob, Priority, ProcessDocumentParams, SyncDocumentsParams, DEFAULT_MAX_RETRIES,
};
pub use period::Period;
pub use tenant::{Tenant, TenantCredential, TenantId};
