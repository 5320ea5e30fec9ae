// Port Layer - Interfaces for external dependencies

pub mod document_source;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod maintenance;
pub mod object_store;
pub mod tenant_registry;
pub mod time_provider;

// Re-exports
pub use document_source::{DocumentSource, FetchError};
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::{
    EnqueueOutcome, JobFilter, JobPage, JobStore, PageRequest, StaleSweep, ABANDONED_MESSAGE,
    DEFAULT_PER_PAGE, MAX_PER_PAGE,
};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use object_store::{content_type_for_key, ObjectMeta, ObjectStore};
pub use tenant_registry::TenantRegistry;
pub use time_provider::{SystemTimeProvider, TimeProvider};
