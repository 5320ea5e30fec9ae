// Application Layer - Use Cases and Business Logic

pub mod handlers;
pub mod ingest;
pub mod maintenance;
pub mod processor;
pub mod recovery;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod sync_policy;

// Re-exports
pub use handlers::{HandlerDeps, HandlerRegistry, JobContext, JobHandler};
pub use ingest::{EnqueueRequest, IngestService};
pub use maintenance::{MaintenanceReport, MaintenanceService};
pub use processor::{shutdown_channel, JobProcessor, ProcessorConfig, ShutdownSender, ShutdownToken};
pub use recovery::RecoveryService;
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{DiscoveryReport, Scheduler, SchedulerConfig, SchedulerTasks};
pub use storage::{StorageOrganizer, StoreOutcome};
pub use sync_policy::periods_to_consult;
