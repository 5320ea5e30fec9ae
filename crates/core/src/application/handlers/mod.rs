//! Job handlers, one per job kind.

mod consult_period;
mod generate_report;
mod process_document;
mod sync_documents;

pub use consult_period::{ConsultPeriodHandler, PeriodSummary};
pub use generate_report::GenerateReportHandler;
pub use process_document::ProcessDocumentHandler;
pub use sync_documents::SyncDocumentsHandler;

use crate::application::processor::CancelToken;
use crate::application::storage::StorageOrganizer;
use crate::domain::{Job, JobKind, Tenant};
use crate::error::{AppError, Result};
use crate::port::{DocumentSource, TenantRegistry, TimeProvider};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Context provided to job handlers.
pub struct JobContext {
    /// The claimed job (status Running).
    pub job: Job,
    cancel: CancelToken,
}

impl JobContext {
    pub fn new(job: Job, cancel: CancelToken) -> Self {
        Self { job, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast between steps once the job has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(AppError::Cancelled(self.job.id.clone()))
        } else {
            Ok(())
        }
    }

    /// Run `fut`, abandoning it as soon as the job is cancelled.
    pub async fn run_cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let mut cancel = self.cancel.clone();
        tokio::select! {
            result = fut => result,
            _ = cancel.cancelled() => Err(AppError::Cancelled(self.job.id.clone())),
        }
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job kind this handler processes.
    fn kind(&self) -> JobKind;

    /// Execute the job; the returned value becomes the job's result bag.
    async fn execute(&self, ctx: &JobContext) -> Result<JsonValue>;
}

/// Collaborators shared by the built-in handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub tenants: Arc<dyn TenantRegistry>,
    pub source: Arc<dyn DocumentSource>,
    pub organizer: Arc<StorageOrganizer>,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl HandlerDeps {
    pub(crate) async fn tenant(&self, tenant_id: &str) -> Result<Tenant> {
        self.tenants
            .find(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant {} not found", tenant_id)))
    }
}

/// Handler lookup by job kind
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a handler for every job kind
    pub fn with_default_handlers(deps: HandlerDeps) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ConsultPeriodHandler::new(deps.clone())));
        registry.register(Arc::new(SyncDocumentsHandler::new(deps.clone())));
        registry.register(Arc::new(ProcessDocumentHandler::new(deps.clone())));
        registry.register(Arc::new(GenerateReportHandler::new(deps)));
        registry
    }

    /// Replaces any handler already registered for the same kind
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&kind).cloned()
    }
}
