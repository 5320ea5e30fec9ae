//! Shared harness: file-backed SQLite and a filesystem object store under a
//! temp directory, a scripted fiscal API and a manually driven clock.

#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use nfse_core::application::{
    HandlerDeps, HandlerRegistry, IngestService, JobProcessor, MaintenanceService,
    ProcessorConfig, RecoveryService, StorageOrganizer,
};
use nfse_core::domain::{FetchedDocument, Job, JobId, Tenant, TenantCredential};
use nfse_core::port::document_source::mocks::ScriptedDocumentSource;
use nfse_core::port::id_provider::mocks::SequentialIdProvider;
use nfse_core::port::time_provider::mocks::MockTimeProvider;
use nfse_core::port::{JobStore, MaintenanceConfig, TimeProvider};
use nfse_infra_external::FilesystemObjectStore;
use nfse_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteMaintenance, SqliteTenantRegistry,
};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TENANT_ID: &str = "tenant-a";
pub const CNPJ: &str = "12345678000199";
pub const MINUTE_MS: i64 = 60 * 1000;

pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub clock: Arc<MockTimeProvider>,
    pub store: Arc<SqliteJobStore>,
    pub tenants: Arc<SqliteTenantRegistry>,
    pub source: Arc<ScriptedDocumentSource>,
    pub organizer: Arc<StorageOrganizer>,
    pub handlers: Arc<HandlerRegistry>,
    pub ingest: Arc<IngestService>,
    pub maintenance: Arc<MaintenanceService>,
    pub recovery: Arc<RecoveryService>,
}

impl Harness {
    /// Clock at 2025-08-20 12:00 UTC, one active tenant with a valid credential
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir).await;
        let clock = Arc::new(MockTimeProvider::at(
            Utc.with_ymd_and_hms(2025, 8, 20, 12, 0, 0).unwrap(),
        ));

        let store = Arc::new(SqliteJobStore::new(pool.clone(), clock.clone()));
        let tenants = Arc::new(SqliteTenantRegistry::new(pool.clone()));
        let source = Arc::new(ScriptedDocumentSource::new());
        let objects = Arc::new(FilesystemObjectStore::new(dir.path().join("storage")));
        let organizer = Arc::new(StorageOrganizer::new(objects, clock.clone()));

        let handlers = Arc::new(HandlerRegistry::with_default_handlers(HandlerDeps {
            tenants: tenants.clone(),
            source: source.clone(),
            organizer: organizer.clone(),
            time_provider: clock.clone(),
        }));
        let ingest = Arc::new(IngestService::new(
            store.clone(),
            Arc::new(SequentialIdProvider::new("job")),
            clock.clone(),
        ));
        let maintenance = Arc::new(MaintenanceService::new(
            store.clone(),
            Arc::new(SqliteMaintenance::new(pool.clone())),
            clock.clone(),
            MaintenanceConfig::default(),
        ));
        let recovery = Arc::new(RecoveryService::new(
            store.clone(),
            clock.clone(),
            Some(30 * MINUTE_MS),
        ));

        let harness = Self {
            dir,
            pool,
            clock,
            store,
            tenants,
            source,
            organizer,
            handlers,
            ingest,
            maintenance,
            recovery,
        };
        harness.add_tenant(Tenant::new(TENANT_ID, CNPJ), true).await;
        harness
    }

    pub fn storage_root(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.path().join("nfse.db")
    }

    pub async fn add_tenant(&self, tenant: Tenant, with_credential: bool) {
        self.tenants.upsert_tenant(&tenant).await.unwrap();
        if with_credential {
            self.tenants
                .store_credential(&TenantCredential {
                    tenant_id: tenant.id.clone(),
                    access_token: format!("token-{}", tenant.id),
                    expires_at: self.clock.now_millis() + 24 * 60 * MINUTE_MS,
                })
                .await
                .unwrap();
        }
    }

    /// Processor over the default handlers; ticks are driven by the test
    pub fn processor(&self) -> JobProcessor {
        self.processor_with(self.handlers.clone(), 5)
    }

    pub fn processor_with(&self, handlers: Arc<HandlerRegistry>, batch_size: usize) -> JobProcessor {
        JobProcessor::new(
            self.store.clone(),
            handlers,
            self.clock.clone(),
            ProcessorConfig::default()
                .with_tick_interval(Duration::from_millis(20))
                .with_batch_size(batch_size)
                .with_retry_base_delay_ms(MINUTE_MS),
        )
    }

    pub async fn job(&self, id: &JobId) -> Job {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

pub async fn open_pool(dir: &TempDir) -> SqlitePool {
    let url = dir.path().join("nfse.db");
    let pool = create_pool(url.to_str().unwrap()).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

pub fn xml_doc(number: &str, body: &str) -> FetchedDocument {
    FetchedDocument {
        number: number.to_string(),
        emission_date: NaiveDate::from_ymd_opt(2025, 8, 10).unwrap(),
        content_type: "application/xml".to_string(),
        bytes: body.as_bytes().to_vec(),
    }
}
