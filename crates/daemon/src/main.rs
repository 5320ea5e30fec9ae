//! NFS-e ingestion daemon - composition root
//!
//! Wires SQLite, the filesystem object store and the fiscal API client into
//! the processor, scheduler and JSON-RPC server, then waits for Ctrl+C.

mod config;
mod logging;

use anyhow::{Context, Result};
use config::DaemonConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use nfse_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use nfse_core::application::{
    shutdown_channel, HandlerDeps, HandlerRegistry, IngestService, JobProcessor,
    MaintenanceService, ProcessorConfig, RecoveryService, Scheduler, SchedulerConfig,
    SchedulerTasks, StorageOrganizer,
};
use nfse_core::port::{MaintenanceConfig, SystemTimeProvider, UuidProvider};
use nfse_infra_external::{FilesystemObjectStore, HttpDocumentSource};
use nfse_infra_sqlite::{
    create_pool, run_migrations, SqliteJobStore, SqliteMaintenance, SqliteTenantRegistry,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on waiting for the in-flight batch at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::from_env().context("invalid configuration")?;
    let _log_guard = logging::init_logging(config.log_format, config.log_dir.as_deref());

    info!("NFS-e ingestion daemon v{} starting...", VERSION);

    // 2. Database
    info!(db_path = %config.db_path, "Initializing database...");
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let pool = create_pool(&config.db_path)
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("migration failed")?;

    // 3. Ports
    let time_provider = Arc::new(SystemTimeProvider);
    let job_store = Arc::new(SqliteJobStore::new(pool.clone(), time_provider.clone()));
    let tenants = Arc::new(SqliteTenantRegistry::new(pool.clone()));
    let db_maintenance = Arc::new(SqliteMaintenance::new(pool.clone()));
    let object_store = Arc::new(FilesystemObjectStore::new(&config.storage_dir));
    let source = Arc::new(
        HttpDocumentSource::new(&config.fiscal_api_url, config.fiscal_api_timeout)
            .context("fiscal API client")?,
    );
    info!(
        storage_dir = %config.storage_dir.display(),
        fiscal_api = %config.fiscal_api_url,
        "Adapters ready"
    );

    // 4. Application services
    let organizer = Arc::new(StorageOrganizer::new(object_store, time_provider.clone()));
    let handlers = Arc::new(HandlerRegistry::with_default_handlers(HandlerDeps {
        tenants: tenants.clone(),
        source,
        organizer,
        time_provider: time_provider.clone(),
    }));

    let recovery = Arc::new(RecoveryService::new(
        job_store.clone(),
        time_provider.clone(),
        Some(config.stale_after.as_millis() as i64),
    ));

    let processor_config = ProcessorConfig::default()
        .with_tick_interval(config.processor_tick)
        .with_batch_size(config.processor_batch_size)
        .with_handler_timeout(config.handler_timeout)
        .with_retry_base_delay_ms(config.retry_base.as_millis() as i64);
    let processor = Arc::new(
        JobProcessor::new(
            job_store.clone(),
            handlers,
            time_provider.clone(),
            processor_config,
        )
        .with_recovery(recovery.clone()),
    );

    let ingest = Arc::new(IngestService::new(
        job_store.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
    ));
    let maintenance = Arc::new(MaintenanceService::new(
        job_store.clone(),
        db_maintenance,
        time_provider.clone(),
        MaintenanceConfig {
            job_retention_days: config.job_retention_days,
            ..MaintenanceConfig::default()
        },
    ));

    // 5. JSON-RPC server
    let rpc_server = RpcServer::new(
        RpcServerConfig {
            host: config.rpc_host.clone(),
            port: config.rpc_port,
        },
        RpcHandler::new(
            job_store.clone(),
            ingest.clone(),
            processor.clone(),
            maintenance.clone(),
        ),
    );
    let (rpc_addr, rpc_handle) = rpc_server.start().await.context("RPC server start failed")?;

    // 6. Processor loop (runs the startup stale-job sweep first)
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let processor_handle = tokio::spawn({
        let processor = processor.clone();
        async move {
            if let Err(e) = processor.run(shutdown_rx).await {
                error!(error = %e, "Processor failed");
            }
        }
    });

    // 7. Scheduler loops
    let mut scheduler = Scheduler::new(
        SchedulerTasks::new(tenants, ingest, maintenance, recovery, time_provider),
        SchedulerConfig::default().with_discovery_interval(config.discovery_interval),
    );
    scheduler.start();

    info!(rpc_addr = %rpc_addr, "System ready, press Ctrl+C to shut down");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Shutdown signal received");

    // 9. Graceful shutdown: stop intake first, then let the in-flight batch finish
    if let Err(e) = rpc_handle.stop() {
        error!(error = %e, "RPC server stop failed");
    }
    scheduler.stop().await;
    shutdown_tx.shutdown();
    match tokio::time::timeout(SHUTDOWN_GRACE, processor_handle).await {
        Ok(_) => info!("Processor drained"),
        Err(_) => error!(
            in_flight = processor.in_flight(),
            "Processor did not drain in time; running jobs will be recovered on next start"
        ),
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
