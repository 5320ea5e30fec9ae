// NFS-e Infrastructure - SQLite Adapter
// Implements: JobStore, TenantRegistry, Maintenance

mod connection;
mod error;
mod job_store;
mod maintenance_impl;
mod migration;
mod tenant_registry;

pub use connection::create_pool;
pub use job_store::SqliteJobStore;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::{latest_version, run_migrations};
pub use tenant_registry::SqliteTenantRegistry;
