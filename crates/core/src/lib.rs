// NFS-e Ingestion Core - Domain Logic, Ports & Services
// NO infrastructure dependencies: SQLite, HTTP and filesystem adapters live in infra crates

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
