//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 server for the NFS-e ingestion daemon: job queue operations,
//! operator-triggered tenant syncs and database maintenance.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
