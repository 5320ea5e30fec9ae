//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over TCP, bound to localhost by default.

use crate::handler::RpcHandler;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use nfse_core::error::{AppError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9527;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 binds an ephemeral port (tests)
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

/// Register one versioned method whose params deserialize into `P`
fn register<P, R, F, Fut>(
    module: &mut RpcModule<()>,
    name: &'static str,
    handler: &Arc<RpcHandler>,
    call: F,
) -> Result<()>
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Clone + Send + 'static,
    F: Fn(Arc<RpcHandler>, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, ErrorObjectOwned>> + Send + 'static,
{
    let handler = handler.clone();
    module
        .register_async_method(name, move |params, _, _| {
            let handler = handler.clone();
            let call = call.clone();
            async move {
                let req: P = params.parse()?;
                call(handler, req).await
            }
        })
        .map_err(|e| AppError::Internal(format!("failed to register {}: {}", name, e)))?;
    Ok(())
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    fn build_module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());
        let h = &self.handler;

        register(&mut module, "jobs.enqueue.v1", h, |h, req| async move {
            h.enqueue(req).await
        })?;
        register(&mut module, "jobs.get.v1", h, |h, req| async move {
            h.get(req).await
        })?;
        register(&mut module, "jobs.list.v1", h, |h, req| async move {
            h.list(req).await
        })?;
        register(&mut module, "jobs.cancel.v1", h, |h, req| async move {
            h.cancel(req).await
        })?;
        register(&mut module, "tenants.sync.v1", h, |h, req| async move {
            h.sync_tenant(req).await
        })?;

        // Admin APIs
        register(&mut module, "admin.stats.v1", h, |h, req| async move {
            h.stats(req).await
        })?;
        register(&mut module, "admin.maintenance.v1", h, |h, req| async move {
            h.maintenance(req).await
        })?;

        Ok(module)
    }

    /// Start the JSON-RPC server; returns the bound address and the server handle
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder().build(&addr).await.map_err(|e| {
            AppError::Config(format!("failed to bind JSON-RPC server on {}: {}", addr, e))
        })?;
        let local_addr = server.local_addr()?;

        let module = self.build_module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}
