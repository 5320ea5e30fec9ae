//! Daemon configuration from `NFSE_*` environment variables
//!
//! A `.env` file in the working directory is loaded first when present.

use nfse_core::error::{AppError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.nfse/ingest.db";
const DEFAULT_STORAGE_DIR: &str = "~/.nfse/storage";
const DEFAULT_FISCAL_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub storage_dir: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub fiscal_api_url: String,
    pub fiscal_api_timeout: Duration,
    pub processor_tick: Duration,
    pub processor_batch_size: usize,
    pub retry_base: Duration,
    pub handler_timeout: Duration,
    pub discovery_interval: Duration,
    pub job_retention_days: i64,
    pub stale_after: Duration,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or empty variables take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_format = match var("NFSE_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "NFSE_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        let config = Self {
            db_path: expand(&var("NFSE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            storage_dir: expand(
                &var("NFSE_STORAGE_DIR").unwrap_or_else(|| DEFAULT_STORAGE_DIR.into()),
            )
            .into(),
            rpc_host: var("NFSE_RPC_HOST")
                .unwrap_or_else(|| nfse_api_rpc::server::DEFAULT_RPC_HOST.into()),
            rpc_port: parse(&var, "NFSE_RPC_PORT", nfse_api_rpc::server::DEFAULT_RPC_PORT)?,
            fiscal_api_url: var("NFSE_FISCAL_API_URL")
                .unwrap_or_else(|| DEFAULT_FISCAL_API_URL.into()),
            fiscal_api_timeout: secs(&var, "NFSE_FISCAL_API_TIMEOUT_SECS", 30)?,
            processor_tick: secs(&var, "NFSE_PROCESSOR_TICK_SECS", 30)?,
            processor_batch_size: parse(&var, "NFSE_PROCESSOR_BATCH_SIZE", 5)?,
            retry_base: secs(&var, "NFSE_RETRY_BASE_SECS", 60)?,
            handler_timeout: secs(&var, "NFSE_HANDLER_TIMEOUT_SECS", 10 * 60)?,
            discovery_interval: secs(&var, "NFSE_DISCOVERY_INTERVAL_SECS", 60 * 60)?,
            job_retention_days: parse(&var, "NFSE_JOB_RETENTION_DAYS", 30)?,
            stale_after: secs(&var, "NFSE_STALE_AFTER_SECS", 30 * 60)?,
            log_format,
            log_dir: var("NFSE_LOG_DIR").map(|d| PathBuf::from(expand(&d))),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.processor_batch_size == 0 {
            return Err(AppError::Config(
                "NFSE_PROCESSOR_BATCH_SIZE must be at least 1".into(),
            ));
        }
        if self.processor_tick.is_zero() || self.discovery_interval.is_zero() {
            return Err(AppError::Config("intervals must be positive".into()));
        }
        if self.job_retention_days < 1 {
            return Err(AppError::Config(
                "NFSE_JOB_RETENTION_DAYS must be at least 1".into(),
            ));
        }
        // A live job must never look abandoned to the reaper
        if self.stale_after <= self.handler_timeout {
            return Err(AppError::Config(format!(
                "NFSE_STALE_AFTER_SECS ({}) must exceed NFSE_HANDLER_TIMEOUT_SECS ({})",
                self.stale_after.as_secs(),
                self.handler_timeout.as_secs()
            )));
        }
        Ok(())
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

fn parse<T, V>(var: &V, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{}='{}': {}", name, raw, e))),
    }
}

fn secs<V>(var: &V, name: &str, default: u64) -> Result<Duration>
where
    V: Fn(&str) -> Option<String>,
{
    parse(var, name, default).map(Duration::from_secs)
}
