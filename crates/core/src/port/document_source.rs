// Document Source Port (external fiscal API)

use crate::domain::{FetchedDocument, Period, Tenant, TenantCredential};
use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the external fiscal API
///
/// Every variant is treated as transient by the processor; a permanent
/// rejection surfaces once the job's retries are used up.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure, timeout or 5xx
    #[error("fiscal API unavailable: {0}")]
    Unavailable(String),

    /// 4xx other than 404 (401/403 usually mean a revoked credential)
    #[error("fiscal API rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not match the expected document list
    #[error("malformed fiscal API response: {0}")]
    Malformed(String),
}

/// Lists the documents of one tenant period
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_documents(
        &self,
        credential: &TenantCredential,
        tenant: &Tenant,
        period: Period,
    ) -> Result<Vec<FetchedDocument>, FetchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Canned responses keyed by (tenant id, period)
    #[derive(Default)]
    pub struct ScriptedDocumentSource {
        documents: Mutex<HashMap<(String, Period), Vec<FetchedDocument>>>,
        failures_remaining: AtomicUsize,
        delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl ScriptedDocumentSource {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_documents(&self, tenant_id: &str, period: Period, docs: Vec<FetchedDocument>) {
            self.documents
                .lock()
                .unwrap()
                .entry((tenant_id.to_string(), period))
                .or_default()
                .extend(docs);
        }

        /// The next `count` calls fail with `FetchError::Unavailable`
        pub fn fail_next(&self, count: usize) {
            self.failures_remaining.store(count, Ordering::SeqCst);
        }

        /// Every call sleeps this long before answering
        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentSource for ScriptedDocumentSource {
        async fn fetch_documents(
            &self,
            _credential: &TenantCredential,
            tenant: &Tenant,
            period: Period,
        ) -> Result<Vec<FetchedDocument>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failing = self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(FetchError::Unavailable("scripted 503".to_string()));
            }

            Ok(self
                .documents
                .lock()
                .unwrap()
                .get(&(tenant.id.clone(), period))
                .cloned()
                .unwrap_or_default())
        }
    }
}
