// Tenant Registry Port

use crate::domain::{Tenant, TenantCredential};
use crate::error::Result;
use async_trait::async_trait;

/// Read access to tenants and their credentials, plus the sync bookkeeping
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Active, auto-sync tenants whose sync interval has elapsed at `now_millis`
    async fn active_tenants_due_for_sync(&self, now_millis: i64) -> Result<Vec<Tenant>>;

    async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>>;

    /// Record a successful sync
    async fn update_last_sync(&self, tenant_id: &str, at_millis: i64) -> Result<()>;

    /// Newest unexpired credential, if any
    async fn credential_for(
        &self,
        tenant_id: &str,
        now_millis: i64,
    ) -> Result<Option<TenantCredential>>;

    /// Remove credentials expired at `now_millis`; returns how many were removed
    async fn purge_expired_credentials(&self, now_millis: i64) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryTenantRegistry {
        tenants: Mutex<HashMap<String, Tenant>>,
        credentials: Mutex<Vec<TenantCredential>>,
        fail_discovery: AtomicBool,
    }

    impl InMemoryTenantRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_tenant(&self, tenant: Tenant) {
            self.tenants
                .lock()
                .unwrap()
                .insert(tenant.id.clone(), tenant);
        }

        pub fn add_credential(&self, credential: TenantCredential) {
            self.credentials.lock().unwrap().push(credential);
        }

        /// Make `active_tenants_due_for_sync` return a database error
        pub fn set_fail_discovery(&self, fail: bool) {
            self.fail_discovery.store(fail, Ordering::SeqCst);
        }

        pub fn tenant(&self, tenant_id: &str) -> Option<Tenant> {
            self.tenants.lock().unwrap().get(tenant_id).cloned()
        }

        pub fn credential_count(&self) -> usize {
            self.credentials.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TenantRegistry for InMemoryTenantRegistry {
        async fn active_tenants_due_for_sync(&self, now_millis: i64) -> Result<Vec<Tenant>> {
            if self.fail_discovery.load(Ordering::SeqCst) {
                return Err(AppError::Database("registry unavailable".to_string()));
            }
            let mut due: Vec<Tenant> = self
                .tenants
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.is_due(now_millis))
                .cloned()
                .collect();
            due.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(due)
        }

        async fn find(&self, tenant_id: &str) -> Result<Option<Tenant>> {
            Ok(self.tenant(tenant_id))
        }

        async fn update_last_sync(&self, tenant_id: &str, at_millis: i64) -> Result<()> {
            match self.tenants.lock().unwrap().get_mut(tenant_id) {
                Some(tenant) => {
                    tenant.last_sync_at = Some(at_millis);
                    Ok(())
                }
                None => Err(AppError::NotFound(format!("Tenant {} not found", tenant_id))),
            }
        }

        async fn credential_for(
            &self,
            tenant_id: &str,
            now_millis: i64,
        ) -> Result<Option<TenantCredential>> {
            Ok(self
                .credentials
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.tenant_id == tenant_id && !c.is_expired(now_millis))
                .max_by_key(|c| c.expires_at)
                .cloned())
        }

        async fn purge_expired_credentials(&self, now_millis: i64) -> Result<u64> {
            let mut credentials = self.credentials.lock().unwrap();
            let before = credentials.len();
            credentials.retain(|c| !c.is_expired(now_millis));
            Ok((before - credentials.len()) as u64)
        }
    }
}
