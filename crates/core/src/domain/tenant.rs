// Tenant Domain Model (read-only projection of the company registry)

use serde::{Deserialize, Serialize};

/// Tenant ID (opaque, owned by the company-management subsystem)
pub type TenantId = String;

/// A company whose fiscal documents are ingested independently of the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// CNPJ, used as the top-level segment of storage keys
    pub external_id: String,
    pub name: String,
    pub active: bool,
    pub auto_sync: bool,
    pub sync_interval_minutes: i64,
    /// Last successful consultation (epoch ms), None before the first sync
    pub last_sync_at: Option<i64>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external_id: external_id.into(),
            name: String::new(),
            active: true,
            auto_sync: true,
            sync_interval_minutes: 60,
            last_sync_at: None,
        }
    }

    pub fn is_first_sync(&self) -> bool {
        self.last_sync_at.is_none()
    }

    /// Due when active, auto-sync enabled, and never synced or synced longer ago than the interval
    pub fn is_due(&self, now_millis: i64) -> bool {
        if !self.active || !self.auto_sync {
            return false;
        }
        match self.last_sync_at {
            None => true,
            Some(last) => now_millis - last >= self.sync_interval_minutes * 60 * 1000,
        }
    }
}

/// Access credential for the tenant's external fiscal API
#[derive(Clone, Serialize, Deserialize)]
pub struct TenantCredential {
    pub tenant_id: TenantId,
    pub access_token: String,
    pub expires_at: i64,
}

impl TenantCredential {
    pub fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }
}

impl std::fmt::Debug for TenantCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantCredential")
            .field("tenant_id", &self.tenant_id)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
