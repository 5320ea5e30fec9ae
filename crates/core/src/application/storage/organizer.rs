// Storage Organizer: places, locates and deduplicates documents in the object store

use super::path;
use crate::domain::{DocumentDescriptor, DocumentKind, Period};
use crate::error::{AppError, Result};
use crate::port::{ObjectMeta, ObjectStore, TimeProvider};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// What `store` did with the incoming bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreOutcome {
    /// No previous version existed
    Created { key: String },
    /// Identical content already stored; nothing written
    Duplicate { key: String },
    /// Content changed; new version written, previous one retained
    Versioned { key: String, superseded_key: String },
}

impl StoreOutcome {
    pub fn key(&self) -> &str {
        match self {
            StoreOutcome::Created { key }
            | StoreOutcome::Duplicate { key }
            | StoreOutcome::Versioned { key, .. } => key,
        }
    }
}

/// Audit record written next to a superseded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersededMarker {
    pub superseded_key: String,
    pub superseded_by: String,
    pub sha256_old: String,
    pub sha256_new: String,
    pub recorded_at: i64,
}

/// Current version of a document number
#[derive(Debug, Clone, PartialEq, Eq)]
struct CurrentVersion {
    key: String,
    version: u32,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub struct StorageOrganizer {
    store: Arc<dyn ObjectStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl StorageOrganizer {
    pub fn new(store: Arc<dyn ObjectStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Dedup-then-write
    ///
    /// Compares the SHA-256 of the incoming bytes with the current version of the
    /// same document number. Callers must not store the same (tenant, period, number)
    /// concurrently; the job queue guarantees this per unit of work.
    pub async fn store(
        &self,
        tenant: &str,
        period: Period,
        descriptor: &DocumentDescriptor,
        bytes: &[u8],
    ) -> Result<StoreOutcome> {
        let kind = descriptor.kind;
        let new_hash = sha256_hex(bytes);

        let current = match self.current_version(tenant, period, &descriptor.number, kind).await? {
            None => {
                let key = path::build_path(
                    tenant,
                    period,
                    &descriptor.number,
                    descriptor.emission_date,
                    kind,
                )?;
                self.store.put(&key, bytes, kind.content_type()).await?;
                info!(key = %key, "Document stored");
                return Ok(StoreOutcome::Created { key });
            }
            Some(current) => current,
        };

        let old_bytes = self.store.get(&current.key).await?;
        let old_hash = sha256_hex(&old_bytes);
        if old_hash == new_hash {
            debug!(key = %current.key, "Identical document already stored");
            return Ok(StoreOutcome::Duplicate { key: current.key });
        }

        let key = path::versioned_path(
            tenant,
            period,
            &descriptor.number,
            descriptor.emission_date,
            kind,
            current.version + 1,
        )?;
        // Marker first: a document write that never lands leaves the old version
        // current, so a retry takes this path again and rewrites the same marker.
        let old_file = current.key.rsplit('/').next().unwrap_or(&current.key);
        let marker = SupersededMarker {
            superseded_key: current.key.clone(),
            superseded_by: key.clone(),
            sha256_old: old_hash,
            sha256_new: new_hash,
            recorded_at: self.time_provider.now_millis(),
        };
        let marker_key = path::superseded_marker_path(tenant, period, kind, old_file);
        self.store
            .put(
                &marker_key,
                &serde_json::to_vec_pretty(&marker)?,
                DocumentKind::Report.content_type(),
            )
            .await?;
        self.store.put(&key, bytes, kind.content_type()).await?;

        info!(
            key = %key,
            superseded_key = %current.key,
            version = current.version + 1,
            "Document content changed, new version stored"
        );

        Ok(StoreOutcome::Versioned {
            key,
            superseded_key: current.key,
        })
    }

    /// Bytes of the current version
    ///
    /// # Errors
    /// `AppError::NotFound` when no version of the number is stored
    pub async fn fetch(
        &self,
        tenant: &str,
        period: Period,
        number: &str,
        kind: DocumentKind,
    ) -> Result<Vec<u8>> {
        Ok(self.fetch_current(tenant, period, number, kind).await?.1)
    }

    /// Key and bytes of the current version
    pub async fn fetch_current(
        &self,
        tenant: &str,
        period: Period,
        number: &str,
        kind: DocumentKind,
    ) -> Result<(String, Vec<u8>)> {
        let current = self
            .current_version(tenant, period, number, kind)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "document {} ({}) for {} in {}",
                    number, kind, tenant, period
                ))
            })?;
        let bytes = self.store.get(&current.key).await?;
        Ok((current.key, bytes))
    }

    /// Every object stored for the tenant period
    pub async fn list(&self, tenant: &str, period: Period) -> Result<Vec<ObjectMeta>> {
        path::validate_segment("tenant", tenant)?;
        self.store
            .list(&format!("{}/", path::period_prefix(tenant, period)))
            .await
    }

    /// Documents (XML and ZIP, all versions) stored for the tenant period; audit markers excluded
    pub async fn list_documents(&self, tenant: &str, period: Period) -> Result<Vec<ObjectMeta>> {
        let mut documents = Vec::new();
        for kind in [DocumentKind::Xml, DocumentKind::Zip] {
            let prefix = path::kind_prefix(tenant, period, kind);
            documents.extend(
                self.store
                    .list(&prefix)
                    .await?
                    .into_iter()
                    .filter(|meta| !meta.key[prefix.len()..].contains('/')),
            );
        }
        Ok(documents)
    }

    /// Write a report blob; reports are regenerated in place, not versioned
    pub async fn store_report(
        &self,
        tenant: &str,
        period: Period,
        batch_id: &str,
        date: NaiveDate,
        bytes: &[u8],
    ) -> Result<String> {
        let key = path::build_path(tenant, period, batch_id, date, DocumentKind::Report)?;
        self.store
            .put(&key, bytes, DocumentKind::Report.content_type())
            .await?;
        info!(key = %key, "Report stored");
        Ok(key)
    }

    /// Latest report written for `batch_id`
    pub async fn fetch_report(&self, tenant: &str, period: Period, batch_id: &str) -> Result<Vec<u8>> {
        path::validate_segment("batch id", batch_id)?;
        let prefix = path::kind_prefix(tenant, period, DocumentKind::Report);
        let token = path::number_token(DocumentKind::Report, batch_id);

        let latest = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .filter(|meta| meta.key[prefix.len()..].starts_with(&token))
            .max_by(|a, b| a.key.cmp(&b.key))
            .ok_or_else(|| {
                AppError::NotFound(format!("report {} for {} in {}", batch_id, tenant, period))
            })?;
        self.store.get(&latest.key).await
    }

    async fn current_version(
        &self,
        tenant: &str,
        period: Period,
        number: &str,
        kind: DocumentKind,
    ) -> Result<Option<CurrentVersion>> {
        path::validate_segment("tenant", tenant)?;
        path::validate_segment("document number", number)?;

        let prefix = path::kind_prefix(tenant, period, kind);
        let current = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|meta| {
                let file = &meta.key[prefix.len()..];
                // Skip audit markers under superseded/
                if file.contains('/') {
                    return None;
                }
                path::parse_version(kind, number, file).map(|version| CurrentVersion {
                    key: meta.key.clone(),
                    version,
                })
            })
            .max_by(|a, b| a.version.cmp(&b.version).then_with(|| a.key.cmp(&b.key)));

        Ok(current)
    }
}
