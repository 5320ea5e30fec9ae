// Object Store Port (blob storage for documents and reports)

use crate::domain::DocumentKind;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    /// Epoch ms, when the backend knows it
    pub last_modified: Option<i64>,
}

/// Flat key/value blob storage. Keys use `/` as separator.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` at `key`, replacing any previous object
    ///
    /// Failures map to `AppError::StorageWrite`.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    /// # Errors
    /// `AppError::NotFound` when the key does not exist
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Every object whose key starts with `prefix`, sorted by key
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Idempotent
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Content type implied by the key's extension
pub fn content_type_for_key(key: &str) -> &'static str {
    key.rsplit_once('.')
        .and_then(|(_, ext)| DocumentKind::from_extension(ext))
        .map_or("application/octet-stream", |kind| kind.content_type())
}

/// Reject keys that could escape the store root
pub fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(crate::error::AppError::Validation(format!(
            "invalid object key: '{}'",
            key
        )));
    }
    Ok(())
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryObjectStore {
        objects: Mutex<BTreeMap<String, Vec<u8>>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().unwrap().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
            validate_key(key)?;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AppError::StorageWrite(format!("write to {} refused", key)));
            }
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| AppError::NotFound(format!("object {}", key)))
        }

        async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, bytes)| ObjectMeta {
                    key: key.clone(),
                    size: bytes.len() as u64,
                    content_type: content_type_for_key(key).to_string(),
                    last_modified: None,
                })
                .collect())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.objects.lock().unwrap().contains_key(key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("123/2025/08/123/xml/nfse_1_20250801.xml").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/abs/path").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a//b").is_err());
    }

    #[test]
    fn test_content_type_for_key() {
        assert_eq!(content_type_for_key("a/b/nfse_1_20250801.xml"), "application/xml");
        assert_eq!(content_type_for_key("a/b/report_x_20250801.json"), "application/json");
        assert_eq!(content_type_for_key("a/b/blob"), "application/octet-stream");
    }
}
