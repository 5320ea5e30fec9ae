// Filesystem ObjectStore
// Keys map to paths under a root directory; writes go through a temp file and a rename.

use async_trait::async_trait;
use nfse_core::error::{AppError, Result};
use nfse_core::port::object_store::validate_key;
use nfse_core::port::{content_type_for_key, ObjectMeta, ObjectStore};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::{debug, warn};

/// In-progress writes carry this marker and are never listed
const TEMP_MARKER: &str = ".tmp-";

pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, seg| path.join(seg)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        Some(segments?.join("/"))
    }

    async fn meta_for(&self, key: String, path: &Path) -> Result<ObjectMeta> {
        let metadata = fs::metadata(path).await?;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);

        Ok(ObjectMeta {
            content_type: content_type_for_key(&key).to_string(),
            key,
            size: metadata.len(),
            last_modified,
        })
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let write_err = |e: std::io::Error| AppError::StorageWrite(format!("{}: {}", key, e));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Validation(format!("invalid object key: '{}'", key)))?;
        let temp = path.with_file_name(format!("{}{}{}", file_name, TEMP_MARKER, uuid::Uuid::new_v4()));

        if let Err(e) = fs::write(&temp, bytes).await {
            let _ = fs::remove_file(&temp).await;
            return Err(write_err(e));
        }
        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(write_err(e));
        }

        debug!(key = %key, size = bytes.len(), content_type = %content_type, "Object written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("object {}", key)))
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // Walk only the deepest directory the prefix pins down
        let start = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => self.path_for(dir)?,
            _ => self.root.clone(),
        };

        let mut objects = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Some(key) = self.key_for(&path) else {
                    warn!(path = %path.display(), "Skipping non UTF-8 path");
                    continue;
                };
                if key.starts_with(prefix) && !key.contains(TEMP_MARKER) {
                    objects.push(self.meta_for(key, &path).await?);
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (FilesystemObjectStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FilesystemObjectStore::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let (store, _dir) = store();
        let key = "111/2025/08/111/xml/nfse_1_20250801.xml";

        store.put(key, b"<a/>", "application/xml").await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), b"<a/>");

        store.put(key, b"<b/>", "application/xml").await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), b"<b/>");
        assert!(store.exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (store, _dir) = store();
        let err = store.get("a/b.xml").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!store.exists("a/b.xml").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_is_recursive_sorted_and_prefix_filtered() {
        let (store, _dir) = store();
        for key in [
            "111/2025/08/111/xml/nfse_2_20250802.xml",
            "111/2025/08/111/xml/nfse_1_20250801.xml",
            "111/2025/08/111/zip/nfse_3_20250803.zip",
            "111/2025/07/111/xml/nfse_9_20250709.xml",
        ] {
            store.put(key, b"x", "application/xml").await.unwrap();
        }

        let listed = store.list("111/2025/08/").await.unwrap();
        let keys: Vec<&str> = listed.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "111/2025/08/111/xml/nfse_1_20250801.xml",
                "111/2025/08/111/xml/nfse_2_20250802.xml",
                "111/2025/08/111/zip/nfse_3_20250803.zip",
            ]
        );
        assert_eq!(listed[2].content_type, "application/zip");
        assert_eq!(listed[0].size, 1);
        assert!(listed[0].last_modified.is_some());

        let by_token = store.list("111/2025/08/111/xml/nfse_1_").await.unwrap();
        assert_eq!(by_token.len(), 1);
        assert!(store.list("999/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _dir) = store();
        store.put("a/b.json", b"{}", "application/json").await.unwrap();
        store.delete("a/b.json").await.unwrap();
        store.delete("a/b.json").await.unwrap();
        assert!(!store.exists("a/b.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (store, _dir) = store();
        for key in ["../etc/passwd", "/abs", "a//b", "a/./b"] {
            let err = store.put(key, b"x", "text/plain").await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{}", key);
        }
    }

    #[tokio::test]
    async fn test_temp_files_are_not_listed() {
        let (store, dir) = store();
        store.put("a/doc.xml", b"x", "application/xml").await.unwrap();
        std::fs::write(dir.path().join("a").join("doc.xml.tmp-123"), b"partial").unwrap();

        let keys: Vec<String> = store
            .list("a/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["a/doc.xml"]);
    }
}
