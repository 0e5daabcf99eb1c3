//! Directory-backed storage for local runs and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::storage::{content_type_for, validate_key, ObjectAttributes, ObjectInfo, ObjectStorage};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: None,
        }
    }

    /// Report `<base>/<key>` as the location instead of a `file://` URL.
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn public_url(&self, key: &str, path: &Path) -> StorageResult<String> {
        if let Some(base) = &self.public_base_url {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
        }
        let absolute = std::path::absolute(path)?;
        url::Url::from_file_path(&absolute)
            .map(|u| u.to_string())
            .map_err(|_| StorageError::InvalidKey(key.to_string()))
    }

    async fn metadata(&self, key: &str) -> StorageResult<(PathBuf, std::fs::Metadata)> {
        let path = self.object_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok((path, meta)),
            Ok(_) => Err(StorageError::not_found(key)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }
}

fn modified(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.modified().ok().map(DateTime::<Utc>::from)
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn init(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", local_path.display(), e)))?;
        debug!("Stored {} as {}", local_path.display(), key);
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        let (source, _) = self.metadata(key).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, local_path)
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.object_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }

    async fn location(&self, key: &str) -> StorageResult<String> {
        let (path, _) = self.metadata(key).await?;
        self.public_url(key, &path)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::ListFailed(e.to_string())),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative.to_string_lossy().replace('\\', "/");
                if key.starts_with(prefix) {
                    objects.push(ObjectInfo {
                        key,
                        size: meta.len(),
                        last_modified: modified(&meta),
                    });
                }
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn attributes(&self, key: &str) -> StorageResult<ObjectAttributes> {
        let (path, meta) = self.metadata(key).await?;
        Ok(ObjectAttributes {
            key: key.to_string(),
            size: meta.len(),
            content_type: Some(content_type_for(key).to_string()),
            last_modified: modified(&meta),
            location: self.public_url(key, &path)?,
        })
    }

    async fn cleanup(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, LocalStorage, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("bucket"));
        storage.init().await.unwrap();
        let source = dir.path().join("out.mp4");
        tokio::fs::write(&source, b"mp4 bytes").await.unwrap();
        (dir, storage, source)
    }

    #[tokio::test]
    async fn test_upload_location_download() {
        let (dir, storage, source) = fixture().await;
        storage.upload(&source, "abc.mp4").await.unwrap();

        let location = storage.location("abc.mp4").await.unwrap();
        assert!(location.starts_with("file://"));
        assert!(location.ends_with("/bucket/abc.mp4"));

        let copy = dir.path().join("copy/abc.mp4");
        storage.download("abc.mp4", &copy).await.unwrap();
        assert_eq!(tokio::fs::read(&copy).await.unwrap(), b"mp4 bytes");
    }

    #[tokio::test]
    async fn test_public_base_url() {
        let (_dir, storage, source) = fixture().await;
        let storage = storage.with_public_base_url("http://localhost:8080/media/");
        storage.upload(&source, "abc.mp4").await.unwrap();
        assert_eq!(
            storage.location("abc.mp4").await.unwrap(),
            "http://localhost:8080/media/abc.mp4"
        );
    }

    #[tokio::test]
    async fn test_missing_object() {
        let (_dir, storage, _source) = fixture().await;
        assert!(storage.location("nope.mp4").await.unwrap_err().is_not_found());
        assert!(storage.delete("nope.mp4").await.unwrap_err().is_not_found());
        assert!(storage.attributes("nope.mp4").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_and_attributes() {
        let (_dir, storage, source) = fixture().await;
        storage.upload(&source, "a.mp4").await.unwrap();
        storage.upload(&source, "nested/b.mp4").await.unwrap();

        let all = storage.list("").await.unwrap();
        let keys: Vec<_> = all.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.mp4", "nested/b.mp4"]);

        let nested = storage.list("nested/").await.unwrap();
        assert_eq!(nested.len(), 1);

        let attrs = storage.attributes("a.mp4").await.unwrap();
        assert_eq!(attrs.size, 9);
        assert_eq!(attrs.content_type.as_deref(), Some("video/mp4"));
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, storage, source) = fixture().await;
        storage.upload(&source, "a.mp4").await.unwrap();
        storage.delete("a.mp4").await.unwrap();
        assert!(storage.list("").await.unwrap().is_empty());
    }
}
