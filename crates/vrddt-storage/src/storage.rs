//! Object storage contract and backend selection.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::client::{S3Config, S3Storage};
use crate::error::{StorageError, StorageResult};
use crate::local::LocalStorage;

/// Entry returned by [`ObjectStorage::list`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Metadata returned by [`ObjectStorage::attributes`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAttributes {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Public retrieval URL
    pub location: String,
}

/// Durable blob storage addressed by opaque keys.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Verify the backend is reachable and ready.
    async fn init(&self) -> StorageResult<()>;

    /// Upload a local file and make it publicly readable.
    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()>;

    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Public retrieval URL of an existing object.
    async fn location(&self, key: &str) -> StorageResult<String>;

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>>;

    async fn attributes(&self, key: &str) -> StorageResult<ObjectAttributes>;

    /// Release held resources.
    async fn cleanup(&self) -> StorageResult<()>;
}

/// Reject keys that are empty, absolute or escape their root.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.trim().is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    let path = Path::new(key);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Content type inferred from the key's extension.
pub(crate) fn content_type_for(key: &str) -> &'static str {
    match Path::new(key).extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Which storage implementation to run against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s3" | "r2" | "gcs" => Some(Self::S3),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3: S3Config,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    /// Base URL the local backend reports for stored objects
    pub local_public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            s3: S3Config::default(),
            local_root: PathBuf::from("./vrddt-media"),
            local_public_base_url: None,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|s| StorageBackend::parse(&s))
                .unwrap_or_default(),
            s3: S3Config::from_env(),
            local_root: std::env::var("STORAGE_LOCAL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./vrddt-media")),
            local_public_base_url: std::env::var("STORAGE_LOCAL_PUBLIC_URL").ok(),
        }
    }
}

/// Build the configured storage backend.
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStorage>> {
    match config.backend {
        StorageBackend::S3 => {
            info!(bucket = %config.s3.bucket, "Using S3 object storage");
            Ok(Arc::new(S3Storage::new(config.s3.clone()).await?))
        }
        StorageBackend::Local => {
            info!(root = %config.local_root.display(), "Using local object storage");
            let mut storage = LocalStorage::new(&config.local_root);
            if let Some(base) = &config.local_public_base_url {
                storage = storage.with_public_base_url(base.clone());
            }
            Ok(Arc::new(storage))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc.mp4").is_ok());
        assert!(validate_key("videos/abc.mp4").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/abs.mp4").is_err());
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("x.mp4"), "video/mp4");
        assert_eq!(content_type_for("x"), "application/octet-stream");
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!(StorageBackend::parse("S3"), Some(StorageBackend::S3));
        assert_eq!(StorageBackend::parse("local"), Some(StorageBackend::Local));
        assert_eq!(StorageBackend::parse("ftp"), None);
    }
}
