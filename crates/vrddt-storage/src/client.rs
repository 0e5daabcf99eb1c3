//! S3-compatible storage client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::storage::{content_type_for, validate_key, ObjectAttributes, ObjectInfo, ObjectStorage};

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (R2, MinIO, GCS interoperability); AWS when unset
    pub endpoint_url: Option<String>,
    /// Explicit credentials; the default provider chain is used when unset
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: String,
    pub region: String,
    /// Base URL for public links, e.g. a CDN in front of the bucket
    pub public_base_url: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            access_key_id: None,
            secret_access_key: None,
            bucket: "vrddt-media".to_string(),
            region: "us-east-1".to_string(),
            public_base_url: None,
        }
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok(),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "vrddt-media".to_string()),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            public_base_url: std::env::var("S3_PUBLIC_BASE_URL").ok(),
        }
    }

    /// Public URL for `key` under this configuration.
    pub fn public_url(&self, key: &str) -> String {
        if let Some(base) = &self.public_base_url {
            return format!("{}/{}", base.trim_end_matches('/'), key);
        }
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }
}

fn to_chrono(t: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    t.to_millis().ok().and_then(DateTime::from_timestamp_millis)
}

/// S3-compatible object storage.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    config: S3Config,
}

impl S3Storage {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = Credentials::new(key_id, secret, None, None, "vrddt");
                Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .credentials_provider(credentials)
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                Builder::from(&shared)
            }
            _ => {
                return Err(StorageError::config_error(
                    "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
                ))
            }
        };

        let builder = match &config.endpoint_url {
            Some(endpoint) => builder.endpoint_url(endpoint).force_path_style(true),
            None => builder,
        };

        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()).await
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn head(&self, key: &str) -> StorageResult<aws_sdk_s3::operation::head_object::HeadObjectOutput> {
        self.client
            .head_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_not_found() => StorageError::not_found(key),
                _ => StorageError::AwsSdk(e.to_string()),
            })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn init(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("bucket check failed: {}", e)))?;
        info!(bucket = %self.config.bucket, "Object storage reachable");
        Ok(())
    }

    async fn upload(&self, local_path: &Path, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Uploading {} to {}", local_path.display(), key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(key))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let acl = self
            .client
            .put_object_acl()
            .bucket(&self.config.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await;

        if let Err(e) = acl {
            warn!(key, error = %e, "Failed to make object public, deleting it");
            if let Err(delete_err) = self.delete(key).await {
                warn!(key, error = %delete_err, "Failed to delete object after ACL failure");
            }
            return Err(StorageError::AclFailed(e.to_string()));
        }

        info!("Uploaded {} to {}", local_path.display(), key);
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Downloading {} to {}", key, local_path.display());

        let response = self
            .client
            .get_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_key() => StorageError::not_found(key),
                _ => StorageError::download_failed(e.to_string()),
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &bytes).await?;

        info!("Downloaded {} to {}", key, local_path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }

    async fn location(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        self.head(key).await?;
        Ok(self.config.public_url(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<ObjectInfo>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(prefix);

            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(e.to_string()))?;

            for obj in response.contents() {
                objects.push(ObjectInfo {
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono),
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn attributes(&self, key: &str) -> StorageResult<ObjectAttributes> {
        validate_key(key)?;
        let head = self.head(key).await?;

        Ok(ObjectAttributes {
            key: key.to_string(),
            size: head.content_length().unwrap_or(0).max(0) as u64,
            content_type: head.content_type().map(str::to_string),
            last_modified: head.last_modified().and_then(to_chrono),
            location: self.config.public_url(key),
        })
    }

    async fn cleanup(&self) -> StorageResult<()> {
        debug!(bucket = %self.config.bucket, "Object storage cleanup");
        Ok(())
    }
}
