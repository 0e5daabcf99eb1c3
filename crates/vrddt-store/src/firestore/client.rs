//! Firestore REST API client.
//!
//! Requests are authenticated through a cached OAuth token, retried once when
//! Firestore reports the token as expired, and timed into the store metrics.
//! With `FIRESTORE_EMULATOR_HOST` set the client talks plain HTTP without auth.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use super::token::TokenCache;
use super::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// `host:port` of a Firestore emulator
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            emulator_host: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .unwrap_or_default();

        if project_id.is_empty() {
            return Err(StoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            ..Self::new(project_id)
        })
    }

    fn base_url(&self) -> String {
        let host = match &self.emulator_host {
            Some(host) if host.starts_with("http") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("http://{}", host),
            None => "https://firestore.googleapis.com".to_string(),
        };
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            host, self.project_id, self.database_id
        )
    }
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Option<Arc<TokenCache>>,
}

impl FirestoreClient {
    /// Create a client; credentials come from the default gcp_auth chain
    /// unless an emulator is configured.
    pub async fn new(config: FirestoreConfig) -> StoreResult<Self> {
        let token_cache = if config.emulator_host.is_some() {
            debug!("Firestore emulator configured, skipping auth");
            None
        } else {
            let provider = gcp_auth::provider()
                .await
                .map_err(|e| StoreError::auth_error(format!("No GCP credentials: {}", e)))?;
            Some(Arc::new(TokenCache::new(provider)))
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("vrddt-store/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = config.base_url();
        Ok(Self {
            http,
            config,
            base_url,
            token_cache,
        })
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    async fn authorize(&self, request: RequestBuilder) -> StoreResult<RequestBuilder> {
        match &self.token_cache {
            Some(cache) => Ok(request.bearer_auth(cache.get_token().await?)),
            None => Ok(request),
        }
    }

    /// Send a request, refreshing the token once if Firestore rejects it as expired.
    async fn send<F>(&self, build: F) -> StoreResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = self.authorize(build()).await?.send().await?;
        let Some(cache) = &self.token_cache else {
            return Ok(response);
        };
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !Self::is_access_token_expired(&body) {
            return Err(StoreError::from_http_status(401, body));
        }

        cache.invalidate().await;
        Ok(self.authorize(build()).await?.send().await?)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Create a document with a caller-chosen id. An existing id is `AlreadyExists`.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> StoreResult<Document> {
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self.send(|| self.http.post(&url).json(&body)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => Ok(response.json().await?),
                StatusCode::CONFLICT => Err(StoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    pub async fn get_document(&self, collection: &str, doc_id: &str) -> StoreResult<Option<Document>> {
        let url = format!("{}/{}/{}", self.base_url, collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self.send(|| self.http.get(&url)).await?;
            match response.status() {
                StatusCode::OK => Ok(Some(response.json().await?)),
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Delete a document. Deleting a missing document succeeds.
    pub async fn delete_document(&self, collection: &str, doc_id: &str) -> StoreResult<()> {
        let url = format!("{}/{}/{}", self.base_url, collection, doc_id);

        self.execute_request("delete_document", collection, Some(doc_id), async {
            let response = self.send(|| self.http.delete(&url)).await?;
            match response.status() {
                StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(()),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Run a structured query against root collections.
    pub async fn run_query(&self, query: StructuredQuery) -> StoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };

        self.execute_request("run_query", &collection, None, async {
            let response = self.send(|| self.http.post(&url).json(&request)).await?;
            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    // One entry per document; an empty result is a lone readTime entry
                    let results: Vec<RunQueryResponse> = serde_json::from_str(&body)
                        .map_err(|e| StoreError::InvalidResponse(format!("runQuery: {}", e)))?;
                    Ok(results.into_iter().filter_map(|r| r.document).collect())
                }
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> StoreResult<T>
    where
        F: std::future::Future<Output = StoreResult<T>>,
    {
        let span = info_span!(
            "firestore_request",
            operation = %operation,
            collection = %collection,
            doc_id = doc_id.unwrap_or("")
        );

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(status: StatusCode, url: &str, response: Response) -> StoreError {
        let body = response.text().await.unwrap_or_default();
        StoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8200");
        std::env::remove_var("FIRESTORE_DATABASE_ID");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");

        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(
            config.base_url(),
            "http://localhost:8200/v1/projects/test-project/databases/(default)/documents"
        );

        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
    }

    #[test]
    fn test_production_base_url() {
        let config = FirestoreConfig::new("p");
        assert_eq!(
            config.base_url(),
            "https://firestore.googleapis.com/v1/projects/p/databases/(default)/documents"
        );
    }
}
