//! OAuth token cache for Firestore requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Caches one access token; concurrent refreshes collapse onto the write lock.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
        }
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    pub async fn get_token(&self) -> StoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(cached.access_token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(cached.access_token.clone());
        }

        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let remaining = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let access_token = token.as_str().to_string();
                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at: Instant::now() + remaining,
                });
                debug!(ttl_secs = remaining.as_secs(), "Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => match cache.as_ref().filter(|c| c.is_usable()) {
                Some(cached) => {
                    warn!("Token refresh failed, using existing token: {}", e);
                    Ok(cached.access_token.clone())
                }
                None => Err(StoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}
