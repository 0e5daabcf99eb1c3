//! Reddit source client: URL canonicalization, post metadata and stream downloads.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, FROM, LOCATION};
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use vrddt_models::{derive_audio_url, format_canonical_url, metadata_url};

use crate::error::{MediaError, MediaResult};

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Outbound HTTP identity and timeouts.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub user_agent: String,
    /// Contact address sent in the `From` header
    pub from: String,
    pub connect_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "My User Agent 1.0".to_string(),
            from: "testyouremail@domain.com".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_agent: std::env::var("HTTP_USER_AGENT").unwrap_or(defaults.user_agent),
            from: std::env::var("HTTP_FROM").unwrap_or(defaults.from),
            connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }
}

/// What a post's metadata says about its video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub video_url: String,
    /// Empty when the video URL carries no DASH marker
    pub audio_url: String,
}

impl VideoMetadata {
    pub fn has_audio(&self) -> bool {
        !self.audio_url.is_empty()
    }

    /// Extract from a post listing (`<post>.json`).
    pub fn from_listing(canonical: &str, listing: &serde_json::Value) -> MediaResult<Self> {
        let post = listing
            .pointer("/0/data/children/0/data")
            .ok_or_else(|| MediaError::InvalidMetadata(format!("{}: no post in listing", canonical)))?;

        let title = post
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| MediaError::MissingTitle(canonical.to_string()))?;

        let video_url = ["/secure_media/reddit_video/fallback_url", "/media/reddit_video/fallback_url"]
            .iter()
            .find_map(|p| post.pointer(p).and_then(|v| v.as_str()))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MediaError::MissingVideoUrl(canonical.to_string()))?;

        let audio_url = match derive_audio_url(video_url) {
            Some(audio) => audio,
            None => {
                let condition = MediaError::NoAudioMarker(video_url.to_string());
                warn!(url = %canonical, "{}", condition);
                String::new()
            }
        };

        Ok(Self {
            title: title.to_string(),
            video_url: video_url.to_string(),
            audio_url,
        })
    }
}

/// Maps a user-supplied URL to its canonical form.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Follow redirects to the final URL and format it as `scheme://host/path`.
    async fn canonicalize(&self, url: &str) -> MediaResult<String>;
}

/// Everything the worker reads from the source site.
#[async_trait]
pub trait SourceFetcher: UrlResolver {
    async fn fetch_metadata(&self, canonical: &str) -> MediaResult<VideoMetadata>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64>;
}

/// HTTP client for Reddit posts and `v.redd.it` streams.
#[derive(Debug, Clone)]
pub struct RedditClient {
    http: Client,
}

impl RedditClient {
    pub fn new(config: &HttpClientConfig) -> MediaResult<Self> {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&config.from) {
            Ok(value) => {
                headers.insert(FROM, value);
            }
            Err(_) => warn!(from = %config.from, "Ignoring invalid From header value"),
        }

        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { http })
    }

    pub fn from_env() -> MediaResult<Self> {
        Self::new(&HttpClientConfig::from_env())
    }
}

fn parse_http_url(url: &str) -> MediaResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| MediaError::invalid_url(url, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(MediaError::invalid_url(url, "unsupported scheme"));
    }
    Ok(parsed)
}

#[async_trait]
impl UrlResolver for RedditClient {
    async fn canonicalize(&self, url: &str) -> MediaResult<String> {
        let mut current = parse_http_url(url)?;

        for hop in 0..=MAX_REDIRECTS {
            let response = self.http.head(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| MediaError::invalid_url(current.as_str(), "redirect without Location"))?;
                current = current
                    .join(location)
                    .map_err(|e| MediaError::invalid_url(location, e))?;
                debug!(hop, to = %current, "Following redirect");
                continue;
            }

            if status.is_success() {
                return Ok(format_canonical_url(&current));
            }

            return Err(MediaError::HttpStatus {
                url: current.to_string(),
                status: status.as_u16(),
            });
        }

        Err(MediaError::TooManyRedirects(MAX_REDIRECTS, url.to_string()))
    }
}

#[async_trait]
impl SourceFetcher for RedditClient {
    async fn fetch_metadata(&self, canonical: &str) -> MediaResult<VideoMetadata> {
        let url = metadata_url(canonical);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let listing: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| MediaError::InvalidMetadata(format!("{}: {}", canonical, e)))?;
        VideoMetadata::from_listing(canonical, &listing)
    }

    async fn download(&self, url: &str, dest: &Path) -> MediaResult<u64> {
        let mut response = self.http.get(parse_http_url(url)?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!("{} returned {}", url, status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(url = %url, bytes = written, dest = %dest.display(), "Downloaded stream");
        Ok(written)
    }
}
