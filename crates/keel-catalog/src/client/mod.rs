//! HTTP client for remote feature repositories, with retry logic and an
//! index cache

use std::sync::Arc;
use std::time::Duration;

use keel_core::error::KeelError;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::{debug, warn};
use serde_json::Value;
use url::Url;

use crate::api::index_path;
use crate::cache::IndexCache;
use crate::CatalogResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Client for one remote feature repository
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    retry_config: RetryConfig,
    /// Repository root, always ending with `/`
    base_url: Url,
    cache: Arc<IndexCache>,
}

impl RepositoryClient {
    /// Create a client for the repository rooted at `base_url`
    pub fn new(base_url: &str) -> CatalogResult<Self> {
        Self::with_config(base_url, RetryConfig::default())
    }

    /// Create a client with custom retry behavior
    pub fn with_config(base_url: &str, retry_config: RetryConfig) -> CatalogResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(60))
            .gzip(true)
            .user_agent(concat!("keel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KeelError::network(format!("Failed to create HTTP client: {}", e), e))?;

        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| KeelError::config("sources.remote", format!("'{}' is not a URL: {}", base_url, e)))?;

        Ok(Self {
            client,
            retry_config,
            base_url,
            cache: Arc::new(IndexCache::new()),
        })
    }

    /// Share an index cache with other clients, so clients built for later
    /// runs against the same repository reuse indexes already fetched
    pub fn with_cache(mut self, cache: Arc<IndexCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Resolve a repository-relative path
    pub fn url_for(&self, relative: &str) -> CatalogResult<Url> {
        self.base_url
            .join(relative.trim_start_matches('/'))
            .map_err(|e| KeelError::network(format!("Invalid artifact path '{}'", relative), e))
    }

    /// Execute HTTP request with exponential backoff retry logic
    async fn with_retry<F, Fut, T>(&self, operation: F) -> CatalogResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CatalogResult<T>>,
    {
        let mut delay = self.retry_config.initial_delay;
        let mut last_error = None;

        for attempt in 0..=self.retry_config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    // Only transport failures are worth another attempt
                    let retryable = error.is_recoverable();
                    last_error = Some(error);
                    if !retryable || attempt == self.retry_config.max_retries {
                        break;
                    }

                    debug!(attempt, ?delay, "retrying repository request");
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(
                        Duration::from_millis((delay.as_millis() as f64 * self.retry_config.multiplier) as u64),
                        self.retry_config.max_delay,
                    );
                },
            }
        }

        Err(last_error.unwrap_or_else(|| KeelError::Network {
            message: "Retry operation failed without error".to_string(),
            source: None,
        }))
    }

    /// Fetch the repository index for a runtime version, using the cache.
    ///
    /// Entries are returned undecoded; see [`decode_index`](crate::api::decode_index).
    pub async fn fetch_index(&self, runtime_version: &str) -> CatalogResult<Vec<Value>> {
        let url = self.url_for(&index_path(runtime_version))?;
        if let Some(entries) = self.cache.get(url.as_str()) {
            debug!(%url, "repository index served from cache");
            return Ok(entries);
        }

        let entries = self
            .with_retry(|| async {
                let response = self.get(&url).await?;
                match response.status() {
                    StatusCode::OK => response.json::<Vec<Value>>().await.map_err(|e| {
                        KeelError::CatalogUnavailable {
                            message: format!("{} is not a valid feature index: {}", url, e),
                        }
                    }),
                    StatusCode::NOT_FOUND => Err(KeelError::CatalogUnavailable {
                        message: format!("{} has no index for runtime {}", self.base_url, runtime_version),
                    }),
                    status => Err(KeelError::Network {
                        message: format!("Repository returned status {} for {}", status, url),
                        source: None,
                    }),
                }
            })
            .await?;

        self.cache.insert(url.to_string(), entries.clone());
        Ok(entries)
    }

    /// Download an artifact by its repository-relative path
    pub async fn download(&self, relative: &str) -> CatalogResult<Vec<u8>> {
        self.download_optional(relative)
            .await?
            .ok_or_else(|| KeelError::CatalogUnavailable {
                message: format!("{} has no artifact {}", self.base_url, relative),
            })
    }

    /// Download a file that may legitimately be absent (detached signatures)
    pub async fn download_optional(&self, relative: &str) -> CatalogResult<Option<Vec<u8>>> {
        let url = self.url_for(relative)?;
        self.with_retry(|| async {
            let response = self.get(&url).await?;
            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    let bytes = response
                        .bytes()
                        .await
                        .map_err(|e| KeelError::network(format!("Failed to read {}", url), e))?;
                    Ok(Some(bytes.to_vec()))
                },
                status => {
                    warn!(%url, %status, "artifact download failed");
                    Err(KeelError::Network {
                        message: format!("Repository returned status {} for {}", status, url),
                        source: None,
                    })
                },
            }
        })
        .await
    }

    async fn get(&self, url: &Url) -> CatalogResult<reqwest::Response> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| KeelError::network(format!("Failed to reach {}", url), e))
    }
}
