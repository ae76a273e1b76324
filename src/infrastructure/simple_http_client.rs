//! HTTP client for image downloads with retry and user agent management
//!
//! Gallery images are fetched outside the browser; this client supplies a
//! desktop user agent, bounded timeouts and exponential backoff.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::infrastructure::config::{ImageConfig, defaults};
use crate::infrastructure::image_fetcher::ImageSource;

/// Random desktop user agent from the built-in pool
pub fn random_user_agent() -> &'static str {
    defaults::USER_AGENTS[fastrand::usize(..defaults::USER_AGENTS.len())]
}

/// Statuses worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::INTERNAL_SERVER_ERROR
    )
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Additional attempts after the first failure
    pub max_retries: u32,
    /// User agent string sent when rotation is off
    pub user_agent: String,
    /// Pick a random desktop user agent per request
    pub rotate_user_agent: bool,
    /// Whether to follow redirects
    pub follow_redirects: bool,
}

impl HttpClientConfig {
    pub fn from_image_config(image_config: &ImageConfig, rotate_user_agent: bool) -> Self {
        Self {
            timeout_seconds: image_config.request_timeout_secs,
            max_retries: image_config.max_retries,
            user_agent: image_config.user_agent.clone(),
            rotate_user_agent,
            follow_redirects: true,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_image_config(&ImageConfig::default(), false)
    }
}

/// HTTP client with retry and error handling
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Fetch a body with retry on network errors and retryable statuses
    pub async fn fetch_bytes_with_policy(&self, url: &str) -> Result<Vec<u8>> {
        let attempts = self.config.max_retries + 1;
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=attempts {
            debug!("🌐 HTTP GET (attempt {}/{}): {}", attempt, attempts, url);
            let mut request = self.client.get(url);
            if self.config.rotate_user_agent {
                request = request.header(reqwest::header::USER_AGENT, random_user_agent());
            }

            match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp
                            .bytes()
                            .await
                            .map(|b| b.to_vec())
                            .map_err(|e| anyhow!("Failed to read response body: {}", e));
                    }

                    if !is_retryable_status(status) {
                        return Err(anyhow!("HTTP error {}: {}", status, url));
                    }
                    warn!("❌ HTTP error {} on attempt {}: {}", status, attempt, url);
                    let mut delay_secs = 2_u64.pow(attempt - 1);
                    if let Some(parsed) = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                    {
                        delay_secs = parsed.max(delay_secs);
                    }
                    last_err = Some(anyhow!("HTTP error {}: {}", status, url));
                    if attempt < attempts {
                        sleep(Duration::from_secs(delay_secs)).await;
                    }
                }
                Err(e) => {
                    warn!("⚠️ Network error on attempt {}: {}", attempt, e);
                    last_err = Some(anyhow!("HTTP request failed: {}", e));
                    if attempt < attempts {
                        sleep(Duration::from_secs(2_u64.pow(attempt - 1))).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Unknown HTTP error for {}", url)))
    }
}

#[async_trait]
impl ImageSource for HttpClient {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.fetch_bytes_with_policy(url).await?;
        info!("   📥 {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}
