//! Configuration infrastructure
//!
//! Contains configuration loading and management for scraping runs.
//!
//! Configuration is organized into sections:
//! 1. `scraper` - marketplace, pacing and row layout (exposed on the command line)
//! 2. `readiness` / `images` / `browser` - timeouts and thresholds (config file only)
//! 3. `output` / `logging` - where results and logs go

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::Marketplace;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub readiness: ReadinessConfig,
    pub images: ImageConfig,
    pub browser: BrowserConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Run pacing and row layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Country code or domain of the storefront ("de", "amazon.co.uk", ...)
    pub marketplace: String,

    /// Lower bound of the random pause between identifiers, in seconds
    pub min_pause_secs: f64,

    /// Upper bound of the random pause between identifiers, in seconds
    pub max_pause_secs: f64,

    /// Minimum number of image columns reserved on every row
    pub min_image_columns: u32,

    /// Upper bound on gallery images kept per product
    pub max_images_per_product: usize,

    /// Pick a random desktop user agent for every identifier
    pub rotate_user_agent: bool,

    /// How often the authentication gate re-checks the session
    pub auth_poll_interval_ms: u64,

    /// Give up waiting for authentication after this many seconds (`None` waits forever)
    pub auth_timeout_secs: Option<u64>,
}

/// Timeouts and round counts for the page readiness state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Page-load attempts per identifier (shared by load and content check)
    pub load_attempts: u32,

    /// Maximum wait for `document.readyState == "complete"`
    pub ready_state_timeout_ms: u64,

    /// Randomized settle delay after the document is complete
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,

    /// Interval between condition polls
    pub poll_interval_ms: u64,

    /// Wait per main-image selector before trying the next one
    pub main_image_wait_ms: u64,

    /// Delay after clicking the main image
    pub post_click_delay_ms: u64,

    /// Gallery wait rounds before the final long wait
    pub gallery_rounds: u32,

    /// Poll window per gallery round
    pub gallery_poll_ms: u64,

    pub scroll_down_px: i64,
    pub scroll_up_px: i64,
    pub scroll_pause_ms: u64,

    /// Final wait for the gallery after all rounds
    pub final_gallery_wait_ms: u64,
}

/// Image download and embedding parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub request_timeout_secs: u64,

    /// Bodies shorter than this are rejected without decoding
    pub min_body_bytes: usize,

    /// Images with both sides at or below this are treated as icons
    pub icon_max_dimension: u32,

    /// Target cell edge in pixels; images are scaled down to fit
    pub cell_size_px: u32,

    /// Offset of the image inside its cell, in pixels
    pub image_offset_px: u32,

    /// Height of every data row, in points
    pub row_height_pt: f64,

    /// Additional download attempts after a transport failure
    pub max_retries: u32,

    pub user_agent: String,
}

/// DevTools endpoint of an already running browser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// e.g. `http://127.0.0.1:9222`
    pub debugger_url: String,
    pub request_timeout_secs: u64,
}

/// Output workbook location and naming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File stem; `_2`, `_3`, ... are appended when the name is taken
    pub base_name: String,
    pub worksheet_name: String,

    /// Directory for the workbook (defaults to the working directory)
    pub output_dir: Option<PathBuf>,

    /// When set, every embedded image is also written here as `<IDENTIFIER>_<n>.<ext>`
    pub image_export_dir: Option<PathBuf>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    pub console_output: bool,
    pub file_output: bool,

    /// Name of the active log file inside the log directory
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            marketplace: defaults::MARKETPLACE.to_string(),
            min_pause_secs: defaults::MIN_PAUSE_SECS,
            max_pause_secs: defaults::MAX_PAUSE_SECS,
            min_image_columns: defaults::MIN_IMAGE_COLUMNS,
            max_images_per_product: defaults::MAX_IMAGES_PER_PRODUCT,
            rotate_user_agent: true,
            auth_poll_interval_ms: defaults::AUTH_POLL_INTERVAL_MS,
            auth_timeout_secs: None,
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            load_attempts: defaults::LOAD_ATTEMPTS,
            ready_state_timeout_ms: defaults::READY_STATE_TIMEOUT_MS,
            settle_min_ms: defaults::SETTLE_MIN_MS,
            settle_max_ms: defaults::SETTLE_MAX_MS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            main_image_wait_ms: defaults::MAIN_IMAGE_WAIT_MS,
            post_click_delay_ms: defaults::POST_CLICK_DELAY_MS,
            gallery_rounds: defaults::GALLERY_ROUNDS,
            gallery_poll_ms: defaults::GALLERY_POLL_MS,
            scroll_down_px: defaults::SCROLL_DOWN_PX,
            scroll_up_px: defaults::SCROLL_UP_PX,
            scroll_pause_ms: defaults::SCROLL_PAUSE_MS,
            final_gallery_wait_ms: defaults::FINAL_GALLERY_WAIT_MS,
        }
    }
}

impl ReadinessConfig {
    pub fn ready_state_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_state_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Uniformly random settle delay in `[settle_min_ms, settle_max_ms]`
    pub fn settle_delay(&self) -> Duration {
        let (lo, hi) = if self.settle_min_ms <= self.settle_max_ms {
            (self.settle_min_ms, self.settle_max_ms)
        } else {
            (self.settle_max_ms, self.settle_min_ms)
        };
        Duration::from_millis(fastrand::u64(lo..=hi))
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: defaults::IMAGE_TIMEOUT_SECS,
            min_body_bytes: defaults::MIN_IMAGE_BODY_BYTES,
            icon_max_dimension: defaults::ICON_MAX_DIMENSION,
            cell_size_px: defaults::CELL_SIZE_PX,
            image_offset_px: defaults::IMAGE_OFFSET_PX,
            row_height_pt: defaults::ROW_HEIGHT_PT,
            max_retries: defaults::IMAGE_MAX_RETRIES,
            user_agent: defaults::USER_AGENTS[0].to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            debugger_url: defaults::DEBUGGER_URL.to_string(),
            request_timeout_secs: defaults::BROWSER_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_name: defaults::OUTPUT_BASE_NAME.to_string(),
            worksheet_name: defaults::WORKSHEET_NAME.to_string(),
            output_dir: None,
            image_export_dir: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("chromiumoxide".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

/// Settings that make a run impossible; reported once, before any work starts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid pause range: min {min}s must be >= 0 and <= max {max}s")]
    InvalidPauseRange { min: f64, max: f64 },

    #[error("minimum image columns must be at least 1")]
    ZeroImageColumns,

    #[error("maximum images per product must be at least 1")]
    ZeroMaxImages,

    #[error("page load attempts must be at least 1")]
    ZeroLoadAttempts,

    #[error("unknown marketplace '{0}'")]
    UnknownMarketplace(String),

    #[error("cannot read identifier list {path}: {reason}")]
    InputUnreadable { path: String, reason: String },
}

impl AppConfig {
    /// Check every cross-field rule; the first violation wins
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scraper = &self.scraper;
        if !(scraper.min_pause_secs >= 0.0 && scraper.min_pause_secs <= scraper.max_pause_secs) {
            return Err(ConfigError::InvalidPauseRange {
                min: scraper.min_pause_secs,
                max: scraper.max_pause_secs,
            });
        }
        if scraper.min_image_columns == 0 {
            return Err(ConfigError::ZeroImageColumns);
        }
        if scraper.max_images_per_product == 0 {
            return Err(ConfigError::ZeroMaxImages);
        }
        if self.readiness.load_attempts == 0 {
            return Err(ConfigError::ZeroLoadAttempts);
        }
        self.marketplace()?;
        Ok(())
    }

    pub fn marketplace(&self) -> Result<Marketplace, ConfigError> {
        Marketplace::lookup(&self.scraper.marketplace)
            .ok_or_else(|| ConfigError::UnknownMarketplace(self.scraper.marketplace.clone()))
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("product-gallery-scraper");

        Ok(config_dir)
    }

    /// Manager for the per-user config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    /// Manager for an explicit config file
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file is corrupted: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                self.reset_to_defaults().await
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Reset configuration to defaults (useful for troubleshooting)
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("🔄 Resetting configuration to defaults");

        let default_config = AppConfig::default();
        self.save_config(&default_config)
            .await
            .context("Failed to save default configuration")?;

        info!("✅ Configuration reset to defaults");
        Ok(default_config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    /// Default storefront
    pub const MARKETPLACE: &str = "de";

    pub const MIN_PAUSE_SECS: f64 = 2.0;
    pub const MAX_PAUSE_SECS: f64 = 5.0;

    /// Image columns reserved even when a product has fewer images
    pub const MIN_IMAGE_COLUMNS: u32 = 9;

    pub const MAX_IMAGES_PER_PRODUCT: usize = 50;

    pub const AUTH_POLL_INTERVAL_MS: u64 = 2000;

    // Page readiness
    pub const LOAD_ATTEMPTS: u32 = 2;
    pub const READY_STATE_TIMEOUT_MS: u64 = 12_000;
    pub const SETTLE_MIN_MS: u64 = 1000;
    pub const SETTLE_MAX_MS: u64 = 2000;
    pub const POLL_INTERVAL_MS: u64 = 250;
    pub const MAIN_IMAGE_WAIT_MS: u64 = 3000;
    pub const POST_CLICK_DELAY_MS: u64 = 1200;
    pub const GALLERY_ROUNDS: u32 = 4;
    pub const GALLERY_POLL_MS: u64 = 2000;
    pub const SCROLL_DOWN_PX: i64 = 500;
    pub const SCROLL_UP_PX: i64 = 350;
    pub const SCROLL_PAUSE_MS: u64 = 250;
    pub const FINAL_GALLERY_WAIT_MS: u64 = 10_000;

    // Images
    pub const IMAGE_TIMEOUT_SECS: u64 = 12;
    pub const MIN_IMAGE_BODY_BYTES: usize = 16;
    pub const ICON_MAX_DIMENSION: u32 = 130;
    pub const CELL_SIZE_PX: u32 = 96;
    pub const IMAGE_OFFSET_PX: u32 = 2;
    pub const ROW_HEIGHT_PT: f64 = 72.0;
    pub const IMAGE_MAX_RETRIES: u32 = 1;

    // Browser
    pub const DEBUGGER_URL: &str = "http://127.0.0.1:9222";
    pub const BROWSER_REQUEST_TIMEOUT_SECS: u64 = 30;

    // Output
    pub const OUTPUT_BASE_NAME: &str = "Amazon_Output";
    pub const WORKSHEET_NAME: &str = "Products";

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "scraper.log";
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;

    /// Desktop user agents rotated per identifier
    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.marketplace().unwrap().domain, "amazon.de");
    }

    #[test]
    fn test_validate_rejects_inverted_pause_range() {
        let mut config = AppConfig::default();
        config.scraper.min_pause_secs = 6.0;
        config.scraper.max_pause_secs = 2.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPauseRange { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_columns_and_bad_marketplace() {
        let mut config = AppConfig::default();
        config.scraper.min_image_columns = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroImageColumns));

        let mut config = AppConfig::default();
        config.scraper.marketplace = "mars".into();
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnknownMarketplace("mars".into()))
        );
    }

    #[test]
    fn test_settle_delay_within_bounds() {
        let readiness = ReadinessConfig::default();
        for _ in 0..50 {
            let d = readiness.settle_delay();
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "scraper": { "marketplace": "uk" } }"#).unwrap();
        assert_eq!(config.scraper.marketplace, "uk");
        assert_eq!(config.scraper.min_image_columns, defaults::MIN_IMAGE_COLUMNS);
        assert_eq!(config.readiness.gallery_rounds, defaults::GALLERY_ROUNDS);
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(config.output.base_name, "Amazon_Output");
    }

    #[tokio::test]
    async fn test_corrupted_file_is_backed_up_and_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let manager = ConfigManager::with_path(&path);
        let config = manager.load_config().await.unwrap();

        assert_eq!(config.scraper.marketplace, defaults::MARKETPLACE);
        assert!(dir.path().join("config.json.corrupted").exists());
    }
}
