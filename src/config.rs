use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Origin serving `/api/*` and the dashboard pages
    pub api_base_url: String,
    /// Page to open, relative to `api_base_url` (e.g. `details.html?lot=1`)
    pub page: String,
    pub status_port: u16,

    pub listing_poll_interval_ms: u64,
    pub details_poll_interval_ms: u64,
    pub clock_interval_ms: u64,
    pub health_check_interval_ms: u64,

    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub first_frame_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            page: "/".to_string(),
            status_port: 8080,

            listing_poll_interval_ms: 5000,
            details_poll_interval_ms: 3000,
            clock_interval_ms: 1000,
            health_check_interval_ms: 10000,

            max_retries: 3,
            retry_backoff_ms: 2000,
            request_timeout_ms: 5000,
            first_frame_timeout_ms: 15000,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Ok(config_str) = fs::read_to_string(path) {
            let config: AppConfig = serde_json::from_str(&config_str)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            return Ok(config);
        }

        tracing::warn!("{} not found, using default configuration", path.display());
        Ok(AppConfig::default())
    }

    /// Ticker periods must be non-zero
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("listing_poll_interval_ms", self.listing_poll_interval_ms),
            ("details_poll_interval_ms", self.details_poll_interval_ms),
            ("clock_interval_ms", self.clock_interval_ms),
            ("health_check_interval_ms", self.health_check_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }
        Ok(())
    }

    #[allow(dead_code)]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api_base_url: {}", self.api_base_url))
    }

    /// Absolute URL of the configured page
    pub fn page_url(&self) -> Result<Url> {
        let base = self.base_url()?;
        base.join(&self.page)
            .with_context(|| format!("invalid page: {}", self.page))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.first_frame_timeout_ms)
    }
}
