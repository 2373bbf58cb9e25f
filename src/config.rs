use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Delay between ingestion cycles, in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    /// Classification rules, highest priority first
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_database_url() -> String {
    "sqlite:megafeed.db?mode=rwc".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Attempts per source per cycle, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed pause between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sources fetched at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Drop entries without a summary
    #[serde(default)]
    pub require_summary: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_secs() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

fn default_user_agent() -> String {
    "Megafeed/1.0 (RSS Aggregator)".to_string()
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            user_agent: default_user_agent(),
            require_summary: false,
        }
    }
}

impl FetchConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Longest a single source can take when every attempt times out.
    pub fn worst_case_duration(&self) -> Duration {
        let attempts = u64::from(self.max_attempts);
        Duration::from_secs(
            attempts * self.timeout_secs + attempts.saturating_sub(1) * self.retry_delay_secs,
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default = "default_site_title")]
    pub title: String,
    #[serde(default = "default_site_domain")]
    pub domain: String,
}

fn default_site_title() -> String {
    "Megafeed".to_string()
}

fn default_site_domain() -> String {
    "megafeed.co".to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            domain: default_site_domain(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CategoryConfig {
    pub name: String,
    pub patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl FeedConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse and validate config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_secs(self.refresh_interval * 60)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval == 0 {
            return Err(ConfigError::invalid("refresh_interval must be at least 1 minute"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::invalid("fetch.max_attempts must be at least 1"));
        }
        if self.fetch.concurrency == 0 {
            return Err(ConfigError::invalid("fetch.concurrency must be at least 1"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch.timeout_secs must be at least 1"));
        }
        if self.fetch.worst_case_duration() >= self.refresh_delay() {
            return Err(ConfigError::invalid(format!(
                "worst-case fetch time per source ({}s) must stay below refresh_interval ({}s)",
                self.fetch.worst_case_duration().as_secs(),
                self.refresh_delay().as_secs()
            )));
        }

        for feed in &self.feeds {
            let url = reqwest::Url::parse(&feed.url)
                .map_err(|e| ConfigError::invalid(format!("feed url '{}': {}", feed.url, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(format!(
                    "feed url '{}' must use http or https",
                    feed.url
                )));
            }
        }

        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(ConfigError::invalid("category name must not be empty"));
            }
            if category.patterns.iter().any(|p| p.is_empty()) {
                return Err(ConfigError::invalid(format!(
                    "category '{}' has an empty pattern",
                    category.name
                )));
            }
        }

        Ok(())
    }
}
