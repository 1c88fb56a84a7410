//! Configuration loading.
//!
//! Settings come from an optional TOML file (`--config`, default
//! `./config/harness.toml`) overlaid with environment variables:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `NYTIMES_API_KEY` | upstream API key, required by `archive` and `search` |
//! | `ARTICLES_DB_PATH` | overrides `[db].path` |
//!
//! A missing file yields the built-in defaults; a file that exists but does
//! not parse or validate is an error.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use article_harness_core::error::IngestError;

use crate::client::Delay;

pub const API_KEY_ENV: &str = "NYTIMES_API_KEY";
pub const DB_PATH_ENV: &str = "ARTICLES_DB_PATH";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub rate_limit: DelayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub search: SearchConfig,
    /// Never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/articles.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_archive_base_url")]
    pub archive_base_url: String,
    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            archive_base_url: default_archive_base_url(),
            search_base_url: default_search_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_archive_base_url() -> String {
    "https://api.nytimes.com/svc/archive/v1/".to_string()
}
fn default_search_base_url() -> String {
    "https://api.nytimes.com/svc/search/v2/".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// A fixed (`min == max`) or uniformly jittered delay, in seconds.
#[derive(Debug, Deserialize, Clone)]
pub struct DelayConfig {
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

// The upstream quota is roughly five requests per minute.
fn default_min_delay() -> f64 {
    12.0
}
fn default_max_delay() -> f64 {
    15.0
}

impl DelayConfig {
    pub fn to_delay(&self) -> Delay {
        let min = Duration::from_secs_f64(self.min_delay_secs);
        let max = Duration::from_secs_f64(self.max_delay_secs);
        if min == max {
            Delay::Fixed(min)
        } else {
            Delay::Jittered { min, max }
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if !(self.min_delay_secs.is_finite() && self.max_delay_secs.is_finite()) {
            bail!("{section}: delays must be finite numbers");
        }
        if self.min_delay_secs < 0.0 {
            bail!("{section}.min_delay_secs must be >= 0");
        }
        if self.min_delay_secs > self.max_delay_secs {
            bail!("{section}.min_delay_secs must be <= max_delay_secs");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_min_delay")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_secs: default_min_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

impl RetryConfig {
    pub fn delay(&self) -> DelayConfig {
        DelayConfig {
            min_delay_secs: self.min_delay_secs,
            max_delay_secs: self.max_delay_secs,
        }
    }
}

/// What the driver does when a unit exhausts its retries.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnitFailurePolicy {
    Abort,
    Skip,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_years")]
    pub default_years: u32,
    #[serde(default)]
    pub default_month_offset: u32,
    #[serde(default = "default_true")]
    pub early_stop: bool,
    #[serde(default = "default_archive_failure")]
    pub on_unit_failure: UnitFailurePolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            default_years: default_years(),
            default_month_offset: 0,
            early_stop: true,
            on_unit_failure: default_archive_failure(),
        }
    }
}

fn default_years() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_archive_failure() -> UnitFailurePolicy {
    UnitFailurePolicy::Abort
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_pages")]
    pub default_pages: u32,
    #[serde(default = "default_search_failure")]
    pub on_unit_failure: UnitFailurePolicy,
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_pages: default_pages(),
            on_unit_failure: default_search_failure(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

fn default_pages() -> u32 {
    10
}
fn default_search_failure() -> UnitFailurePolicy {
    UnitFailurePolicy::Skip
}
fn default_lease_ttl() -> i64 {
    6 * 60 * 60
}

const API_KEY_GUIDANCE: &str = "Please generate an API key at https://developer.nytimes.com/ \
and add it to your environment variables as follows:

    export NYTIMES_API_KEY=<your_api_key>

Then run this command again.";

impl Config {
    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            self.db.path = PathBuf::from(path);
        }
        self.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
    }

    /// The API key, or the startup-precondition failure with setup guidance.
    pub fn require_api_key(&self) -> Result<&str, IngestError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| IngestError::StartupPrecondition(API_KEY_GUIDANCE.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be >= 1");
        }
        self.rate_limit.validate("rate_limit")?;
        self.retry.delay().validate("retry")?;
        if self.api.archive_base_url.trim().is_empty() || self.api.search_base_url.trim().is_empty()
        {
            bail!("api base URLs must not be empty");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be > 0");
        }
        if self.search.lease_ttl_secs < 0 {
            bail!("search.lease_ttl_secs must be >= 0");
        }
        Ok(())
    }
}

/// Parse a config file's contents without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load the config file (if present) and overlay the process environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    config.apply_env_with(|key| std::env::var(key).ok());
    Ok(config)
}
