//! TOML configuration.
//!
//! Every section is optional; omitted values fall back to the Parc Astérix
//! defaults, so an empty file (or no file at all) is a valid configuration.

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub park: ParkConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ParkConfig {
    #[serde(default = "default_park_id")]
    pub id: String,
    #[serde(default = "default_park_name")]
    pub name: String,
    /// IANA zone name used to interpret calendar dates.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ParkConfig {
    fn default() -> Self {
        Self {
            id: default_park_id(),
            name: default_park_name(),
            timezone: default_timezone(),
        }
    }
}

fn default_park_id() -> String {
    "parcasterix".to_string()
}
fn default_park_name() -> String {
    "Parc Astérix".to_string()
}
fn default_timezone() -> String {
    "Europe/Paris".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    /// GraphQL endpoint serving both the package descriptor and live polling.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Package format version announced in the `x-package-version` header.
    #[serde(default = "default_package_version")]
    pub package_version: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            package_version: default_package_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.middleware.parcasterix.fr/graphql".to_string()
}
fn default_package_version() -> String {
    "1.1.29".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub attractions_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub shows_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub restaurants_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub calendar_ttl_secs: u64,
    /// Where extracted snapshots are written. Defaults to the system temp dir.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            attractions_ttl_secs: default_ttl_secs(),
            shows_ttl_secs: default_ttl_secs(),
            restaurants_ttl_secs: default_ttl_secs(),
            calendar_ttl_secs: default_ttl_secs(),
            snapshot_dir: None,
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

impl ParkConfig {
    /// Parsed time zone. [`load_config`] guarantees this succeeds for loaded
    /// configurations; hand-built ones are checked here.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("park.timezone '{}' is not a valid IANA zone: {}", self.timezone, e))
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.park.id.trim().is_empty() {
        bail!("park.id must not be empty");
    }

    config.park.tz()?;

    let base = config.upstream.api_base.as_str();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        bail!("upstream.api_base must be an http(s) URL, got '{}'", base);
    }

    if config.upstream.timeout_secs == 0 {
        bail!("upstream.timeout_secs must be > 0");
    }

    let ttls = [
        ("attractions_ttl_secs", config.cache.attractions_ttl_secs),
        ("shows_ttl_secs", config.cache.shows_ttl_secs),
        ("restaurants_ttl_secs", config.cache.restaurants_ttl_secs),
        ("calendar_ttl_secs", config.cache.calendar_ttl_secs),
    ];
    for (name, ttl) in ttls {
        if ttl == 0 {
            bail!("cache.{} must be > 0", name);
        }
    }

    Ok(())
}
