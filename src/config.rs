//! Runtime configuration
//!
//! Settings come from defaults, then `TABLESYNC_*` environment variables,
//! then command-line flags (applied by [`crate::cli::Cli::apply_to`]).

use directories::ProjectDirs;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::ProxySettings;

/// API endpoint used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:1337";

/// Origin the static site is served from
pub const DEFAULT_ORIGIN: &str = "http://localhost:8000";

/// Prefix shared by every cache bucket this application owns
pub const DEFAULT_CACHE_PREFIX: &str = "mws-p1";

/// App shell cached at install time, relative to the origin
pub const DEFAULT_STATIC_MANIFEST: &[&str] = &[
    "./",
    "index.html",
    "css/styles.css",
    "css/leaflet.css",
    "assets/star_white.png",
    "assets/star_full.png",
    "assets/restaurant.ico",
    "css/images/marker-icon.png",
    "css/images/marker-shadow.png",
    "js/main.js",
    "js/dbhelper.js",
    "restaurant_info.js",
    "js/idb-keyval-iife.min.js",
    "js/leaflet.js",
    "restaurant.html",
    "404.html",
    "offline.html",
    "manifest.json",
];

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    /// No data directory was given and none could be derived from the home directory
    #[error("Could not determine a data directory; set TABLESYNC_DATA_DIR or pass --data-dir")]
    NoDataDir,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the restaurant API
    pub api_base_url: String,
    /// Origin whose requests go through the resource cache
    pub origin: String,
    /// Overrides the platform data and cache directories when set
    pub data_dir: Option<PathBuf>,
    pub cache_prefix: String,
    /// Bumped to invalidate every cached bucket on the next activation
    pub cache_version: u32,
    pub static_manifest: Vec<String>,
    /// Interval between outbox re-checks in `watch`; `None` disables retries
    pub sync_retry_interval: Option<Duration>,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            data_dir: None,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            cache_version: 1,
            static_manifest: DEFAULT_STATIC_MANIFEST.iter().map(|s| s.to_string()).collect(),
            sync_retry_interval: Some(Duration::from_secs(30)),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Create a Config from environment variables.
    ///
    /// Environment variables:
    /// - `TABLESYNC_API_URL`: API base URL (default: http://localhost:1337)
    /// - `TABLESYNC_ORIGIN`: site origin (default: http://localhost:8000)
    /// - `TABLESYNC_DATA_DIR`: directory for the store and the resource cache
    /// - `TABLESYNC_CACHE_VERSION`: cache bucket version (default: 1)
    /// - `TABLESYNC_SYNC_RETRY_SECS`: outbox retry interval, 0 disables (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a Config reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("TABLESYNC_API_URL") {
            config.api_base_url = parse_url("TABLESYNC_API_URL", &url)?;
        }
        if let Some(origin) = var("TABLESYNC_ORIGIN") {
            config.origin = parse_url("TABLESYNC_ORIGIN", &origin)?;
        }
        if let Some(dir) = var("TABLESYNC_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(version) = var("TABLESYNC_CACHE_VERSION") {
            config.cache_version = parse_number("TABLESYNC_CACHE_VERSION", &version)?;
        }
        if let Some(secs) = var("TABLESYNC_SYNC_RETRY_SECS") {
            let secs: u64 = parse_number("TABLESYNC_SYNC_RETRY_SECS", &secs)?;
            config.sync_retry_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "tablesync")
    }

    /// Directory holding the key-value store
    pub fn store_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.join("store")),
            None => Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("store"))
                .ok_or(ConfigError::NoDataDir),
        }
    }

    /// Directory holding the resource cache buckets
    pub fn cache_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.join("cache")),
            None => Self::project_dirs()
                .map(|dirs| dirs.cache_dir().to_path_buf())
                .ok_or(ConfigError::NoDataDir),
        }
    }

    pub fn static_bucket(&self) -> String {
        format!("{}-static-cache-{}", self.cache_prefix, self.cache_version)
    }

    pub fn dynamic_bucket(&self) -> String {
        format!("{}-dynamic-cache-{}", self.cache_prefix, self.cache_version)
    }

    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            origin: self.origin.clone(),
            cache_prefix: self.cache_prefix.clone(),
            static_bucket: self.static_bucket(),
            dynamic_bucket: self.dynamic_bucket(),
            manifest: self.static_manifest.clone(),
            not_found_page: "404.html".to_string(),
            offline_page: "offline.html".to_string(),
        }
    }

    /// HTTP client shared by the fetcher and the API client
    pub fn http_client(&self) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("tablesync/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
            reason: "expected an http:// or https:// URL".to_string(),
        })
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
