//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PLATYPUS_*)
//! 2. TOML config file (if PLATYPUS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Version tag of the namespace this build owns.
///
/// Bump on any manifest or strategy change so activation deletes the
/// previous namespace.
pub const DEFAULT_CACHE_VERSION: &str = "platypus-cache-v4";

/// Remote media host whose assets are always treated as images.
pub const DEFAULT_MEDIA_HOST: &str = "cloudinary.com";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PLATYPUS_*)
/// 2. TOML config file (if PLATYPUS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via PLATYPUS_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Name of the current cache namespace.
    ///
    /// Set via PLATYPUS_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Origin of the site whose requests are intercepted.
    ///
    /// Set via PLATYPUS_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Hostname substring identifying the remote media host.
    ///
    /// Set via PLATYPUS_MEDIA_HOST environment variable.
    #[serde(default = "default_media_host")]
    pub media_host: String,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via PLATYPUS_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via PLATYPUS_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via PLATYPUS_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./platypus-cache.sqlite")
}

fn default_cache_version() -> String {
    DEFAULT_CACHE_VERSION.into()
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_media_host() -> String {
    DEFAULT_MEDIA_HOST.into()
}

fn default_user_agent() -> String {
    "platypus-sw/0.1".into()
}

fn default_max_bytes() -> usize {
    20 * 1024 * 1024 // 20MB, hero stills are large
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_version: default_cache_version(),
            origin: default_origin(),
            media_host: default_media_host(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The configured origin parsed as a URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn site_origin(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PLATYPUS_`
    /// 2. TOML file from `PLATYPUS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PLATYPUS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PLATYPUS_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
