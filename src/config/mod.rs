//! Resolver configuration.
//!
//! Settings are read from a TOML file and may be overridden by environment
//! variables. A missing file is not an error: every field has a default.
//!
//! # Location
//!
//! 1. `$ENVDEPS_CONFIG_PATH` if set
//! 2. `~/.envdeps/config.toml` (`%LOCALAPPDATA%\envdeps\config.toml` on Windows)
//!
//! # Format
//!
//! ```toml
//! max_parallel_fetches = 8
//! fetch_timeout_secs = 30
//! resolve_timeout_secs = 300   # 0 disables the overall deadline
//! fetch_retries = 3
//! catalog_dir = "./templates"
//! registry_dir = "/srv/envdeps/registry"
//! ```
//!
//! # Environment Overrides
//!
//! | Variable | Field |
//! |---|---|
//! | `ENVDEPS_MAX_PARALLEL` | `max_parallel_fetches` |
//! | `ENVDEPS_FETCH_TIMEOUT` | `fetch_timeout_secs` |
//! | `ENVDEPS_RESOLVE_TIMEOUT` | `resolve_timeout_secs` |
//!
//! # Examples
//!
//! ```rust,no_run
//! use envdeps::config::ResolverConfig;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ResolverConfig::load().await?;
//! println!("fetching up to {} templates at once", config.max_parallel_fetches);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    DEFAULT_FETCH_RETRIES, DEFAULT_FETCH_TIMEOUT, DEFAULT_RESOLVE_TIMEOUT,
    default_max_parallel_fetches,
};
use crate::core::EnvdepsError;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "ENVDEPS_CONFIG_PATH";
/// Environment override for [`ResolverConfig::max_parallel_fetches`].
pub const MAX_PARALLEL_ENV: &str = "ENVDEPS_MAX_PARALLEL";
/// Environment override for [`ResolverConfig::fetch_timeout_secs`].
pub const FETCH_TIMEOUT_ENV: &str = "ENVDEPS_FETCH_TIMEOUT";
/// Environment override for [`ResolverConfig::resolve_timeout_secs`].
pub const RESOLVE_TIMEOUT_ENV: &str = "ENVDEPS_RESOLVE_TIMEOUT";

/// Settings for dependency resolution and registry access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on concurrent registry fetches within one resolution wave.
    pub max_parallel_fetches: usize,

    /// Deadline for a single registry fetch, in seconds.
    pub fetch_timeout_secs: u64,

    /// Deadline for a whole resolution, in seconds. `0` disables it.
    pub resolve_timeout_secs: u64,

    /// Retry attempts applied by [`crate::registry::RetryingFetcher`].
    pub fetch_retries: usize,

    /// Directory of `*.toml` template declarations loaded into the local store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_dir: Option<PathBuf>,

    /// Root of a directory-backed registry used for fetching.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_parallel_fetches: default_max_parallel_fetches(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT.as_secs(),
            resolve_timeout_secs: DEFAULT_RESOLVE_TIMEOUT.as_secs(),
            fetch_retries: DEFAULT_FETCH_RETRIES,
            catalog_dir: None,
            registry_dir: None,
        }
    }
}

impl ResolverConfig {
    /// Load the configuration from the default location and apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if an override or the resulting configuration is invalid.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, otherwise from the default location.
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// in both cases.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };

        let mut config = if fs::try_exists(&path).await.unwrap_or(false) {
            Self::load_from(&path).await?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, without environment overrides.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save the configuration as pretty TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// The config file location: `$ENVDEPS_CONFIG_PATH` or the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("envdeps")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".envdeps")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`EnvdepsError::ConfigError`] when a value is not an unsigned integer.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(MAX_PARALLEL_ENV) {
            self.max_parallel_fetches = parse_override(MAX_PARALLEL_ENV, &value)?;
        }
        if let Some(value) = lookup(FETCH_TIMEOUT_ENV) {
            self.fetch_timeout_secs = parse_override(FETCH_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(RESOLVE_TIMEOUT_ENV) {
            self.resolve_timeout_secs = parse_override(RESOLVE_TIMEOUT_ENV, &value)?;
        }
        Ok(())
    }

    /// Reject settings the resolver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_fetches == 0 {
            return Err(EnvdepsError::ConfigError {
                message: "max_parallel_fetches must be at least 1".to_string(),
            }
            .into());
        }
        if self.fetch_timeout_secs == 0 {
            return Err(EnvdepsError::ConfigError {
                message: "fetch_timeout_secs must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Per-fetch deadline.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Overall resolution deadline, `None` when disabled.
    pub fn resolve_timeout(&self) -> Option<Duration> {
        (self.resolve_timeout_secs > 0).then(|| Duration::from_secs(self.resolve_timeout_secs))
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        EnvdepsError::ConfigError {
            message: format!("{key} must be a non-negative integer, got '{value}'"),
        }
        .into()
    })
}
