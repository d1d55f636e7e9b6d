//! Gateway configuration.
//!
//! Provides [`GatewayConfig`] for the namespace prefix, the per-operation
//! deadline, and the choice of bundled backend. Values are loaded from
//! environment variables via [`GatewayConfig::from_env`]; unparsable values
//! are ignored with a warning and the default is kept.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use typed_builder::TypedBuilder;

use crate::error::ConfigError;
use crate::namespace::{DEFAULT_PREFIX, KeyNamespace};

/// Default per-operation deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 50;

/// Default number of entries per listing page for the bundled backends.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Which bundled backend a process should construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Directory tree on the local filesystem.
    #[default]
    Local,
    /// Process-local in-memory map.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "fs" => Ok(Self::Local),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown backend {other:?}")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Memory => "memory",
        })
    }
}

/// Gateway configuration.
///
/// # Examples
///
/// ```
/// use bucketgate_core::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.key_prefix, "test-files/");
/// assert_eq!(config.timeout().as_secs(), 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Prefix prepended to every logical name.
    #[builder(default = String::from(DEFAULT_PREFIX))]
    pub key_prefix: String,

    /// Per-operation deadline in seconds.
    #[builder(default = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Bundled backend to construct.
    #[builder(default)]
    pub backend: BackendKind,

    /// Root directory for the local backend.
    #[builder(default = String::from("./data"))]
    pub data_dir: String,

    /// Listing page size for the bundled backends.
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::from(DEFAULT_PREFIX),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            backend: BackendKind::default(),
            data_dir: String::from("./data"),
            page_size: DEFAULT_PAGE_SIZE,
            log_level: String::from("info"),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `BUCKETGATE_PREFIX` | `test-files/` |
    /// | `BUCKETGATE_TIMEOUT_SECS` | `50` |
    /// | `BUCKETGATE_BACKEND` | `local` |
    /// | `BUCKETGATE_DATA_DIR` | `./data` |
    /// | `BUCKETGATE_PAGE_SIZE` | `1000` |
    /// | `LOG_LEVEL` | `info` |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("BUCKETGATE_PREFIX") {
            config.key_prefix = v;
        }
        if let Some(v) = lookup("BUCKETGATE_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => config.timeout_secs = n,
                _ => warn!(value = %v, "ignoring invalid BUCKETGATE_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = lookup("BUCKETGATE_BACKEND") {
            match v.parse::<BackendKind>() {
                Ok(kind) => config.backend = kind,
                Err(e) => warn!(error = %e, "ignoring invalid BUCKETGATE_BACKEND"),
            }
        }
        if let Some(v) = lookup("BUCKETGATE_DATA_DIR") {
            config.data_dir = v;
        }
        if let Some(v) = lookup("BUCKETGATE_PAGE_SIZE") {
            match v.parse::<usize>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => warn!(value = %v, "ignoring invalid BUCKETGATE_PAGE_SIZE"),
            }
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }

    /// The per-operation deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Build the key namespace for the configured prefix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrefix`] if the prefix is unsafe.
    pub fn namespace(&self) -> Result<KeyNamespace, ConfigError> {
        KeyNamespace::new(self.key_prefix.clone())
    }
}
