//! Storage configuration types.
//!
//! `StorageConfig` mirrors `config.toml` in the data directory. Every field
//! has a default, so an empty file (or no file) yields a working setup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::listing::{DEFAULT_SESSION_LIMIT, MAX_SESSION_LIMIT};

/// Top-level storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub listing: ListingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
}

/// Database connection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL. When unset, `chatvault.db` in the data directory is used.
    #[serde(default)]
    pub url: Option<String>,
}

/// Exponential backoff settings for transient store failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Per-operation deadlines, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Create, update, get and the simple listings.
    #[serde(default = "default_timeout_secs")]
    pub default_secs: u64,
    #[serde(default = "default_short_timeout_secs")]
    pub message_add_secs: u64,
    #[serde(default = "default_short_timeout_secs")]
    pub session_end_secs: u64,
    /// Filtered listings and metrics aggregation.
    #[serde(default = "default_long_timeout_secs")]
    pub metrics_secs: u64,
    #[serde(default = "default_long_timeout_secs")]
    pub index_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_short_timeout_secs() -> u64 {
    5
}

fn default_long_timeout_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: default_timeout_secs(),
            message_add_secs: default_short_timeout_secs(),
            session_end_secs: default_short_timeout_secs(),
            metrics_secs: default_long_timeout_secs(),
            index_secs: default_long_timeout_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    pub fn message_add(&self) -> Duration {
        Duration::from_secs(self.message_add_secs)
    }

    pub fn session_end(&self) -> Duration {
        Duration::from_secs(self.session_end_secs)
    }

    pub fn metrics(&self) -> Duration {
        Duration::from_secs(self.metrics_secs)
    }

    pub fn index(&self) -> Duration {
        Duration::from_secs(self.index_secs)
    }
}

/// Page size limits for session listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_listing_limit")]
    pub default_limit: u32,
    #[serde(default = "default_listing_max")]
    pub max_limit: u32,
}

fn default_listing_limit() -> u32 {
    DEFAULT_SESSION_LIMIT
}

fn default_listing_max() -> u32 {
    MAX_SESSION_LIMIT
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_listing_limit(),
            max_limit: default_listing_max(),
        }
    }
}

/// Bounds for metrics aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Maximum number of session documents a single aggregation may scan.
    #[serde(default = "default_max_scan_documents")]
    pub max_scan_documents: u32,
}

fn default_max_scan_documents() -> u32 {
    100_000
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_scan_documents: default_max_scan_documents(),
        }
    }
}

/// Where the message encryption key comes from.
///
/// The key itself never lives in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Environment variable holding the raw key (16, 24 or 32 bytes).
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

fn default_key_env() -> String {
    "CHATVAULT_ENCRYPTION_KEY".to_string()
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            key_env: default_key_env(),
        }
    }
}
