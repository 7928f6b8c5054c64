//! Configuration loader for ChatVault.
//!
//! Reads `config.toml` from the data directory (`~/.chatvault/` in
//! production) into [`StorageConfig`]. Falls back to defaults when the file
//! is missing or malformed.

use std::path::{Path, PathBuf};

use chatvault_types::config::StorageConfig;
use secrecy::{ExposeSecret, SecretString};

use crate::sqlite::pool::database_url_for;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CHATVAULT_DATA_DIR";

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`StorageConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_config(data_dir: &Path) -> StorageConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return StorageConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return StorageConfig::default();
        }
    };

    match toml::from_str::<StorageConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            StorageConfig::default()
        }
    }
}

/// Data directory from `CHATVAULT_DATA_DIR`, falling back to `~/.chatvault`.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatvault"),
    }
}

/// Database URL: the configured one, else `chatvault.db` in `data_dir`.
pub fn resolve_database_url(config: &StorageConfig, data_dir: &Path) -> String {
    config
        .database
        .url
        .clone()
        .unwrap_or_else(|| database_url_for(data_dir))
}

/// Read the encryption key from the environment variable named in the config.
///
/// Returns `None` when the variable is unset or empty, which disables
/// encryption.
pub fn resolve_encryption_key(config: &StorageConfig) -> Option<SecretString> {
    let value = std::env::var(&config.encryption.key_env).ok()?;
    if value.is_empty() {
        return None;
    }
    Some(SecretString::from(value))
}

/// Raw key bytes for the codec; empty when no key is configured.
pub fn key_bytes(key: Option<&SecretString>) -> Vec<u8> {
    key.map(|k| k.expose_secret().as_bytes().to_vec())
        .unwrap_or_default()
}
