//! Application state wiring the store and aggregator together.
//!
//! AppState pins the repository traits to the SQLite implementations and
//! shares one shutdown token between them, so Ctrl+C cancels whatever
//! operation is in flight.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chatvault_infra::config::{
    key_bytes, load_config, resolve_data_dir, resolve_database_url, resolve_encryption_key,
};
use chatvault_infra::crypto::codec::EncryptionCodec;
use chatvault_infra::sqlite::metrics::SqliteMetricsAggregator;
use chatvault_infra::sqlite::pool::DatabasePool;
use chatvault_infra::sqlite::session::SqliteSessionStore;
use chatvault_types::config::StorageConfig;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: StorageConfig,
    pub db_pool: DatabasePool,
    pub store: Arc<SqliteSessionStore>,
    pub metrics: Arc<SqliteMetricsAggregator>,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state: load config, open the DB, build the codec.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let db_url = resolve_database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database at {db_url}"))?;

        let key: Option<SecretString> = resolve_encryption_key(&config);
        if key.is_none() {
            tracing::warn!(
                key_env = %config.encryption.key_env,
                "no encryption key configured, message content is stored in plaintext"
            );
        }
        let codec = EncryptionCodec::try_new(&key_bytes(key.as_ref())).with_context(|| {
            format!(
                "invalid encryption key in ${}",
                config.encryption.key_env
            )
        })?;
        let codec = Arc::new(codec);

        let shutdown = CancellationToken::new();
        let store = SqliteSessionStore::new(db_pool.clone(), codec, &config)
            .with_shutdown(shutdown.clone());
        let metrics =
            SqliteMetricsAggregator::new(db_pool.clone(), &config).with_shutdown(shutdown.clone());

        Ok(Self {
            data_dir,
            config,
            db_pool,
            store: Arc::new(store),
            metrics: Arc::new(metrics),
            shutdown,
        })
    }
}
