//! SQLite metrics aggregator.
//!
//! Implements `MetricsRepository` from `chatvault-core`. All figures come
//! from a single aggregate statement evaluated inside SQLite over at most
//! `max_scan_documents` sessions, so memory use in this process is constant
//! regardless of the window size.
//!
//! Concurrency is a per-second sweep over the start/end events of the same
//! bounded sample: each start is +1, each end is -1, events are summed per
//! second and a running total is taken with a window function.

use chatvault_core::context::OperationContext;
use chatvault_core::repository::{MetricsRepository, validate_time_range};
use chatvault_core::retry::RetryExecutor;
use chatvault_types::config::{StorageConfig, TimeoutConfig};
use chatvault_types::error::StorageError;
use chatvault_types::metrics::Metrics;
use chrono::{DateTime, Utc};
use sqlx::Row;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::pool::DatabasePool;
use super::{format_datetime, from_retry, is_retryable, store_error};

const METRICS_SQL: &str = r#"
WITH scanned AS (
    SELECT ts, endTs, adminAssisted, totalTokens, maxRespTime, avgRespTime
    FROM sessions
    WHERE ts >= ?1 AND ts <= ?2
    ORDER BY ts
    LIMIT ?3
),
events AS (
    SELECT CAST(strftime('%s', ts) AS INTEGER) AS t, 1 AS delta FROM scanned
    UNION ALL
    SELECT CAST(strftime('%s', endTs) AS INTEGER) AS t, -1 AS delta FROM scanned
    WHERE endTs IS NOT NULL
),
buckets AS (
    SELECT t, SUM(delta) AS delta FROM events GROUP BY t
),
levels AS (
    SELECT SUM(delta) OVER (ORDER BY t ROWS UNBOUNDED PRECEDING) AS level FROM buckets
)
SELECT
    COUNT(*) AS total_sessions,
    COALESCE(SUM(CASE WHEN endTs IS NULL THEN 1 ELSE 0 END), 0) AS active_sessions,
    COALESCE(SUM(adminAssisted), 0) AS admin_assisted_count,
    COALESCE(SUM(totalTokens), 0) AS total_tokens,
    COALESCE(MAX(maxRespTime), 0) AS max_response_ms,
    COALESCE(SUM(CASE WHEN avgRespTime > 0 THEN avgRespTime ELSE 0 END), 0) AS response_sum,
    COALESCE(SUM(CASE WHEN avgRespTime > 0 THEN 1 ELSE 0 END), 0) AS response_count,
    (SELECT COALESCE(MAX(level), 0) FROM levels) AS max_concurrent,
    (SELECT COALESCE(AVG(level), 0.0) FROM levels) AS avg_concurrent,
    (SELECT COUNT(*) FROM (
        SELECT 1 FROM sessions WHERE ts >= ?1 AND ts <= ?2 LIMIT ?4
    )) AS matched
FROM scanned
"#;

/// SQLite-backed implementation of `MetricsRepository`.
pub struct SqliteMetricsAggregator {
    pool: DatabasePool,
    retry: RetryExecutor,
    timeouts: TimeoutConfig,
    max_scan: u32,
    shutdown: CancellationToken,
}

impl SqliteMetricsAggregator {
    pub fn new(pool: DatabasePool, config: &StorageConfig) -> Self {
        Self {
            pool,
            retry: RetryExecutor::new(config.retry.clone()),
            timeouts: config.timeouts.clone(),
            max_scan: config.metrics.max_scan_documents.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }
}

/// Internal row type for the aggregate result.
struct MetricsRow {
    total_sessions: i64,
    active_sessions: i64,
    admin_assisted_count: i64,
    total_tokens: i64,
    max_response_ms: i64,
    response_sum: i64,
    response_count: i64,
    max_concurrent: i64,
    avg_concurrent: f64,
    /// Sessions in the window, counted up to one past the scan cap.
    matched: i64,
}

impl MetricsRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            total_sessions: row.try_get("total_sessions")?,
            active_sessions: row.try_get("active_sessions")?,
            admin_assisted_count: row.try_get("admin_assisted_count")?,
            total_tokens: row.try_get("total_tokens")?,
            max_response_ms: row.try_get("max_response_ms")?,
            response_sum: row.try_get("response_sum")?,
            response_count: row.try_get("response_count")?,
            max_concurrent: row.try_get("max_concurrent")?,
            avg_concurrent: row.try_get("avg_concurrent")?,
            matched: row.try_get("matched")?,
        })
    }

    fn into_metrics(self, max_scan: u32) -> Metrics {
        let avg_response_ms = if self.response_count > 0 {
            self.response_sum / self.response_count
        } else {
            0
        };

        Metrics {
            total_sessions: self.total_sessions.max(0) as u64,
            active_sessions: self.active_sessions.max(0) as u64,
            admin_assisted_count: self.admin_assisted_count.max(0) as u64,
            total_tokens: self.total_tokens.max(0) as u64,
            avg_response_ms,
            max_response_ms: self.max_response_ms,
            max_concurrent: self.max_concurrent.max(0) as u64,
            avg_concurrent: self.avg_concurrent,
            truncated: self.matched > i64::from(max_scan),
        }
    }
}

impl MetricsRepository for SqliteMetricsAggregator {
    async fn session_metrics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Metrics, StorageError> {
        validate_time_range(from, to)?;

        let ctx = OperationContext::with_timeout(&self.shutdown, self.timeouts.metrics());
        let pool = &self.pool;
        let (from_s, to_s) = (format_datetime(&from), format_datetime(&to));
        let (from_s, to_s, max_scan) = (&from_s, &to_s, self.max_scan);

        let row = self
            .retry
            .run_classified(&ctx, "session_metrics", is_retryable, move || async move {
                sqlx::query(METRICS_SQL)
                    .bind(from_s)
                    .bind(to_s)
                    .bind(i64::from(max_scan))
                    .bind(i64::from(max_scan) + 1)
                    .fetch_one(&pool.reader)
                    .await
                    .map_err(store_error)
            })
            .await
            .map_err(from_retry)?;

        let metrics = MetricsRow::from_row(&row)
            .map_err(store_error)?
            .into_metrics(self.max_scan);

        if metrics.truncated {
            warn!(
                max_scan = self.max_scan,
                %from,
                %to,
                "metrics scan hit the document cap, figures cover a sample"
            );
        }
        debug!(total = metrics.total_sessions, "computed session metrics");
        Ok(metrics)
    }

    async fn token_usage(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64, StorageError> {
        validate_time_range(from, to)?;

        let ctx = OperationContext::with_timeout(&self.shutdown, self.timeouts.default_timeout());
        let pool = &self.pool;
        let (from_s, to_s) = (format_datetime(&from), format_datetime(&to));
        let (from_s, to_s) = (&from_s, &to_s);

        let (total,): (i64,) = self
            .retry
            .run_classified(&ctx, "token_usage", is_retryable, move || async move {
                sqlx::query_as(
                    "SELECT COALESCE(SUM(totalTokens), 0) FROM sessions WHERE ts >= ? AND ts <= ?",
                )
                .bind(from_s)
                .bind(to_s)
                .fetch_one(&pool.reader)
                .await
                .map_err(store_error)
            })
            .await
            .map_err(from_retry)?;

        Ok(total.max(0) as u64)
    }
}
