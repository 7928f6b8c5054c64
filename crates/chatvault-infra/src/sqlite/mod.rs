//! SQLite storage layer.
//!
//! Session and metrics repositories backed by SQLite with WAL mode and split
//! read/write connection pools. Each session is one row whose columns use
//! the document field vocabulary; messages live in a JSON array column.

pub mod mapper;
pub mod metrics;
pub mod pool;
pub mod session;

use chatvault_core::retry::{RetryError, is_transient};
use chatvault_types::error::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 so text ordering in SQL matches time ordering.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Store(format!("invalid datetime '{s}': {e}")))
}

pub(crate) fn store_error(err: sqlx::Error) -> StorageError {
    StorageError::Store(err.to_string())
}

/// Only raw store failures are worth another attempt; domain errors never are.
pub(crate) fn is_retryable(err: &StorageError) -> bool {
    matches!(err, StorageError::Store(message) if is_transient(message))
}

pub(crate) fn from_retry(err: RetryError<StorageError>) -> StorageError {
    match err {
        RetryError::Permanent(err) => err,
        RetryError::Exhausted {
            attempts,
            last_error,
        } => StorageError::RetryExhausted {
            attempts,
            message: last_error.to_string(),
        },
        RetryError::Cancelled {
            operation, reason, ..
        } => StorageError::Cancelled {
            operation,
            reason: reason.to_string(),
        },
    }
}
