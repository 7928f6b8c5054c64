//! Repository trait definitions for session persistence and usage metrics.
//!
//! Implementations live in chatvault-infra (e.g., `SqliteSessionStore`).
//! Uses native async fn in traits (RPITIT, Rust 2024 edition).

use chatvault_types::error::StorageError;
use chatvault_types::listing::{SessionListOptions, SessionMetadata};
use chatvault_types::metrics::Metrics;
use chatvault_types::session::{Message, Session};
use chrono::{DateTime, Utc};

use crate::session::SessionHandle;

/// CRUD and listing operations over persisted sessions.
///
/// The message list is only ever grown through `add_message`; `update_session`
/// never rewrites it, so metadata updates cannot clobber concurrent appends.
pub trait SessionRepository: Send + Sync {
    /// Insert a new session document. A duplicate id is a permanent failure.
    fn create_session<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Update every persisted field except the message list.
    fn update_session<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Load a session with decrypted messages. Missing ids yield `NotFound`.
    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Session, StorageError>> + Send;

    /// Append a message and bump the last-activity timestamp atomically.
    fn add_message(
        &self,
        session_id: &str,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Record the end of a session and its duration.
    fn end_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;

    /// Sessions for one user, most recent first. `limit` of 0 means the default.
    fn list_user_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<SessionMetadata>, StorageError>> + Send;

    /// Sessions across all users, most recent first.
    fn list_all_sessions(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<SessionMetadata>, StorageError>> + Send;

    /// Filtered, sorted, paginated listing.
    fn list_sessions(
        &self,
        options: &SessionListOptions,
    ) -> impl std::future::Future<Output = Result<Vec<SessionMetadata>, StorageError>> + Send;

    /// Full sessions that have not ended, for rehydrating live state on start-up.
    fn load_active_sessions(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Session>, StorageError>> + Send;

    /// Create the indexes listing and filtering rely on.
    fn ensure_indexes(
        &self,
    ) -> impl std::future::Future<Output = Result<(), StorageError>> + Send;
}

/// Time-ranged usage statistics computed inside the store.
pub trait MetricsRepository: Send + Sync {
    /// Aggregate metrics for sessions started within `[from, to]`.
    fn session_metrics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Metrics, StorageError>> + Send;

    /// Total tokens used by sessions started within `[from, to]`.
    fn token_usage(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, StorageError>> + Send;
}

/// Reject a time window whose end precedes its start.
pub fn validate_time_range(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<(), StorageError> {
    if to < from {
        return Err(StorageError::InvalidTimeRange);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_validate_time_range() {
        let now = Utc::now();
        assert!(validate_time_range(now, now).is_ok());
        assert!(validate_time_range(now, now + Duration::hours(1)).is_ok());
        assert!(matches!(
            validate_time_range(now, now - Duration::seconds(1)),
            Err(StorageError::InvalidTimeRange)
        ));
    }
}
