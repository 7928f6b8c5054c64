//! SQLite session store.
//!
//! Implements `SessionRepository` from `chatvault-core`. Follows the usual
//! repository layout: raw queries, private Row structs, reader pool for
//! SELECTs and the single-connection writer pool for mutations.
//!
//! Every operation runs under its own `OperationContext` (a child of the
//! store's shutdown token with a per-operation deadline) and goes through the
//! `RetryExecutor`. Concurrent writers to one session rely on atomic updates:
//! a field-scoped `SET` for metadata (one transaction with the conditional
//! end-time write), a JSON append for messages and a conditional
//! `UPDATE ... RETURNING` for ending.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chatvault_core::context::OperationContext;
use chatvault_core::repository::{SessionRepository, validate_time_range};
use chatvault_core::retry::RetryExecutor;
use chatvault_core::session::SessionHandle;
use chatvault_types::config::{ListingConfig, StorageConfig, TimeoutConfig};
use chatvault_types::document::{MessageDocument, SessionDocument, fields};
use chatvault_types::error::StorageError;
use chatvault_types::listing::{SessionListOptions, SessionMetadata, SortField, SortOrder};
use chatvault_types::session::{Message, Session};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::mapper::{SessionMapper, duration_secs};
use super::pool::DatabasePool;
use super::{format_datetime, from_retry, is_retryable, parse_datetime, store_error};
use crate::crypto::codec::EncryptionCodec;
use crate::telemetry;

/// Index names and definitions backing the listing and filter queries.
const INDEXES: &[(&str, &str)] = &[
    ("idx_user_id", "CREATE INDEX IF NOT EXISTS idx_user_id ON sessions (uid)"),
    (
        "idx_start_time",
        "CREATE INDEX IF NOT EXISTS idx_start_time ON sessions (ts DESC)",
    ),
    (
        "idx_admin_assisted",
        "CREATE INDEX IF NOT EXISTS idx_admin_assisted ON sessions (adminAssisted)",
    ),
    (
        "idx_user_start_time",
        "CREATE INDEX IF NOT EXISTS idx_user_start_time ON sessions (uid, ts DESC)",
    ),
];

/// Listing projection: everything but message bodies.
const METADATA_SELECT: &str = r#"SELECT "_id", uid, nm, ts, endTs, adminAssisted, totalTokens, maxRespTime, avgRespTime,
       json_array_length(msgs) AS message_count,
       COALESCE(json_extract(msgs, '$[#-1].ts'), ts) AS last_message_time
FROM sessions"#;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionStore {
    pool: DatabasePool,
    mapper: SessionMapper,
    retry: RetryExecutor,
    timeouts: TimeoutConfig,
    listing: ListingConfig,
    shutdown: CancellationToken,
}

impl SqliteSessionStore {
    /// Create a store over `pool`, encrypting message content with `codec`.
    pub fn new(pool: DatabasePool, codec: Arc<EncryptionCodec>, config: &StorageConfig) -> Self {
        Self {
            pool,
            mapper: SessionMapper::new(codec),
            retry: RetryExecutor::new(config.retry.clone()),
            timeouts: config.timeouts.clone(),
            listing: config.listing.clone(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Derive every operation context from `token` instead of a private one.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Cancel all in-flight and future operations on this store.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn mapper(&self) -> &SessionMapper {
        &self.mapper
    }

    fn context(&self, timeout: Duration) -> OperationContext {
        OperationContext::with_timeout(&self.shutdown, timeout)
    }

    async fn retrying<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        operation: &str,
        attempt: F,
    ) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        self.retry
            .run_classified(ctx, operation, is_retryable, attempt)
            .await
            .map_err(from_retry)
    }

    async fn query_metadata(
        &self,
        options: &SessionListOptions,
        timeout: Duration,
        operation: &str,
    ) -> Result<Vec<SessionMetadata>, StorageError> {
        if let (Some(from), Some(to)) = (options.start_time_from, options.start_time_to) {
            validate_time_range(from, to)?;
        }
        let limit = options.effective_limit(self.listing.default_limit, self.listing.max_limit);

        let ctx = self.context(timeout);
        let pool = &self.pool;
        let rows = self
            .retrying(&ctx, operation, move || async move {
                let mut query = list_query(options, limit);
                query
                    .build()
                    .fetch_all(&pool.reader)
                    .await
                    .map_err(store_error)
            })
            .await?;

        rows.iter()
            .map(|row| {
                MetadataRow::from_row(row)
                    .map_err(store_error)?
                    .into_metadata()
            })
            .collect()
    }

    /// Write every field of `doc` except `msgs`. Returns true when this
    /// update recorded the session's end time for the first time.
    ///
    /// An end time already recorded wins, along with the duration computed
    /// for it. `lastActivity` only moves forward, so a stale snapshot cannot
    /// undo the bump made by a concurrent `add_message`.
    async fn apply_update(&self, doc: &SessionDocument) -> Result<bool, StorageError> {
        let ctx = self.context(self.timeouts.default_timeout());
        let last_activity = doc.last_activity.as_ref().map(format_datetime);
        let end_time = doc.end_time.as_ref().map(format_datetime);
        let (pool, doc, last_activity, end_time) = (&self.pool, doc, &last_activity, &end_time);

        self.retrying(&ctx, "update_session", move || async move {
            let mut tx = pool.writer.begin().await.map_err(store_error)?;

            let updated = sqlx::query(
                r#"UPDATE sessions
                   SET uid = ?, nm = ?, modelId = ?, ts = ?,
                       dur = CASE WHEN endTs IS NULL THEN ? ELSE dur END,
                       adminAssisted = ?, assistingAdminId = ?, assistingAdminName = ?,
                       helpRequested = ?, totalTokens = ?, maxRespTime = ?, avgRespTime = ?,
                       lastActivity = CASE WHEN ? > COALESCE(lastActivity, '') THEN ? ELSE lastActivity END
                   WHERE "_id" = ?"#,
            )
            .bind(&doc.user_id)
            .bind(&doc.name)
            .bind(&doc.model_id)
            .bind(format_datetime(&doc.start_time))
            .bind(doc.duration_secs)
            .bind(doc.admin_assisted)
            .bind(&doc.assisting_admin_id)
            .bind(&doc.assisting_admin_name)
            .bind(doc.help_requested)
            .bind(doc.total_tokens as i64)
            .bind(doc.max_response_ms)
            .bind(doc.avg_response_ms)
            .bind(last_activity)
            .bind(last_activity)
            .bind(&doc.id)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?
            .rows_affected();

            if updated == 0 {
                return Err(StorageError::NotFound);
            }

            let mut newly_ended = false;
            if let Some(end_time) = end_time {
                let ended = sqlx::query(
                    r#"UPDATE sessions SET endTs = ? WHERE "_id" = ? AND endTs IS NULL"#,
                )
                .bind(end_time)
                .bind(&doc.id)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
                newly_ended = ended.rows_affected() > 0;
            }

            tx.commit().await.map_err(store_error)?;
            Ok::<_, StorageError>(newly_ended)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for a full session document.
struct SessionRow {
    id: String,
    user_id: String,
    name: String,
    model_id: String,
    messages: String,
    start_time: String,
    end_time: Option<String>,
    duration_secs: i64,
    admin_assisted: bool,
    assisting_admin_id: Option<String>,
    assisting_admin_name: Option<String>,
    help_requested: bool,
    total_tokens: i64,
    max_response_ms: i64,
    avg_response_ms: i64,
    last_activity: Option<String>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(fields::ID)?,
            user_id: row.try_get(fields::USER_ID)?,
            name: row.try_get(fields::NAME)?,
            model_id: row.try_get(fields::MODEL_ID)?,
            messages: row.try_get(fields::MESSAGES)?,
            start_time: row.try_get(fields::START_TIME)?,
            end_time: row.try_get(fields::END_TIME)?,
            duration_secs: row.try_get(fields::DURATION)?,
            admin_assisted: row.try_get(fields::ADMIN_ASSISTED)?,
            assisting_admin_id: row.try_get(fields::ASSISTING_ADMIN_ID)?,
            assisting_admin_name: row.try_get(fields::ASSISTING_ADMIN_NAME)?,
            help_requested: row.try_get(fields::HELP_REQUESTED)?,
            total_tokens: row.try_get(fields::TOTAL_TOKENS)?,
            max_response_ms: row.try_get(fields::MAX_RESPONSE_TIME)?,
            avg_response_ms: row.try_get(fields::AVG_RESPONSE_TIME)?,
            last_activity: row.try_get(fields::LAST_ACTIVITY)?,
        })
    }

    fn into_document(self) -> Result<SessionDocument, StorageError> {
        let messages: Vec<MessageDocument> = serde_json::from_str(&self.messages)
            .map_err(|e| StorageError::Store(format!("invalid messages JSON: {e}")))?;

        Ok(SessionDocument {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            model_id: self.model_id,
            messages,
            start_time: parse_datetime(&self.start_time)?,
            end_time: self.end_time.as_deref().map(parse_datetime).transpose()?,
            duration_secs: self.duration_secs,
            admin_assisted: self.admin_assisted,
            assisting_admin_id: self.assisting_admin_id,
            assisting_admin_name: self.assisting_admin_name,
            help_requested: self.help_requested,
            total_tokens: self.total_tokens.max(0) as u64,
            max_response_ms: self.max_response_ms,
            avg_response_ms: self.avg_response_ms,
            last_activity: self.last_activity.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

/// Internal row type for the listing projection.
struct MetadataRow {
    id: String,
    user_id: String,
    name: String,
    start_time: String,
    end_time: Option<String>,
    admin_assisted: bool,
    total_tokens: i64,
    max_response_ms: i64,
    avg_response_ms: i64,
    message_count: i64,
    last_message_time: String,
}

impl MetadataRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get(fields::ID)?,
            user_id: row.try_get(fields::USER_ID)?,
            name: row.try_get(fields::NAME)?,
            start_time: row.try_get(fields::START_TIME)?,
            end_time: row.try_get(fields::END_TIME)?,
            admin_assisted: row.try_get(fields::ADMIN_ASSISTED)?,
            total_tokens: row.try_get(fields::TOTAL_TOKENS)?,
            max_response_ms: row.try_get(fields::MAX_RESPONSE_TIME)?,
            avg_response_ms: row.try_get(fields::AVG_RESPONSE_TIME)?,
            message_count: row.try_get("message_count")?,
            last_message_time: row.try_get("last_message_time")?,
        })
    }

    fn into_metadata(self) -> Result<SessionMetadata, StorageError> {
        Ok(SessionMetadata {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            last_message_time: parse_datetime(&self.last_message_time)?,
            message_count: self.message_count.max(0) as u32,
            admin_assisted: self.admin_assisted,
            start_time: parse_datetime(&self.start_time)?,
            end_time: self.end_time.as_deref().map(parse_datetime).transpose()?,
            total_tokens: self.total_tokens.max(0) as u64,
            max_response_ms: self.max_response_ms,
            avg_response_ms: self.avg_response_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_document(doc: &SessionDocument) -> Result<(), StorageError> {
    if doc.id.is_empty() {
        return Err(StorageError::InvalidSessionId);
    }
    if let Some(end) = doc.end_time {
        if end < doc.start_time {
            return Err(StorageError::InvalidSession(
                "end time precedes start time".to_string(),
            ));
        }
    }
    Ok(())
}

fn encode_messages(messages: &[MessageDocument]) -> Result<String, StorageError> {
    serde_json::to_string(messages)
        .map_err(|e| StorageError::Store(format!("failed to encode messages: {e}")))
}

fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::StartTime => fields::START_TIME,
        SortField::EndTime => fields::END_TIME,
        SortField::MessageCount => "message_count",
        SortField::TotalTokens => fields::TOTAL_TOKENS,
        SortField::UserId => fields::USER_ID,
    }
}

fn list_query(options: &SessionListOptions, limit: u32) -> QueryBuilder<'static, Sqlite> {
    let mut query = QueryBuilder::new(METADATA_SELECT);
    query.push(" WHERE 1 = 1");

    if let Some(user_id) = &options.user_id {
        query.push(" AND uid = ").push_bind(user_id.clone());
    }
    if let Some(from) = &options.start_time_from {
        query.push(" AND ts >= ").push_bind(format_datetime(from));
    }
    if let Some(to) = &options.start_time_to {
        query.push(" AND ts <= ").push_bind(format_datetime(to));
    }
    if let Some(admin_assisted) = options.admin_assisted {
        query.push(" AND adminAssisted = ").push_bind(admin_assisted);
    }
    match options.active {
        Some(true) => {
            query.push(" AND endTs IS NULL");
        }
        Some(false) => {
            query.push(" AND endTs IS NOT NULL");
        }
        None => {}
    }

    let direction = match options.sort_order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    // `_id` breaks ties so pages never overlap.
    query.push(format!(
        " ORDER BY {} {direction}, \"_id\" ASC",
        sort_column(options.sort_by)
    ));
    query.push(" LIMIT ").push_bind(i64::from(limit));
    query.push(" OFFSET ").push_bind(i64::from(options.offset));
    query
}

// ---------------------------------------------------------------------------
// SessionRepository implementation
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteSessionStore {
    async fn create_session<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
    ) -> Result<(), StorageError> {
        let doc = self.mapper.to_document(session)?;
        validate_document(&doc)?;
        let messages = encode_messages(&doc.messages)?;

        let ctx = self.context(self.timeouts.default_timeout());
        let (pool, doc_ref, messages) = (&self.pool, &doc, &messages);
        self.retrying(&ctx, "create_session", move || async move {
            let result = sqlx::query(
                r#"INSERT INTO sessions ("_id", uid, nm, modelId, msgs, ts, endTs, dur, adminAssisted,
                       assistingAdminId, assistingAdminName, helpRequested, totalTokens, maxRespTime,
                       avgRespTime, lastActivity)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&doc_ref.id)
            .bind(&doc_ref.user_id)
            .bind(&doc_ref.name)
            .bind(&doc_ref.model_id)
            .bind(messages)
            .bind(format_datetime(&doc_ref.start_time))
            .bind(doc_ref.end_time.as_ref().map(format_datetime))
            .bind(doc_ref.duration_secs)
            .bind(doc_ref.admin_assisted)
            .bind(&doc_ref.assisting_admin_id)
            .bind(&doc_ref.assisting_admin_name)
            .bind(doc_ref.help_requested)
            .bind(doc_ref.total_tokens as i64)
            .bind(doc_ref.max_response_ms)
            .bind(doc_ref.avg_response_ms)
            .bind(doc_ref.last_activity.as_ref().map(format_datetime))
            .execute(&pool.writer)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                    Err(StorageError::DuplicateSession(doc_ref.id.clone()))
                }
                Err(e) => Err(store_error(e)),
            }
        })
        .await?;

        telemetry::record_session_created(doc.end_time.is_none());
        debug!(session_id = %doc.id, messages = doc.messages.len(), "created session");
        Ok(())
    }

    async fn update_session<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
    ) -> Result<(), StorageError> {
        let doc = self.mapper.to_document(session)?;
        validate_document(&doc)?;

        if self.apply_update(&doc).await? {
            telemetry::record_session_ended();
        }

        debug!(session_id = %doc.id, "updated session");
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Session, StorageError> {
        if session_id.is_empty() {
            return Err(StorageError::InvalidSessionId);
        }

        let ctx = self.context(self.timeouts.default_timeout());
        let pool = &self.pool;
        let row = self
            .retrying(&ctx, "get_session", move || async move {
                sqlx::query(r#"SELECT * FROM sessions WHERE "_id" = ?"#)
                    .bind(session_id)
                    .fetch_optional(&pool.reader)
                    .await
                    .map_err(store_error)
            })
            .await?
            .ok_or(StorageError::NotFound)?;

        let doc = SessionRow::from_row(&row)
            .map_err(store_error)?
            .into_document()?;
        Ok(self.mapper.from_document(doc))
    }

    async fn add_message(&self, session_id: &str, message: &Message) -> Result<(), StorageError> {
        if session_id.is_empty() {
            return Err(StorageError::InvalidSessionId);
        }

        let doc = self.mapper.message_to_document(message)?;
        let encoded = serde_json::to_string(&doc)
            .map_err(|e| StorageError::Store(format!("failed to encode message: {e}")))?;
        let last_activity = format_datetime(&Utc::now());

        let ctx = self.context(self.timeouts.message_add());
        let (pool, encoded, last_activity) = (&self.pool, &encoded, &last_activity);
        let rows_affected = self
            .retrying(&ctx, "add_message", move || async move {
                sqlx::query(
                    r#"UPDATE sessions
                       SET msgs = json_insert(msgs, '$[#]', json(?)), lastActivity = ?
                       WHERE "_id" = ?"#,
                )
                .bind(encoded)
                .bind(last_activity)
                .bind(session_id)
                .execute(&pool.writer)
                .await
                .map(|r| r.rows_affected())
                .map_err(store_error)
            })
            .await?;

        if rows_affected == 0 {
            return Err(StorageError::NotFound);
        }

        debug!(session_id, sender = %message.sender, "appended message");
        Ok(())
    }

    async fn end_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        if session_id.is_empty() {
            return Err(StorageError::InvalidSessionId);
        }

        let ctx = self.context(self.timeouts.session_end());
        let pool = &self.pool;
        let requested_end = format_datetime(&end_time);
        let requested_end = &requested_end;

        // Set the end time and read the start time in one statement. Only
        // the first call matches; later calls fall back to reading the
        // already recorded (and now immutable) end time.
        let (start, recorded_end, newly_ended) = self
            .retrying(&ctx, "end_session", move || async move {
                let ended = sqlx::query(
                    r#"UPDATE sessions SET endTs = ? WHERE "_id" = ? AND endTs IS NULL RETURNING ts"#,
                )
                .bind(requested_end)
                .bind(session_id)
                .fetch_optional(&pool.writer)
                .await
                .map_err(store_error)?;

                if let Some(row) = ended {
                    let ts: String = row.try_get("ts").map_err(store_error)?;
                    return Ok((ts, requested_end.clone(), true));
                }

                let existing = sqlx::query(r#"SELECT ts, endTs FROM sessions WHERE "_id" = ?"#)
                    .bind(session_id)
                    .fetch_optional(&pool.writer)
                    .await
                    .map_err(store_error)?
                    .ok_or(StorageError::NotFound)?;
                let ts: String = existing.try_get("ts").map_err(store_error)?;
                let end: Option<String> = existing.try_get("endTs").map_err(store_error)?;
                Ok::<_, StorageError>((ts, end.unwrap_or_else(|| requested_end.clone()), false))
            })
            .await?;

        if newly_ended {
            telemetry::record_session_ended();
        }

        let duration = duration_secs(parse_datetime(&start)?, parse_datetime(&recorded_end)?);

        // The end time is durable; duration bookkeeping is best effort.
        let result = self
            .retrying(&ctx, "end_session_duration", move || async move {
                sqlx::query(r#"UPDATE sessions SET dur = ? WHERE "_id" = ?"#)
                    .bind(duration)
                    .bind(session_id)
                    .execute(&pool.writer)
                    .await
                    .map(|_| ())
                    .map_err(store_error)
            })
            .await;

        if let Err(err) = result {
            warn!(session_id, duration, error = %err, "failed to record session duration");
        }

        debug!(session_id, duration, newly_ended, "ended session");
        Ok(())
    }

    async fn list_user_sessions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<SessionMetadata>, StorageError> {
        if user_id.is_empty() {
            return Err(StorageError::InvalidUserId);
        }

        let options = SessionListOptions {
            limit,
            user_id: Some(user_id.to_string()),
            ..Default::default()
        };
        self.query_metadata(&options, self.timeouts.default_timeout(), "list_user_sessions")
            .await
    }

    async fn list_all_sessions(&self, limit: u32) -> Result<Vec<SessionMetadata>, StorageError> {
        let options = SessionListOptions {
            limit,
            ..Default::default()
        };
        self.query_metadata(&options, self.timeouts.default_timeout(), "list_all_sessions")
            .await
    }

    async fn list_sessions(
        &self,
        options: &SessionListOptions,
    ) -> Result<Vec<SessionMetadata>, StorageError> {
        self.query_metadata(options, self.timeouts.metrics(), "list_sessions")
            .await
    }

    async fn load_active_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let ctx = self.context(self.timeouts.default_timeout());
        let pool = &self.pool;
        let limit = i64::from(self.listing.max_limit);
        let rows = self
            .retrying(&ctx, "load_active_sessions", move || async move {
                sqlx::query("SELECT * FROM sessions WHERE endTs IS NULL ORDER BY ts DESC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&pool.reader)
                    .await
                    .map_err(store_error)
            })
            .await?;

        rows.iter()
            .map(|row| {
                let doc = SessionRow::from_row(row)
                    .map_err(store_error)?
                    .into_document()?;
                Ok(self.mapper.from_document(doc))
            })
            .collect()
    }

    async fn ensure_indexes(&self) -> Result<(), StorageError> {
        let ctx = self.context(self.timeouts.index());
        let pool = &self.pool;
        self.retrying(&ctx, "ensure_indexes", move || async move {
            for (_, ddl) in INDEXES {
                sqlx::query(ddl)
                    .execute(&pool.writer)
                    .await
                    .map_err(store_error)?;
            }
            Ok::<_, StorageError>(())
        })
        .await?;

        let names: Vec<&str> = INDEXES.iter().map(|(name, _)| *name).collect();
        info!(indexes = ?names, "session indexes ensured");
        Ok(())
    }
}
