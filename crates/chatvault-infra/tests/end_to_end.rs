//! Full session lifecycle against a real SQLite database with encryption on.

use std::sync::Arc;

use chatvault_core::repository::{MetricsRepository, SessionRepository};
use chatvault_core::session::{SessionHandle, share};
use chatvault_infra::crypto::codec::EncryptionCodec;
use chatvault_infra::sqlite::metrics::SqliteMetricsAggregator;
use chatvault_infra::sqlite::pool::DatabasePool;
use chatvault_infra::sqlite::session::SqliteSessionStore;
use chatvault_types::config::StorageConfig;
use chatvault_types::session::{Message, Sender, Session};
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("e2e.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = DatabasePool::new(&url).await.unwrap();
    std::mem::forget(dir);
    pool
}

#[tokio::test]
async fn session_lifecycle_with_encryption() {
    let pool = test_pool().await;
    let config = StorageConfig::default();
    let key: Vec<u8> = (0..32u8).collect();
    let codec = Arc::new(EncryptionCodec::try_new(&key).unwrap());
    let store = SqliteSessionStore::new(pool.clone(), codec, &config);
    let metrics = SqliteMetricsAggregator::new(pool.clone(), &config);

    store.ensure_indexes().await.unwrap();

    let start = Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap();
    let id = Uuid::now_v7().to_string();
    let session = share(Session::new(id.clone(), "user-42", start));
    store.create_session(&session).await.unwrap();

    let contents = ["How do I reset my password?", "Open Settings > Security.", "Thanks!"];
    let senders = [Sender::User, Sender::Ai, Sender::User];
    for (i, (content, sender)) in contents.iter().zip(senders).enumerate() {
        let msg = Message::new(sender, *content, start + Duration::seconds(30 * (i as i64 + 1)));
        store.add_message(&id, &msg).await.unwrap();
        // Keep the live copy in step, as a session manager would.
        SessionHandle::write(&session).messages.push(msg);
    }

    let end = start + Duration::minutes(10);
    store.end_session(&id, end).await.unwrap();

    let loaded = store.get_session(&id).await.unwrap();
    assert_eq!(loaded.messages.len(), 3);
    for (msg, expected) in loaded.messages.iter().zip(contents) {
        assert_eq!(msg.content, expected);
    }
    assert_eq!(loaded.end_time, Some(end));
    assert!(!loaded.is_active());

    let (dur,): (i64,) = sqlx::query_as(r#"SELECT dur FROM sessions WHERE "_id" = ?"#)
        .bind(&id)
        .fetch_one(&pool.reader)
        .await
        .unwrap();
    assert_eq!(dur, 600);

    // Stored ciphertext never contains the plaintext.
    let (raw,): (String,) = sqlx::query_as(r#"SELECT msgs FROM sessions WHERE "_id" = ?"#)
        .bind(&id)
        .fetch_one(&pool.reader)
        .await
        .unwrap();
    for content in contents {
        assert!(!raw.contains(content));
    }

    let listed = store.list_user_sessions("user-42", 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message_count, 3);

    let summary = metrics
        .session_metrics(start - Duration::hours(1), start + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(summary.total_sessions, 1);
    assert_eq!(summary.active_sessions, 0);

    assert!(store.load_active_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn plaintext_rows_remain_readable_after_enabling_encryption() {
    let pool = test_pool().await;
    let config = StorageConfig::default();
    let start = Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap();

    let plain = SqliteSessionStore::new(pool.clone(), Arc::new(EncryptionCodec::disabled()), &config);
    plain
        .create_session(&share(Session::new("legacy", "user-1", start)))
        .await
        .unwrap();
    plain
        .add_message("legacy", &Message::new(Sender::User, "written in the clear", start))
        .await
        .unwrap();

    let key = [9u8; 16];
    let encrypted = SqliteSessionStore::new(
        pool,
        Arc::new(EncryptionCodec::try_new(&key).unwrap()),
        &config,
    );
    encrypted
        .add_message("legacy", &Message::new(Sender::Ai, "written encrypted", start))
        .await
        .unwrap();

    let loaded = encrypted.get_session("legacy").await.unwrap();
    let contents: Vec<&str> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["written in the clear", "written encrypted"]);
}
