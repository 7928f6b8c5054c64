//! Conversion between live sessions and their persisted document shape.
//!
//! `to_document` snapshots the session under its read lock, releases the
//! lock, then derives the persisted-only fields (`dur`, `maxRespTime`,
//! `avgRespTime`) and encrypts message content.
//!
//! `from_document` is the inverse, with two deliberate losses:
//! - message content that fails to decrypt is returned as stored (data
//!   written before encryption was enabled, or under a rotated key);
//! - response-time samples come back as at most one synthetic sample equal
//!   to the stored average.

use std::sync::Arc;
use std::time::Duration;

use chatvault_core::session::SessionHandle;
use chatvault_types::document::{MessageDocument, SessionDocument};
use chatvault_types::error::CryptoError;
use chatvault_types::session::{Message, Session};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::crypto::codec::EncryptionCodec;

/// Maps sessions to documents and back, encrypting message content.
#[derive(Debug, Clone)]
pub struct SessionMapper {
    codec: Arc<EncryptionCodec>,
}

impl SessionMapper {
    pub fn new(codec: Arc<EncryptionCodec>) -> Self {
        Self { codec }
    }

    pub fn codec(&self) -> &EncryptionCodec {
        &self.codec
    }

    /// Build the persisted document for `session` as of now.
    pub fn to_document<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
    ) -> Result<SessionDocument, CryptoError> {
        self.to_document_at(session, Utc::now())
    }

    /// Build the persisted document, measuring an active session's duration
    /// up to `now`.
    pub fn to_document_at<S: SessionHandle + ?Sized>(
        &self,
        session: &S,
        now: DateTime<Utc>,
    ) -> Result<SessionDocument, CryptoError> {
        // Guard is dropped at the end of this statement.
        let snapshot = session.snapshot();

        let (max_response_ms, avg_response_ms) = response_stats(&snapshot.response_times);
        let duration_secs = duration_secs(
            snapshot.start_time,
            snapshot.end_time.unwrap_or(now),
        );

        let messages = snapshot
            .messages
            .iter()
            .map(|m| self.message_to_document(m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SessionDocument {
            id: snapshot.id,
            user_id: snapshot.user_id,
            name: snapshot.name,
            model_id: snapshot.model_id,
            messages,
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            duration_secs,
            admin_assisted: snapshot.admin_assisted,
            assisting_admin_id: snapshot.assisting_admin_id,
            assisting_admin_name: snapshot.assisting_admin_name,
            help_requested: snapshot.help_requested,
            total_tokens: snapshot.total_tokens,
            max_response_ms,
            avg_response_ms,
            last_activity: Some(snapshot.last_activity),
        })
    }

    /// Encrypt a single message for storage.
    pub fn message_to_document(&self, message: &Message) -> Result<MessageDocument, CryptoError> {
        Ok(MessageDocument {
            content: self.codec.encrypt(&message.content)?,
            timestamp: message.timestamp,
            sender: message.sender,
            file_id: message.file_id.clone(),
            file_url: message.file_url.clone(),
            metadata: message.metadata.clone(),
        })
    }

    /// Rebuild a session from its persisted document.
    pub fn from_document(&self, doc: SessionDocument) -> Session {
        let mut fallbacks = 0usize;
        let messages = doc
            .messages
            .into_iter()
            .map(|m| {
                let content = match self.codec.decrypt(&m.content) {
                    Ok(plaintext) => plaintext,
                    Err(_) => {
                        fallbacks += 1;
                        m.content
                    }
                };
                Message {
                    content,
                    timestamp: m.timestamp,
                    sender: m.sender,
                    file_id: m.file_id,
                    file_url: m.file_url,
                    metadata: m.metadata,
                }
            })
            .collect();

        if fallbacks > 0 {
            warn!(
                session_id = %doc.id,
                fallbacks,
                "message content failed to decrypt, returning stored value"
            );
        }

        let response_times = if doc.max_response_ms > 0 && doc.avg_response_ms > 0 {
            vec![Duration::from_millis(doc.avg_response_ms as u64)]
        } else {
            Vec::new()
        };

        Session {
            id: doc.id,
            user_id: doc.user_id,
            name: doc.name,
            model_id: doc.model_id,
            messages,
            start_time: doc.start_time,
            last_activity: doc.last_activity.unwrap_or(doc.start_time),
            end_time: doc.end_time,
            help_requested: doc.help_requested,
            admin_assisted: doc.admin_assisted,
            assisting_admin_id: doc.assisting_admin_id,
            assisting_admin_name: doc.assisting_admin_name,
            total_tokens: doc.total_tokens,
            response_times,
        }
    }
}

/// Whole seconds from `start` to `end`, never negative.
pub fn duration_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}

/// `(max, truncated mean)` of the samples in milliseconds.
fn response_stats(samples: &[Duration]) -> (i64, i64) {
    if samples.is_empty() {
        return (0, 0);
    }
    let max = samples.iter().max().copied().unwrap_or_default();
    let total: Duration = samples.iter().sum();
    let avg = total / samples.len() as u32;
    (max.as_millis() as i64, avg.as_millis() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatvault_core::session::share;
    use chatvault_types::session::Sender;
    use chrono::TimeZone;

    fn key() -> Vec<u8> {
        (0..32).map(|i| i as u8).collect()
    }

    fn mapper() -> SessionMapper {
        SessionMapper::new(Arc::new(EncryptionCodec::try_new(&key()).unwrap()))
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn session_with_messages(n: usize) -> Session {
        let mut s = Session::new("sess-1", "user-1", start());
        s.name = "Billing".to_string();
        s.model_id = "gpt-4".to_string();
        for i in 0..n {
            s.messages.push(Message::new(
                if i % 2 == 0 { Sender::User } else { Sender::Ai },
                format!("message {i}"),
                start() + chrono::Duration::seconds(i as i64),
            ));
        }
        s
    }

    #[test]
    fn test_response_stats() {
        assert_eq!(response_stats(&[]), (0, 0));
        let samples = [
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(301),
        ];
        // mean is 200.333.. ms, truncated
        assert_eq!(response_stats(&samples), (301, 200));
    }

    #[test]
    fn test_duration_of_ended_session() {
        let mapper = mapper();
        let mut s = session_with_messages(0);
        s.end_time = Some(start() + chrono::Duration::minutes(10));

        let doc = mapper.to_document(&share(s)).unwrap();
        assert_eq!(doc.duration_secs, 600);
    }

    #[test]
    fn test_duration_of_active_session_uses_now() {
        let mapper = mapper();
        let shared = share(session_with_messages(0));
        let now = start() + chrono::Duration::seconds(90);

        let doc = mapper.to_document_at(&shared, now).unwrap();
        assert_eq!(doc.duration_secs, 90);
        assert!(doc.end_time.is_none());
    }

    #[test]
    fn test_duration_is_never_negative() {
        assert_eq!(duration_secs(start(), start() - chrono::Duration::hours(1)), 0);
    }

    #[test]
    fn test_message_content_is_encrypted() {
        let mapper = mapper();
        let doc = mapper.to_document(&share(session_with_messages(3))).unwrap();

        assert_eq!(doc.messages.len(), 3);
        for (i, m) in doc.messages.iter().enumerate() {
            assert_ne!(m.content, format!("message {i}"));
            assert_eq!(mapper.codec().decrypt(&m.content).unwrap(), format!("message {i}"));
        }
    }

    #[test]
    fn test_document_roundtrip_preserves_fields() {
        let mapper = mapper();
        let mut s = session_with_messages(2);
        s.admin_assisted = true;
        s.help_requested = true;
        s.assisting_admin_id = Some("admin-7".to_string());
        s.assisting_admin_name = Some("Ada".to_string());
        s.total_tokens = 1234;
        s.last_activity = start() + chrono::Duration::seconds(30);

        let doc = mapper.to_document(&share(s.clone())).unwrap();
        let back = mapper.from_document(doc);

        assert_eq!(back.id, s.id);
        assert_eq!(back.user_id, s.user_id);
        assert_eq!(back.name, s.name);
        assert_eq!(back.model_id, s.model_id);
        assert_eq!(back.messages, s.messages);
        assert_eq!(back.start_time, s.start_time);
        assert_eq!(back.last_activity, s.last_activity);
        assert_eq!(back.total_tokens, 1234);
        assert_eq!(back.assisting_admin_name.as_deref(), Some("Ada"));
        assert!(back.admin_assisted && back.help_requested);
        assert!(back.is_active());
    }

    #[test]
    fn test_response_times_reconstruction_is_lossy() {
        let mapper = mapper();
        let mut s = session_with_messages(0);
        s.response_times = vec![Duration::from_millis(100), Duration::from_millis(300)];

        let doc = mapper.to_document(&share(s)).unwrap();
        assert_eq!(doc.max_response_ms, 300);
        assert_eq!(doc.avg_response_ms, 200);

        let back = mapper.from_document(doc);
        assert_eq!(back.response_times, vec![Duration::from_millis(200)]);
    }

    #[test]
    fn test_no_samples_reconstructs_empty() {
        let mapper = mapper();
        let doc = mapper.to_document(&share(session_with_messages(0))).unwrap();
        assert!(mapper.from_document(doc).response_times.is_empty());
    }

    #[test]
    fn test_missing_last_activity_falls_back_to_start() {
        let mapper = mapper();
        let mut doc = mapper.to_document(&share(session_with_messages(0))).unwrap();
        doc.last_activity = None;
        assert_eq!(mapper.from_document(doc).last_activity, start());
    }

    #[test]
    fn test_undecryptable_content_falls_back_to_stored_value() {
        let mapper = mapper();
        let mut doc = mapper.to_document(&share(session_with_messages(2))).unwrap();
        doc.messages[0].content = "written before encryption".to_string();

        let back = mapper.from_document(doc);
        assert_eq!(back.messages[0].content, "written before encryption");
        assert_eq!(back.messages[1].content, "message 1");
    }

    #[test]
    fn test_rotated_key_falls_back_instead_of_failing() {
        let old = mapper();
        let doc = old.to_document(&share(session_with_messages(1))).unwrap();
        let stored = doc.messages[0].content.clone();

        let mut rotated_key = key();
        rotated_key[31] ^= 0xFF;
        let new = SessionMapper::new(Arc::new(EncryptionCodec::try_new(&rotated_key).unwrap()));

        let back = new.from_document(doc);
        assert_eq!(back.messages[0].content, stored);
    }

    #[test]
    fn test_misconfigured_codec_fails_to_document() {
        let mapper = SessionMapper::new(Arc::new(EncryptionCodec::new(&[1u8; 20])));
        let result = mapper.to_document(&share(session_with_messages(1)));
        assert_eq!(result.unwrap_err(), CryptoError::InvalidKeySize(20));
    }

    #[test]
    fn test_snapshot_is_consistent_under_concurrent_writes() {
        let mapper = mapper();
        let shared = share(session_with_messages(0));

        // Each write appends one message and bumps the token count by one
        // under a single write lock, so a consistent snapshot always has
        // messages.len() == total_tokens.
        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let mut guard = SessionHandle::write(&shared);
                    guard
                        .messages
                        .push(Message::new(Sender::User, format!("m{i}"), Utc::now()));
                    guard.total_tokens += 1;
                }
            })
        };

        for _ in 0..200 {
            let doc = mapper.to_document(&shared).unwrap();
            assert_eq!(doc.messages.len() as u64, doc.total_tokens);
        }
        writer.join().unwrap();

        let doc = mapper.to_document(&shared).unwrap();
        assert_eq!(doc.messages.len(), 500);
    }
}
