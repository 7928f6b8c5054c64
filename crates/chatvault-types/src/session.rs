//! In-memory chat session and message types.
//!
//! A `Session` is owned by the surrounding application and mutated in place
//! while a conversation is running. Storage code only ever sees it through a
//! lock (see `chatvault_core::session::SessionHandle`).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
    Admin,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Ai => write!(f, "ai"),
            Sender::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "ai" => Ok(Sender::Ai),
            "admin" => Ok(Sender::Admin),
            other => Err(format!("invalid message sender: '{other}'")),
        }
    }
}

/// A single message within a session.
///
/// `content` is always plaintext in memory; encryption happens at the
/// storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    pub file_id: Option<String>,
    pub file_url: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Message {
    /// Create a plain text message with no file attachment or metadata.
    pub fn new(sender: Sender, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            timestamp,
            sender,
            file_id: None,
            file_url: None,
            metadata: None,
        }
    }
}

/// A conversation between a user and the assistant.
///
/// `id` is immutable once the session has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub model_id: String,
    pub messages: Vec<Message>,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub help_requested: bool,
    pub admin_assisted: bool,
    pub assisting_admin_id: Option<String>,
    pub assisting_admin_name: Option<String>,
    pub total_tokens: u64,
    /// Per-response latencies observed while the session was live.
    pub response_times: Vec<Duration>,
}

impl Session {
    /// Create a fresh, active session with no messages.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: String::new(),
            model_id: String::new(),
            messages: Vec::new(),
            start_time,
            last_activity: start_time,
            end_time: None,
            help_requested: false,
            admin_assisted: false,
            assisting_admin_id: None,
            assisting_admin_name: None,
            total_tokens: 0,
            response_times: Vec::new(),
        }
    }

    /// A session is active until an end time has been recorded.
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_roundtrip() {
        for sender in [Sender::User, Sender::Ai, Sender::Admin] {
            let s = sender.to_string();
            let parsed: Sender = s.parse().unwrap();
            assert_eq!(sender, parsed);
        }
    }

    #[test]
    fn test_sender_serde_lowercase() {
        let json = serde_json::to_string(&Sender::Ai).unwrap();
        assert_eq!(json, "\"ai\"");
        assert!("robot".parse::<Sender>().is_err());
    }

    #[test]
    fn test_session_active_is_derived_from_end_time() {
        let mut session = Session::new("s-1", "u-1", Utc::now());
        assert!(session.is_active());

        session.end_time = Some(Utc::now());
        assert!(!session.is_active());
    }

    #[test]
    fn test_new_session_starts_empty() {
        let start = Utc::now();
        let session = Session::new("s-1", "u-1", start);
        assert!(session.messages.is_empty());
        assert!(session.response_times.is_empty());
        assert_eq!(session.last_activity, start);
        assert_eq!(session.total_tokens, 0);
    }
}
