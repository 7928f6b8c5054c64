//! Persisted session shape.
//!
//! Field names are an abbreviated wire vocabulary shared with every reader of
//! the `sessions` collection. Renaming any of them is a breaking schema change.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::Sender;

/// Wire names of the persisted session fields.
pub mod fields {
    pub const ID: &str = "_id";
    pub const USER_ID: &str = "uid";
    pub const NAME: &str = "nm";
    pub const MODEL_ID: &str = "modelId";
    pub const MESSAGES: &str = "msgs";
    pub const START_TIME: &str = "ts";
    pub const END_TIME: &str = "endTs";
    pub const DURATION: &str = "dur";
    pub const ADMIN_ASSISTED: &str = "adminAssisted";
    pub const ASSISTING_ADMIN_ID: &str = "assistingAdminId";
    pub const ASSISTING_ADMIN_NAME: &str = "assistingAdminName";
    pub const HELP_REQUESTED: &str = "helpRequested";
    pub const TOTAL_TOKENS: &str = "totalTokens";
    pub const MAX_RESPONSE_TIME: &str = "maxRespTime";
    pub const AVG_RESPONSE_TIME: &str = "avgRespTime";
    pub const LAST_ACTIVITY: &str = "lastActivity";
}

/// A message as stored inside a session document.
///
/// `content` holds ciphertext when an encryption key is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDocument {
    pub content: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    #[serde(rename = "fileId", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(rename = "fileUrl", default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(rename = "meta", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// A session as stored in the document store.
///
/// Adds derived fields the in-memory session does not carry: `dur` in
/// seconds and `maxRespTime` / `avgRespTime` in milliseconds. Raw latency
/// samples are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "uid")]
    pub user_id: String,
    #[serde(rename = "nm")]
    pub name: String,
    #[serde(rename = "modelId")]
    pub model_id: String,
    #[serde(rename = "msgs", default)]
    pub messages: Vec<MessageDocument>,
    #[serde(rename = "ts")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "endTs", default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(rename = "dur")]
    pub duration_secs: i64,
    #[serde(rename = "adminAssisted")]
    pub admin_assisted: bool,
    #[serde(rename = "assistingAdminId", default, skip_serializing_if = "Option::is_none")]
    pub assisting_admin_id: Option<String>,
    #[serde(rename = "assistingAdminName", default, skip_serializing_if = "Option::is_none")]
    pub assisting_admin_name: Option<String>,
    #[serde(rename = "helpRequested")]
    pub help_requested: bool,
    #[serde(rename = "totalTokens")]
    pub total_tokens: u64,
    #[serde(rename = "maxRespTime")]
    pub max_response_ms: i64,
    #[serde(rename = "avgRespTime")]
    pub avg_response_ms: i64,
    #[serde(rename = "lastActivity", default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}
