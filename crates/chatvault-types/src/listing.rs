//! Listing projections and query options for persisted sessions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of sessions returned when the caller does not specify a limit.
pub const DEFAULT_SESSION_LIMIT: u32 = 100;
/// Hard ceiling on the number of sessions returned by a single listing.
pub const MAX_SESSION_LIMIT: u32 = 1000;

/// Summary of a persisted session without message bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Timestamp of the most recent message, or the start time for empty sessions.
    pub last_message_time: DateTime<Utc>,
    pub message_count: u32,
    pub admin_assisted: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_tokens: u64,
    pub max_response_ms: i64,
    pub avg_response_ms: i64,
}

/// Field a session listing can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortField {
    #[default]
    #[serde(rename = "ts")]
    StartTime,
    #[serde(rename = "endTs")]
    EndTime,
    #[serde(rename = "message_count")]
    MessageCount,
    #[serde(rename = "totalTokens")]
    TotalTokens,
    #[serde(rename = "uid")]
    UserId,
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortField::StartTime => write!(f, "ts"),
            SortField::EndTime => write!(f, "endTs"),
            SortField::MessageCount => write!(f, "message_count"),
            SortField::TotalTokens => write!(f, "totalTokens"),
            SortField::UserId => write!(f, "uid"),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ts" | "start_time" => Ok(SortField::StartTime),
            "endTs" | "end_time" => Ok(SortField::EndTime),
            "message_count" => Ok(SortField::MessageCount),
            "totalTokens" | "total_tokens" => Ok(SortField::TotalTokens),
            "uid" | "user_id" => Ok(SortField::UserId),
            other => Err(format!("invalid sort field: '{other}'")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "asc"),
            SortOrder::Desc => write!(f, "desc"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order: '{other}'")),
        }
    }
}

/// Filtering, sorting and pagination for session listings.
///
/// `None` on a tri-state filter means "don't filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListOptions {
    /// Requested page size. Zero means the default; values above the
    /// configured maximum are clamped.
    pub limit: u32,
    pub offset: u32,
    pub user_id: Option<String>,
    pub start_time_from: Option<DateTime<Utc>>,
    pub start_time_to: Option<DateTime<Utc>>,
    pub admin_assisted: Option<bool>,
    pub active: Option<bool>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl SessionListOptions {
    /// Page size after applying the default and the `max_limit` ceiling.
    pub fn effective_limit(&self, default_limit: u32, max_limit: u32) -> u32 {
        let limit = if self.limit == 0 {
            default_limit
        } else {
            self.limit
        };
        limit.min(max_limit).max(1)
    }
}

/// Client-side ordering by message count.
///
/// Listings delegate this ordering to the store; this comparator exists to
/// check store results in tests. The sort is stable, so sessions with equal
/// counts keep their relative order.
pub fn sort_by_message_count(sessions: &mut [SessionMetadata], order: SortOrder) {
    match order {
        SortOrder::Asc => sessions.sort_by_key(|s| s.message_count),
        SortOrder::Desc => sessions.sort_by(|a, b| b.message_count.cmp(&a.message_count)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(id: usize, count: u32) -> SessionMetadata {
        let now = Utc::now();
        SessionMetadata {
            id: format!("s-{id}"),
            user_id: "u".to_string(),
            name: String::new(),
            last_message_time: now,
            message_count: count,
            admin_assisted: false,
            start_time: now,
            end_time: None,
            total_tokens: 0,
            max_response_ms: 0,
            avg_response_ms: 0,
        }
    }

    #[test]
    fn test_effective_limit_defaults_and_clamps() {
        let mut opts = SessionListOptions::default();
        assert_eq!(opts.effective_limit(100, 1000), 100);

        opts.limit = 50;
        assert_eq!(opts.effective_limit(100, 1000), 50);

        opts.limit = 5000;
        assert_eq!(opts.effective_limit(100, 1000), 1000);
    }

    #[test]
    fn test_default_sort_is_start_time_desc() {
        let opts = SessionListOptions::default();
        assert_eq!(opts.sort_by, SortField::StartTime);
        assert_eq!(opts.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_sort_field_parse_wire_names() {
        assert_eq!("ts".parse::<SortField>().unwrap(), SortField::StartTime);
        assert_eq!("endTs".parse::<SortField>().unwrap(), SortField::EndTime);
        assert_eq!(
            "message_count".parse::<SortField>().unwrap(),
            SortField::MessageCount
        );
        assert_eq!(
            "totalTokens".parse::<SortField>().unwrap(),
            SortField::TotalTokens
        );
        assert_eq!("uid".parse::<SortField>().unwrap(), SortField::UserId);
        assert!("name".parse::<SortField>().is_err());
    }

    #[test]
    fn test_sort_by_message_count_large_inputs() {
        const N: usize = 10_000;

        let shapes: Vec<Vec<u32>> = vec![
            (0..N).map(|i| (i % 7) as u32).collect(),
            (0..N).map(|i| i as u32).collect(),
            (0..N).rev().map(|i| i as u32).collect(),
        ];

        for counts in shapes {
            let base: Vec<SessionMetadata> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| metadata(i, *c))
                .collect();

            for order in [SortOrder::Asc, SortOrder::Desc] {
                let mut sessions = base.clone();
                sort_by_message_count(&mut sessions, order);

                assert_eq!(sessions.len(), N);
                for pair in sessions.windows(2) {
                    match order {
                        SortOrder::Asc => {
                            assert!(pair[0].message_count <= pair[1].message_count)
                        }
                        SortOrder::Desc => {
                            assert!(pair[0].message_count >= pair[1].message_count)
                        }
                    }
                    // Stability: equal counts keep their original relative order.
                    if pair[0].message_count == pair[1].message_count {
                        let a: usize = pair[0].id[2..].parse().unwrap();
                        let b: usize = pair[1].id[2..].parse().unwrap();
                        assert!(a < b, "unstable order for equal counts");
                    }
                }
            }
        }
    }
}
