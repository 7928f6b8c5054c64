//! Aggregated usage statistics for a time window.

use serde::{Deserialize, Serialize};

/// Session usage metrics for sessions started inside a time window.
///
/// Response times are in milliseconds. `avg_response_ms` is the mean of the
/// per-session averages of sessions that recorded any response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_sessions: u64,
    pub active_sessions: u64,
    pub admin_assisted_count: u64,
    pub total_tokens: u64,
    pub avg_response_ms: i64,
    pub max_response_ms: i64,
    /// Peak number of overlapping sessions within the scanned sample.
    pub max_concurrent: u64,
    /// Mean number of overlapping sessions across start/end events of the sample.
    pub avg_concurrent: f64,
    /// Whether the scan hit the document cap, making the figures a sample.
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default_is_zeroed() {
        let m = Metrics::default();
        assert_eq!(m.total_sessions, 0);
        assert_eq!(m.max_concurrent, 0);
        assert_eq!(m.avg_concurrent, 0.0);
        assert!(!m.truncated);
    }
}
