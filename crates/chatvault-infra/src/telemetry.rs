//! Session lifecycle counters emitted through the `metrics` facade.
//!
//! Nothing is recorded unless the host process installs a recorder; the
//! macros are no-ops otherwise.

use metrics::{decrement_gauge, increment_counter, increment_gauge};

pub const SESSIONS_CREATED_TOTAL: &str = "chatvault_sessions_created_total";
pub const SESSIONS_ENDED_TOTAL: &str = "chatvault_sessions_ended_total";
pub const ACTIVE_SESSIONS: &str = "chatvault_active_sessions";

/// A session was persisted.
pub fn record_session_created(active: bool) {
    increment_counter!(SESSIONS_CREATED_TOTAL);
    if active {
        increment_gauge!(ACTIVE_SESSIONS, 1.0);
    }
}

/// A session's end time was recorded for the first time.
pub fn record_session_ended() {
    increment_counter!(SESSIONS_ENDED_TOTAL);
    decrement_gauge!(ACTIVE_SESSIONS, 1.0);
}
