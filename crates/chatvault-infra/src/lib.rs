//! Infrastructure layer for ChatVault.
//!
//! Contains implementations of the repository traits defined in
//! `chatvault-core`: the SQLite session store and metrics aggregator, the
//! AES-GCM message codec, configuration loading and lifecycle counters.

pub mod config;
pub mod crypto;
pub mod sqlite;
pub mod telemetry;
