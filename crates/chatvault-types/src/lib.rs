//! Shared domain types for chatvault.
//!
//! Sessions and messages, their persisted document shape, listing options,
//! usage metrics, storage configuration and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod document;
pub mod error;
pub mod listing;
pub mod metrics;
pub mod session;
