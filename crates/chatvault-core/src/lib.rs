//! Business logic and repository trait definitions for chatvault.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, the lock capability storage needs from a live session,
//! and the retry policy wrapped around every store call. It depends only on
//! `chatvault-types` -- never on `chatvault-infra` or any database crate.

pub mod context;
pub mod repository;
pub mod retry;
pub mod session;
