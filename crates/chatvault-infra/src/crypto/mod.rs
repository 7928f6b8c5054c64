//! Cryptographic operations for ChatVault.
//!
//! - `codec`: AES-GCM encryption of message content at rest

pub mod codec;
