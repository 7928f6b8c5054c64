use thiserror::Error;

/// Errors from message encryption and decryption.
///
/// IMPORTANT: These errors never include plaintext, key material, or
/// ciphertext in their Display/Debug output. Every authentication failure
/// maps to the same `DecryptionFailed` so callers cannot tell a bad tag from
/// a wrong key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid cipher key size: {0} bytes (must be 16, 24, or 32)")]
    InvalidKeySize(usize),

    #[error("failed to decode ciphertext")]
    Decode,

    #[error("ciphertext too short")]
    CiphertextTooShort,

    #[error("failed to decrypt")]
    DecryptionFailed,

    #[error("failed to encrypt")]
    EncryptionFailed,
}

/// Errors from session storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid session: {0}")]
    InvalidSession(String),

    #[error("session ID cannot be empty")]
    InvalidSessionId,

    #[error("user ID cannot be empty")]
    InvalidUserId,

    #[error("session not found in database")]
    NotFound,

    #[error("session '{0}' already exists")]
    DuplicateSession(String),

    #[error("end time must be after start time")]
    InvalidTimeRange,

    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("operation failed after {attempts} attempts: {message}")]
    RetryExhausted { attempts: u32, message: String },

    #[error("{operation} cancelled during retry: {reason}")]
    Cancelled { operation: String, reason: String },

    #[error("store error: {0}")]
    Store(String),
}
