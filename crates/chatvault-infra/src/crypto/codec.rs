//! AES-GCM encryption of message content at rest.
//!
//! `EncryptionCodec` encrypts message text with AES-128/192/256-GCM (chosen by
//! key length) and a fresh random 96-bit nonce per call.
//!
//! Encrypted format: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`
//!
//! An empty key disables encryption: both directions become the identity so
//! callers never need to know whether encryption is on.
//!
//! SECURITY: Error types never contain plaintext or key material, and every
//! authentication failure is reported as the same `DecryptionFailed`.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chatvault_types::error::CryptoError;

/// Nonce size for AES-GCM (96 bits / 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended by AES-GCM (128 bits / 16 bytes).
pub const TAG_SIZE: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Key-schedule-expanded cipher, one variant per AES key size.
enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    fn from_key(key: &[u8]) -> Result<Self, CryptoError> {
        let invalid = |_| CryptoError::InvalidKeySize(key.len());
        match key.len() {
            16 => Ok(Cipher::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            24 => Ok(Cipher::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            32 => Ok(Cipher::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(invalid)?,
            ))),
            other => Err(CryptoError::InvalidKeySize(other)),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        // The nonce type is identical for all three variants (U12).
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = match self {
            Cipher::Aes128(c) => c.encrypt(&nonce, plaintext),
            Cipher::Aes192(c) => c.encrypt(&nonce, plaintext),
            Cipher::Aes256(c) => c.encrypt(&nonce, plaintext),
        }
        .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Cipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            Cipher::Aes192(c) => c.decrypt(nonce, ciphertext),
            Cipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::DecryptionFailed)
    }
}

enum State {
    /// No key configured; encryption is the identity.
    Disabled,
    Ready(Cipher),
    /// A key of unsupported length; every operation fails.
    Misconfigured(usize),
}

/// Symmetric encryption for message content.
///
/// Immutable after construction and safe to share across tasks
/// (`Arc<EncryptionCodec>`) without locking.
pub struct EncryptionCodec {
    state: State,
}

impl EncryptionCodec {
    /// Build a codec, deferring key-size errors to the first encrypt/decrypt.
    pub fn new(key: &[u8]) -> Self {
        let state = if key.is_empty() {
            State::Disabled
        } else {
            match Cipher::from_key(key) {
                Ok(cipher) => State::Ready(cipher),
                Err(_) => State::Misconfigured(key.len()),
            }
        };
        Self { state }
    }

    /// Build a codec, rejecting an unsupported key length immediately.
    pub fn try_new(key: &[u8]) -> Result<Self, CryptoError> {
        let codec = Self::new(key);
        if let State::Misconfigured(len) = codec.state {
            return Err(CryptoError::InvalidKeySize(len));
        }
        Ok(codec)
    }

    /// A codec with encryption turned off.
    pub fn disabled() -> Self {
        Self {
            state: State::Disabled,
        }
    }

    /// Whether a valid key is configured.
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Encrypt `plaintext` into `base64(nonce || ciphertext || tag)`.
    ///
    /// Each call draws a fresh nonce, so encrypting the same plaintext twice
    /// always produces different output.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        match &self.state {
            State::Disabled => Ok(plaintext.to_string()),
            State::Misconfigured(len) => Err(CryptoError::InvalidKeySize(*len)),
            State::Ready(cipher) => {
                let sealed = cipher.seal(plaintext.as_bytes())?;
                Ok(STANDARD.encode(sealed))
            }
        }
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let cipher = match &self.state {
            State::Disabled => return Ok(encoded.to_string()),
            State::Misconfigured(len) => return Err(CryptoError::InvalidKeySize(*len)),
            State::Ready(cipher) => cipher,
        };

        let data = STANDARD.decode(encoded).map_err(|_| CryptoError::Decode)?;
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::CiphertextTooShort);
        }

        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = cipher.open(nonce, ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl std::fmt::Debug for EncryptionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            State::Disabled => "disabled",
            State::Ready(_) => "ready",
            State::Misconfigured(_) => "misconfigured",
        };
        f.debug_struct("EncryptionCodec").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_key(len: usize) -> Vec<u8> {
        // Deterministic key for testing only
        (0..len).map(|i| i as u8).collect()
    }

    fn codec(len: usize) -> EncryptionCodec {
        EncryptionCodec::try_new(&test_key(len)).unwrap()
    }

    #[test]
    fn test_roundtrip_all_key_sizes() {
        let samples = [
            String::new(),
            "hello world".to_string(),
            "héllo wörld 你好 🌍".to_string(),
            "\u{0}\u{1}\u{7f} binary-ish \u{fffd}".to_string(),
            "x".repeat(1 << 20),
        ];

        for len in [16, 24, 32] {
            let codec = codec(len);
            for s in &samples {
                let encrypted = codec.encrypt(s).unwrap();
                assert_eq!(&codec.decrypt(&encrypted).unwrap(), s);
            }
        }
    }

    #[test]
    fn test_wire_format_is_nonce_ciphertext_tag() {
        let codec = codec(32);
        let plaintext = "twelve bytes";
        let encrypted = codec.encrypt(plaintext).unwrap();

        let raw = STANDARD.decode(&encrypted).unwrap();
        assert_eq!(raw.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn test_random_nonce_produces_different_ciphertexts() {
        let codec = codec(32);
        let outputs: HashSet<String> = (0..10)
            .map(|_| codec.encrypt("same plaintext").unwrap())
            .collect();
        assert_eq!(outputs.len(), 10);

        for out in &outputs {
            assert_eq!(codec.decrypt(out).unwrap(), "same plaintext");
        }
    }

    #[test]
    fn test_different_keys_produce_different_output() {
        let a = codec(32);
        let mut other = test_key(32);
        other[0] = 0xFF;
        let b = EncryptionCodec::try_new(&other).unwrap();

        let from_a = a.encrypt("secret").unwrap();
        let from_b = b.encrypt("secret").unwrap();
        assert_ne!(from_a, from_b);

        assert_eq!(b.decrypt(&from_a), Err(CryptoError::DecryptionFailed));
        assert_eq!(a.decrypt(&from_b), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_invalid_key_sizes_fail_encryption() {
        for len in [1, 8, 15, 17, 23, 25, 31, 33, 64] {
            let codec = EncryptionCodec::new(&test_key(len));
            assert_eq!(
                codec.encrypt("data"),
                Err(CryptoError::InvalidKeySize(len)),
                "key length {len} should be rejected"
            );
            assert!(!codec.is_enabled());
        }
    }

    #[test]
    fn test_try_new_rejects_invalid_key_eagerly() {
        assert!(matches!(
            EncryptionCodec::try_new(&test_key(20)),
            Err(CryptoError::InvalidKeySize(20))
        ));
        assert!(EncryptionCodec::try_new(&test_key(16)).is_ok());
        assert!(EncryptionCodec::try_new(&[]).is_ok());
    }

    #[test]
    fn test_empty_key_is_identity() {
        let codec = EncryptionCodec::new(&[]);
        assert!(!codec.is_enabled());
        for s in ["", "plain", "bm90IGJhc2U2NA==", "你好"] {
            assert_eq!(codec.encrypt(s).unwrap(), s);
            assert_eq!(codec.decrypt(s).unwrap(), s);
        }
    }

    #[test]
    fn test_tampering_is_detected() {
        let codec = codec(32);
        let encrypted = codec.encrypt("tamper with me").unwrap();
        let raw = STANDARD.decode(&encrypted).unwrap();

        // Flip one bit in the nonce, the body, and the tag.
        for idx in [0, NONCE_SIZE, raw.len() - 1] {
            let mut tampered = raw.clone();
            tampered[idx] ^= 0x01;
            let result = codec.decrypt(&STANDARD.encode(&tampered));
            assert_eq!(result, Err(CryptoError::DecryptionFailed), "byte {idx}");
        }
    }

    #[test]
    fn test_truncated_tag_fails_generically() {
        let codec = codec(32);
        let encrypted = codec.encrypt("truncate me").unwrap();
        let raw = STANDARD.decode(&encrypted).unwrap();

        let truncated = STANDARD.encode(&raw[..raw.len() - 4]);
        assert_eq!(codec.decrypt(&truncated), Err(CryptoError::DecryptionFailed));

        // Exactly a nonce and nothing else is not "too short", just invalid.
        let nonce_only = STANDARD.encode(&raw[..NONCE_SIZE]);
        assert_eq!(codec.decrypt(&nonce_only), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn test_ciphertext_too_short() {
        let codec = codec(32);
        let short = STANDARD.encode([0u8; 5]);
        assert_eq!(codec.decrypt(&short), Err(CryptoError::CiphertextTooShort));
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let codec = codec(32);
        assert_eq!(codec.decrypt("not base64 !!!"), Err(CryptoError::Decode));
    }

    #[test]
    fn test_codec_is_shareable_across_threads() {
        let codec = std::sync::Arc::new(codec(32));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let codec = std::sync::Arc::clone(&codec);
                std::thread::spawn(move || {
                    let msg = format!("message {i}");
                    let enc = codec.encrypt(&msg).unwrap();
                    assert_eq!(codec.decrypt(&enc).unwrap(), msg);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_debug_does_not_expose_key() {
        let debug = format!("{:?}", codec(16));
        assert!(debug.contains("ready"));
        assert!(!debug.contains("0, 1, 2"));
    }
}
