//! Cryptographic primitives for vault envelopes.
//!
//! This module provides:
//! - PBKDF2-HMAC and scrypt passphrase key derivation with bounded parameters
//! - AES-256-GCM encryption/decryption
//! - The self-describing JSON envelope exchanged with the relay

pub mod cipher;
pub mod envelope;
pub mod kdf;

pub use envelope::{
    decrypt_payload, encrypt_payload, EncryptedEnvelope, CIPHER_AES_256_GCM, ENVELOPE_VERSION,
    MAX_ENVELOPE_BYTES,
};
pub use kdf::{KdfChoice, KdfParams, Pbkdf2Hash};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("KDF parameters rejected: {0}")]
    KdfRejected(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Every decryption failure collapses into this variant. Telling a wrong
    /// passphrase apart from a tampered ciphertext would leak information.
    #[error("Vault is locked or the passphrase is invalid")]
    InvalidEnvelope,
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;
