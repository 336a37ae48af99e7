//! CloudVault Core Library
//!
//! Encrypted cloud synchronization and backup for a client-held vault:
//! the envelope codec, the optimistic-concurrency vault sync protocol,
//! the multipart backup pipeline and the device pairing handshake.
//! Storage is reached only through the traits in [`storage`].

pub mod backup;
#[cfg(feature = "client")]
pub mod client;
pub mod crypto;
pub mod owner;
pub mod pairing;
pub mod storage;
pub mod sync;

pub use backup::{BackupConfig, BackupKey, BackupPipeline, UploadPlan};
pub use crypto::{decrypt_payload, encrypt_payload, CryptoError, EncryptedEnvelope, KdfChoice};
pub use owner::OwnerId;
pub use pairing::{DeviceType, PairingConfig, PairingService, PairingStatus};
pub use storage::{BackendError, LocalObjectStore, ObjectStore, PairingStore, SqliteStore, VaultStore};
pub use sync::VaultSync;

use thiserror::Error;

/// Result type for CloudVault operations
pub type Result<T> = std::result::Result<T, CloudVaultError>;

/// General error type for CloudVault operations.
///
/// Variants follow the request-scoped taxonomy the relay maps onto HTTP
/// status codes: validation, authorization, concurrency and backend.
#[derive(Error, Debug)]
pub enum CloudVaultError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Gone(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Relay request failed: {0}")]
    Transport(String),

    #[error("Object store error: {0}")]
    Backend(#[from] BackendError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl From<rusqlite::Error> for CloudVaultError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
