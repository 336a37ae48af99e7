//! Storage collaborators.
//!
//! The core never talks to a database or object store directly. It needs
//! three narrow capabilities:
//! - a row store with insert-if-absent and compare-and-swap updates
//!   ([`VaultStore`], [`PairingStore`])
//! - an S3-style multipart API ([`ObjectStore`])
//!
//! Any backend offering those satisfies the protocols. [`SqliteStore`] and
//! [`LocalObjectStore`] are the self-hosted implementations.

pub mod local;
pub mod sqlite;

pub use local::{LocalObjectStore, PartUploadQuery};
pub use sqlite::SqliteStore;

use crate::backup::{BackupKey, CompletedPart, CompletedUpload, PresignedPart};
use crate::crypto::EncryptedEnvelope;
use crate::owner::OwnerId;
use crate::pairing::models::{Device, PairingRequest, PairingStatus};
use crate::sync::models::{InsertOutcome, VaultRecord};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by an object store backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No such upload")]
    NoSuchUpload,

    #[error("Invalid part {0}")]
    InvalidPart(u32),

    #[error("Presigned request is invalid or expired")]
    InvalidSignature,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt upload state: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Insert a version-1 row unless the owner already has one.
    async fn insert_vault_if_absent(
        &self,
        owner: &OwnerId,
        vault_name: Option<&str>,
        envelope: &EncryptedEnvelope,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome>;

    async fn fetch_vault(&self, owner: &OwnerId) -> Result<Option<VaultRecord>>;

    /// Replace the envelope and bump the version, guarded by
    /// `version = expected_version`. Returns `None` when the guard matched
    /// no row.
    async fn update_vault_if_version(
        &self,
        owner: &OwnerId,
        expected_version: u64,
        envelope: &EncryptedEnvelope,
        now: DateTime<Utc>,
    ) -> Result<Option<VaultRecord>>;
}

/// Outcome of [`PairingStore::insert_pairing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingInsert {
    Inserted,
    CodeTaken,
    /// The owner already has `max_active` pending, unexpired requests.
    LimitReached,
}

#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Insert a pending request unless the code is taken or the owner already
    /// holds `max_active` pending requests unexpired at `created_at`. The
    /// count and the insert are one atomic step.
    async fn insert_pairing(&self, request: &PairingRequest, max_active: u64)
        -> Result<PairingInsert>;

    async fn find_pairing(&self, owner: &OwnerId, code: &str) -> Result<Option<PairingRequest>>;

    /// Conditional status flip `from -> to`. Returns whether a row changed.
    async fn transition_pairing(
        &self,
        owner: &OwnerId,
        code: &str,
        from: PairingStatus,
        to: PairingStatus,
    ) -> Result<bool>;

    /// Insert `device` and flip the pending, unexpired request to claimed in
    /// one transaction. Returns `false` (and stores nothing) when the request
    /// was no longer claimable.
    async fn claim_pairing(
        &self,
        owner: &OwnerId,
        code: &str,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn list_devices(&self, owner: &OwnerId) -> Result<Vec<Device>>;

    async fn delete_device(&self, owner: &OwnerId, device_id: Uuid) -> Result<bool>;

    /// Look up an active device by token hash and record it as seen.
    async fn touch_device(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Device>>;

    /// Delete terminal or expired requests created before `cutoff`.
    async fn prune_pairings(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn create_multipart_upload(
        &self,
        key: &BackupKey,
        content_type: &str,
    ) -> std::result::Result<String, BackendError>;

    /// Presign one batch of part numbers.
    async fn presign_upload_parts(
        &self,
        key: &BackupKey,
        upload_id: &str,
        part_numbers: &[u32],
        expires_in_secs: u64,
    ) -> std::result::Result<Vec<PresignedPart>, BackendError>;

    async fn complete_multipart_upload(
        &self,
        key: &BackupKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> std::result::Result<CompletedUpload, BackendError>;

    async fn abort_multipart_upload(
        &self,
        key: &BackupKey,
        upload_id: &str,
    ) -> std::result::Result<(), BackendError>;
}
