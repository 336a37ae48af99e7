//! Whole-vault snapshot sync with optimistic concurrency.
//!
//! Each owner has exactly one server-side row holding the latest encrypted
//! envelope and a monotonically increasing version. Writers name the version
//! they started from (`ifMatchVersion`); the store applies the write only if
//! that is still the current version, so concurrent writers race on a single
//! conditional update and every loser gets a `409`.
//!
//! The server never sees plaintext. It checks the envelope shape and size
//! and nothing else.

pub mod models;

pub use models::{
    InitVaultRequest, InsertOutcome, PullVaultResponse, PushVaultRequest, VaultRecord,
    VaultVersionResponse,
};

use crate::crypto::{EncryptedEnvelope, MAX_ENVELOPE_BYTES};
use crate::owner::OwnerId;
use crate::storage::VaultStore;
use crate::{CloudVaultError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub const MAX_VAULT_NAME_LEN: usize = 128;

/// Check an envelope before it is stored.
///
/// Shape problems are reported in detail: without the passphrase they leak
/// nothing.
pub fn check_envelope(envelope: &EncryptedEnvelope) -> Result<()> {
    if envelope.encoded_len() > MAX_ENVELOPE_BYTES {
        return Err(CloudVaultError::PayloadTooLarge);
    }
    envelope
        .validate_shape()
        .map_err(|e| CloudVaultError::InvalidInput(format!("Invalid envelope: {}", e)))?;
    Ok(())
}

fn normalize_vault_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_VAULT_NAME_LEN {
        return Err(CloudVaultError::InvalidInput(format!(
            "vaultName must be 1-{} characters",
            MAX_VAULT_NAME_LEN
        )));
    }
    Ok(name)
}

/// Vault sync service over a [`VaultStore`].
pub struct VaultSync<S> {
    store: Arc<S>,
}

impl<S> Clone for VaultSync<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: VaultStore> VaultSync<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the owner's vault at version 1.
    ///
    /// Idempotent: when a vault already exists its version is returned and
    /// the stored envelope is left untouched.
    pub async fn init(
        &self,
        owner: &OwnerId,
        request: InitVaultRequest,
        now: DateTime<Utc>,
    ) -> Result<VaultVersionResponse> {
        let vault_name = normalize_vault_name(&request.vault_name)?;
        check_envelope(&request.envelope)?;

        match self
            .store
            .insert_vault_if_absent(owner, Some(vault_name), &request.envelope, now)
            .await?
        {
            InsertOutcome::Inserted(record) => {
                tracing::info!(owner = %owner, version = record.version, "Initialized cloud vault");
                Ok(VaultVersionResponse::from(&record))
            }
            InsertOutcome::Existing(record) => {
                tracing::debug!(owner = %owner, version = record.version, "Cloud vault already initialized");
                Ok(VaultVersionResponse::from(&record))
            }
        }
    }

    /// Replace the stored envelope if `if_match_version` is still current.
    pub async fn push(
        &self,
        owner: &OwnerId,
        request: PushVaultRequest,
        now: DateTime<Utc>,
    ) -> Result<VaultVersionResponse> {
        if request.if_match_version.checked_add(1) != Some(request.version) {
            return Err(CloudVaultError::InvalidInput(
                "version must equal ifMatchVersion + 1".to_string(),
            ));
        }
        check_envelope(&request.envelope)?;

        if request.if_match_version == 0 {
            return match self
                .store
                .insert_vault_if_absent(owner, None, &request.envelope, now)
                .await?
            {
                InsertOutcome::Inserted(record) => {
                    tracing::info!(owner = %owner, version = record.version, "Created cloud vault on first push");
                    Ok(VaultVersionResponse::from(&record))
                }
                InsertOutcome::Existing(record) => {
                    tracing::warn!(
                        owner = %owner,
                        current = record.version,
                        "First push lost to an existing vault"
                    );
                    Err(CloudVaultError::Conflict("Cloud vault already exists".to_string()))
                }
            };
        }

        match self
            .store
            .update_vault_if_version(owner, request.if_match_version, &request.envelope, now)
            .await?
        {
            Some(record) => {
                tracing::info!(
                    owner = %owner,
                    from = request.if_match_version,
                    to = record.version,
                    "Pushed cloud vault"
                );
                Ok(VaultVersionResponse::from(&record))
            }
            None => {
                tracing::warn!(
                    owner = %owner,
                    if_match_version = request.if_match_version,
                    "Cloud vault version conflict"
                );
                Err(CloudVaultError::Conflict("Version conflict".to_string()))
            }
        }
    }

    pub async fn pull(&self, owner: &OwnerId) -> Result<PullVaultResponse> {
        self.store
            .fetch_vault(owner)
            .await?
            .map(PullVaultResponse::from)
            .ok_or_else(|| CloudVaultError::NotFound("Cloud vault not found".to_string()))
    }
}
