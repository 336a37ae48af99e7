//! Vault sync wire types and the stored snapshot row.

use crate::crypto::EncryptedEnvelope;
use crate::owner::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single authoritative snapshot of an owner's vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub owner_id: OwnerId,
    pub vault_name: Option<String>,
    pub envelope: EncryptedEnvelope,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(VaultRecord),
    Existing(VaultRecord),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitVaultRequest {
    pub vault_name: String,
    pub envelope: EncryptedEnvelope,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushVaultRequest {
    pub envelope: EncryptedEnvelope,
    pub if_match_version: u64,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultVersionResponse {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullVaultResponse {
    pub envelope: EncryptedEnvelope,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&VaultRecord> for VaultVersionResponse {
    fn from(record: &VaultRecord) -> Self {
        Self {
            version: record.version,
            updated_at: record.updated_at,
        }
    }
}

impl From<VaultRecord> for PullVaultResponse {
    fn from(record: VaultRecord) -> Self {
        Self {
            envelope: record.envelope,
            version: record.version,
            updated_at: record.updated_at,
        }
    }
}
