//! Object keys for snapshot uploads.

use crate::owner::{is_valid_token, OwnerId};
use crate::{CloudVaultError, Result};
use serde::Serialize;
use std::fmt;

const KEY_ROOT: &str = "vaults";
const KEY_SUFFIX: &str = ".enc";

/// A validated `vaults/<ownerId>/<snapshotId>.enc` object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct BackupKey {
    raw: String,
}

impl BackupKey {
    /// Derive the key for a new snapshot of `owner`.
    pub fn for_snapshot(owner: &OwnerId, snapshot_id: &str) -> Result<Self> {
        if !is_valid_token(snapshot_id) {
            return Err(CloudVaultError::InvalidInput(
                "snapshotId must match [a-zA-Z0-9._:-]+".to_string(),
            ));
        }
        Ok(Self {
            raw: format!("{}/{}/{}{}", KEY_ROOT, owner, snapshot_id, KEY_SUFFIX),
        })
    }

    /// Parse a caller-supplied key and check it lives under `owner`.
    ///
    /// A key outside the owner's prefix is `Forbidden` whether or not it
    /// exists; a key inside the prefix with bad syntax is `InvalidInput`.
    pub fn parse_owned(raw: &str, owner: &OwnerId) -> Result<Self> {
        let prefix = format!("{}/{}/", KEY_ROOT, owner);
        let rest = raw.strip_prefix(&prefix).ok_or(CloudVaultError::Forbidden)?;
        let snapshot_id = rest
            .strip_suffix(KEY_SUFFIX)
            .ok_or_else(|| CloudVaultError::InvalidInput("Invalid backup key".to_string()))?;
        Self::for_snapshot(owner, snapshot_id)
    }

    /// Parse a key with no ownership context (object store side).
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || CloudVaultError::InvalidInput("Invalid backup key".to_string());
        let rest = raw
            .strip_prefix(KEY_ROOT)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(invalid)?;
        let (owner, file) = rest.split_once('/').ok_or_else(invalid)?;
        let owner = OwnerId::new(owner).map_err(|_| invalid())?;
        let snapshot_id = file.strip_suffix(KEY_SUFFIX).ok_or_else(invalid)?;
        Self::for_snapshot(&owner, snapshot_id)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<BackupKey> for String {
    fn from(key: BackupKey) -> Self {
        key.raw
    }
}

impl fmt::Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
