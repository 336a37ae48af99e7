//! Account identifiers handed to the core by the external auth provider.

use crate::{CloudVaultError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest accepted path token (owner ids, snapshot ids).
pub const MAX_TOKEN_LEN: usize = 128;

/// Check a path token against `[a-zA-Z0-9._:-]+`.
///
/// Tokens end up inside object keys, so anything that could introduce a
/// separator or traversal segment is rejected.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_TOKEN_LEN
        && token != "."
        && token != ".."
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'-'))
}

/// Authenticated account id. Every storage row and object key is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !is_valid_token(&id) {
            return Err(CloudVaultError::InvalidInput("Invalid owner id".to_string()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = CloudVaultError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
