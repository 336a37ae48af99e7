//! Passphrase key derivation for envelopes.
//!
//! Accepted functions and bounds:
//! - PBKDF2-HMAC-SHA256/SHA512: 300,000 to 2,000,000 iterations
//! - scrypt: N a power of two in 2^14..=2^17, r in 1..=16, p in 1..=4,
//!   at most 256 MB of working memory
//!
//! Output is always a 32-byte AES-256 key. Parameters read from an envelope
//! are checked against these bounds before any derivation runs, so a crafted
//! envelope can force neither a weak key nor an unbounded work factor.

use crate::crypto::{CryptoError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

/// Derived key length in bytes
pub const KEY_LEN: usize = 32;

pub const PBKDF2_MIN_ITERATIONS: u32 = 300_000;
pub const PBKDF2_MAX_ITERATIONS: u32 = 2_000_000;
pub const PBKDF2_DEFAULT_ITERATIONS: u32 = 600_000;

pub const SCRYPT_MIN_N: u64 = 1 << 14;
pub const SCRYPT_MAX_N: u64 = 1 << 17;
pub const SCRYPT_DEFAULT_N: u64 = 32_768;
pub const SCRYPT_MAX_R: u32 = 16;
pub const SCRYPT_MAX_P: u32 = 4;
const SCRYPT_MAX_MEMORY: u64 = 256 * 1024 * 1024;

pub const KDF_PBKDF2: &str = "pbkdf2";
pub const KDF_SCRYPT: &str = "scrypt";

/// KDF parameters as they appear in the envelope JSON.
///
/// PBKDF2 uses `iterations` + `hash`, scrypt uses `N`/`r`/`p`; both carry
/// `dkLen`. Fields belonging to the other function must be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    #[serde(rename = "N", default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<u32>,

    pub dk_len: u32,
}

/// Hash functions allowed for PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pbkdf2Hash {
    Sha256,
    Sha512,
}

impl Pbkdf2Hash {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// A validated key derivation function with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfChoice {
    Pbkdf2 { iterations: u32, hash: Pbkdf2Hash },
    Scrypt { log_n: u8, r: u32, p: u32 },
}

impl Default for KdfChoice {
    fn default() -> Self {
        Self::Pbkdf2 {
            iterations: PBKDF2_DEFAULT_ITERATIONS,
            hash: Pbkdf2Hash::Sha256,
        }
    }
}

impl KdfChoice {
    /// scrypt with N=32768, r=8, p=1.
    pub fn scrypt_default() -> Self {
        Self::Scrypt {
            log_n: SCRYPT_DEFAULT_N.trailing_zeros() as u8,
            r: 8,
            p: 1,
        }
    }

    /// Name recorded in the envelope's `kdf` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pbkdf2 { .. } => KDF_PBKDF2,
            Self::Scrypt { .. } => KDF_SCRYPT,
        }
    }

    /// Parameters recorded in the envelope's `kdfParams` field.
    pub fn params(&self) -> KdfParams {
        match *self {
            Self::Pbkdf2 { iterations, hash } => KdfParams {
                iterations: Some(iterations),
                hash: Some(hash.as_str().to_string()),
                n: None,
                r: None,
                p: None,
                dk_len: KEY_LEN as u32,
            },
            Self::Scrypt { log_n, r, p } => KdfParams {
                iterations: None,
                hash: None,
                n: Some(1u64 << log_n),
                r: Some(r),
                p: Some(p),
                dk_len: KEY_LEN as u32,
            },
        }
    }

    /// Resolve and bound-check the `kdf` / `kdfParams` pair of an envelope.
    pub fn from_envelope(kdf: &str, params: &KdfParams) -> Result<Self> {
        if params.dk_len as usize != KEY_LEN {
            return Err(CryptoError::KdfRejected(format!(
                "dkLen must be {}",
                KEY_LEN
            )));
        }

        let choice = match kdf {
            KDF_PBKDF2 => {
                if params.n.is_some() || params.r.is_some() || params.p.is_some() {
                    return Err(CryptoError::KdfRejected(
                        "scrypt parameters present on pbkdf2 envelope".to_string(),
                    ));
                }
                let iterations = params
                    .iterations
                    .ok_or_else(|| CryptoError::KdfRejected("missing iterations".to_string()))?;
                let hash = params
                    .hash
                    .as_deref()
                    .and_then(Pbkdf2Hash::parse)
                    .ok_or_else(|| CryptoError::KdfRejected("hash not allowed".to_string()))?;
                Self::Pbkdf2 { iterations, hash }
            }
            KDF_SCRYPT => {
                if params.iterations.is_some() || params.hash.is_some() {
                    return Err(CryptoError::KdfRejected(
                        "pbkdf2 parameters present on scrypt envelope".to_string(),
                    ));
                }
                let (n, r, p) = match (params.n, params.r, params.p) {
                    (Some(n), Some(r), Some(p)) => (n, r, p),
                    _ => {
                        return Err(CryptoError::KdfRejected(
                            "scrypt requires N, r and p".to_string(),
                        ))
                    }
                };
                if !n.is_power_of_two() {
                    return Err(CryptoError::KdfRejected(
                        "N must be a power of two".to_string(),
                    ));
                }
                Self::Scrypt {
                    log_n: n.trailing_zeros() as u8,
                    r,
                    p,
                }
            }
            other => {
                return Err(CryptoError::KdfRejected(format!(
                    "unsupported kdf '{}'",
                    other
                )))
            }
        };

        choice.validate()?;
        Ok(choice)
    }

    /// Verify that parameters are within the accepted ranges
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Pbkdf2 { iterations, .. } => {
                if !(PBKDF2_MIN_ITERATIONS..=PBKDF2_MAX_ITERATIONS).contains(&iterations) {
                    return Err(CryptoError::KdfRejected(format!(
                        "iterations must be within {}..={}",
                        PBKDF2_MIN_ITERATIONS, PBKDF2_MAX_ITERATIONS
                    )));
                }
            }
            Self::Scrypt { log_n, r, p } => {
                let n = 1u64.checked_shl(log_n as u32).unwrap_or(u64::MAX);
                if !(SCRYPT_MIN_N..=SCRYPT_MAX_N).contains(&n) {
                    return Err(CryptoError::KdfRejected(format!(
                        "N must be within {}..={}",
                        SCRYPT_MIN_N, SCRYPT_MAX_N
                    )));
                }
                if !(1..=SCRYPT_MAX_R).contains(&r) {
                    return Err(CryptoError::KdfRejected(format!(
                        "r must be within 1..={}",
                        SCRYPT_MAX_R
                    )));
                }
                if !(1..=SCRYPT_MAX_P).contains(&p) {
                    return Err(CryptoError::KdfRejected(format!(
                        "p must be within 1..={}",
                        SCRYPT_MAX_P
                    )));
                }
                if 128 * n * r as u64 > SCRYPT_MAX_MEMORY {
                    return Err(CryptoError::KdfRejected(
                        "scrypt memory cost too high".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Derive the 32-byte envelope key from a passphrase.
    ///
    /// The cost is deliberate: it is the work factor an offline attacker
    /// pays per guess.
    pub fn derive_key(&self, passphrase: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        self.validate()?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        match *self {
            Self::Pbkdf2 {
                iterations,
                hash: Pbkdf2Hash::Sha256,
            } => pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, iterations, &mut key[..]),
            Self::Pbkdf2 {
                iterations,
                hash: Pbkdf2Hash::Sha512,
            } => pbkdf2::pbkdf2_hmac::<Sha512>(passphrase, salt, iterations, &mut key[..]),
            Self::Scrypt { log_n, r, p } => {
                let params = scrypt::Params::new(log_n, r, p, KEY_LEN)
                    .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;
                scrypt::scrypt(passphrase, salt, &params, &mut key[..])
                    .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;
            }
        }

        Ok(key)
    }
}
