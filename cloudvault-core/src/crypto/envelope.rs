//! Self-describing encrypted envelope.
//!
//! An envelope carries everything a reader needs besides the passphrase:
//!
//! ```json
//! {
//!   "version": 1,
//!   "kdf": "pbkdf2",
//!   "kdfParams": { "iterations": 600000, "hash": "sha256", "dkLen": 32 },
//!   "cipher": "aes-256-gcm",
//!   "salt": "<base64>", "iv": "<base64>", "tag": "<base64>",
//!   "ciphertext": "<base64>"
//! }
//! ```
//!
//! The plaintext is the UTF-8 JSON serialization of the payload.

use crate::crypto::cipher::{self, SealedBox, IV_LEN, TAG_LEN};
use crate::crypto::kdf::{KdfChoice, KdfParams};
use crate::crypto::{CryptoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const ENVELOPE_VERSION: u32 = 1;
pub const CIPHER_AES_256_GCM: &str = "aes-256-gcm";
pub const SALT_LEN: usize = 16;

/// Largest envelope, in serialized JSON bytes, the relay accepts.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub kdf: String,
    pub kdf_params: KdfParams,
    pub cipher: String,
    pub salt: String,
    pub iv: String,
    pub tag: String,
    pub ciphertext: String,
}

impl EncryptedEnvelope {
    /// Structural validation without the passphrase.
    ///
    /// Checks the version, cipher, KDF name and parameter bounds, and that
    /// all four binary fields are non-empty. Returns the resolved KDF.
    pub fn validate_shape(&self) -> Result<KdfChoice> {
        if self.version != ENVELOPE_VERSION {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.cipher != CIPHER_AES_256_GCM {
            return Err(CryptoError::MalformedEnvelope(format!(
                "cipher must be {}",
                CIPHER_AES_256_GCM
            )));
        }
        for (name, value) in [
            ("salt", &self.salt),
            ("iv", &self.iv),
            ("tag", &self.tag),
            ("ciphertext", &self.ciphertext),
        ] {
            if value.is_empty() {
                return Err(CryptoError::MalformedEnvelope(format!(
                    "{} must be a non-empty string",
                    name
                )));
            }
        }
        KdfChoice::from_envelope(&self.kdf, &self.kdf_params)
    }

    /// Length of the canonical JSON encoding.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX)
    }

    fn sealed_box(&self) -> Result<SealedBox> {
        let iv: [u8; IV_LEN] = decode_field(&self.iv)?
            .try_into()
            .map_err(|_| CryptoError::InvalidEnvelope)?;
        let tag: [u8; TAG_LEN] = decode_field(&self.tag)?
            .try_into()
            .map_err(|_| CryptoError::InvalidEnvelope)?;
        let ciphertext = decode_field(&self.ciphertext)?;
        Ok(SealedBox {
            iv,
            ciphertext,
            tag,
        })
    }
}

fn decode_field(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|_| CryptoError::InvalidEnvelope)
}

/// Encrypt any serializable payload into an envelope.
pub fn encrypt_payload<T: Serialize + ?Sized>(
    payload: &T,
    passphrase: &[u8],
    kdf: &KdfChoice,
) -> Result<EncryptedEnvelope> {
    let plaintext = zeroize::Zeroizing::new(
        serde_json::to_vec(payload)
            .map_err(|e| CryptoError::EncryptionFailed(format!("Serialize payload: {}", e)))?,
    );

    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let key = kdf.derive_key(passphrase, &salt)?;
    let sealed = cipher::seal(&key, &plaintext)?;

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        kdf: kdf.name().to_string(),
        kdf_params: kdf.params(),
        cipher: CIPHER_AES_256_GCM.to_string(),
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(sealed.iv),
        tag: STANDARD.encode(sealed.tag),
        ciphertext: STANDARD.encode(&sealed.ciphertext),
    })
}

/// Decrypt an envelope back into its payload.
///
/// Parameters are validated before the key is derived. Every failure
/// is reported as [`CryptoError::InvalidEnvelope`].
pub fn decrypt_payload<T: DeserializeOwned>(
    envelope: &EncryptedEnvelope,
    passphrase: &[u8],
) -> Result<T> {
    let kdf = envelope
        .validate_shape()
        .map_err(|_| CryptoError::InvalidEnvelope)?;

    let salt = decode_field(&envelope.salt)?;
    if salt.len() != SALT_LEN {
        return Err(CryptoError::InvalidEnvelope);
    }
    let sealed = envelope.sealed_box()?;

    let key = kdf
        .derive_key(passphrase, &salt)
        .map_err(|_| CryptoError::InvalidEnvelope)?;
    let plaintext = zeroize::Zeroizing::new(cipher::open(&key, &sealed)?);

    serde_json::from_slice(&plaintext).map_err(|_| CryptoError::InvalidEnvelope)
}
