//! AES-256-GCM encryption and decryption for envelope payloads.
//!
//! Uses AES-256-GCM with:
//! - 256-bit key
//! - 96-bit (12 byte) random IV, fresh for every encryption
//! - 128-bit authentication tag, kept apart from the ciphertext

use crate::crypto::{CryptoError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Ciphertext split into the parts recorded by an envelope.
#[derive(Debug, Clone)]
pub struct SealedBox {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` with a random IV.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<SealedBox> {
    if plaintext.is_empty() {
        return Err(CryptoError::EncryptionFailed(
            "Cannot encrypt empty data".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let iv: [u8; IV_LEN] = nonce.into();

    let mut ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;

    // aes-gcm appends the tag to the ciphertext
    if ciphertext.len() < TAG_LEN {
        return Err(CryptoError::EncryptionFailed(
            "Ciphertext too short - missing auth tag".to_string(),
        ));
    }
    let tag_start = ciphertext.len() - TAG_LEN;
    let tag: [u8; TAG_LEN] = ciphertext[tag_start..]
        .try_into()
        .map_err(|_| CryptoError::EncryptionFailed("Invalid auth tag length".to_string()))?;
    ciphertext.truncate(tag_start);

    Ok(SealedBox {
        iv,
        ciphertext,
        tag,
    })
}

/// Decrypt and authenticate a sealed box.
///
/// Any failure, including a tag mismatch, is reported as
/// [`CryptoError::InvalidEnvelope`].
pub fn open(key: &[u8; 32], sealed: &SealedBox) -> Result<Vec<u8>> {
    if sealed.ciphertext.is_empty() {
        return Err(CryptoError::InvalidEnvelope);
    }

    let cipher = Aes256Gcm::new(key.into());
    let nonce = Nonce::from(sealed.iv);

    let mut ciphertext_with_tag = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    ciphertext_with_tag.extend_from_slice(&sealed.ciphertext);
    ciphertext_with_tag.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(&nonce, ciphertext_with_tag.as_slice())
        .map_err(|_| CryptoError::InvalidEnvelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [3u8; 32];
        let sealed = seal(&key, b"Hello, World!").unwrap();
        assert_eq!(sealed.ciphertext.len(), 13);
        assert_eq!(open(&key, &sealed).unwrap(), b"Hello, World!".to_vec());
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let key = [3u8; 32];
        let a = seal(&key, b"Same data").unwrap();
        let b = seal(&key, b"Same data").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&[1u8; 32], b"Secret data").unwrap();
        assert!(matches!(
            open(&[2u8; 32], &sealed),
            Err(CryptoError::InvalidEnvelope)
        ));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = [1u8; 32];
        let mut sealed = seal(&key, b"Original data").unwrap();
        sealed.tag[0] ^= 0x01;
        assert!(open(&key, &sealed).is_err());
    }

    #[test]
    fn test_empty_data_fails() {
        let key = [1u8; 32];
        assert!(seal(&key, b"").is_err());
        let empty = SealedBox {
            iv: [0u8; IV_LEN],
            ciphertext: vec![],
            tag: [0u8; TAG_LEN],
        };
        assert!(open(&key, &empty).is_err());
    }
}
