//! Pairing codes and device tokens.

use crate::{CloudVaultError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

pub const PAIRING_CODE_PREFIX: &str = "PFY";

/// 30 symbols: no I, L, O, U, 0 or 1, so codes survive being read aloud.
pub const PAIRING_ALPHABET: &[u8; 30] = b"ABCDEFGHJKMNPQRSTVWXYZ23456789";

const GROUP_LEN: usize = 4;
const CODE_LEN: usize = PAIRING_CODE_PREFIX.len() + 2 * (GROUP_LEN + 1);
const DEVICE_TOKEN_BYTES: usize = 32;

/// Generate a random `PFY-XXXX-XXXX` code.
pub fn generate_pairing_code() -> String {
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(CODE_LEN);
    code.push_str(PAIRING_CODE_PREFIX);
    for _ in 0..2 {
        code.push('-');
        for _ in 0..GROUP_LEN {
            let idx = rng.gen_range(0..PAIRING_ALPHABET.len());
            code.push(PAIRING_ALPHABET[idx] as char);
        }
    }
    code
}

/// Trim and upper-case user input, then check the code format.
pub fn normalize_pairing_code(input: &str) -> Result<String> {
    let code = input.trim().to_ascii_uppercase();
    if !is_well_formed(&code) {
        return Err(CloudVaultError::InvalidInput(
            "Pairing code must look like PFY-XXXX-XXXX".to_string(),
        ));
    }
    Ok(code)
}

fn is_well_formed(code: &str) -> bool {
    let Some(rest) = code
        .strip_prefix(PAIRING_CODE_PREFIX)
        .and_then(|r| r.strip_prefix('-'))
    else {
        return false;
    };
    let Some((first, second)) = rest.split_once('-') else {
        return false;
    };
    [first, second].iter().all(|group| {
        group.len() == GROUP_LEN && group.bytes().all(|b| PAIRING_ALPHABET.contains(&b))
    })
}

/// Generate the long-lived device token handed out once on claim.
pub fn generate_device_token() -> String {
    let mut bytes = [0u8; DEVICE_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex SHA-256 of a device token. Only this hash is ever stored.
pub fn hash_device_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_code_format() {
        for _ in 0..200 {
            let code = generate_pairing_code();
            assert_eq!(code.len(), 13);
            assert!(code.starts_with("PFY-"));
            assert_eq!(&code[8..9], "-");
            assert!(normalize_pairing_code(&code).is_ok());
        }
    }

    #[test]
    fn alphabet_is_unambiguous() {
        assert_eq!(PAIRING_ALPHABET.len(), 30);
        for c in b"ILOU01" {
            assert!(!PAIRING_ALPHABET.contains(c));
        }
        let mut sorted = PAIRING_ALPHABET.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 30);
    }

    #[test]
    fn normalize_accepts_lowercase_and_whitespace() {
        assert_eq!(
            normalize_pairing_code("  pfy-abcd-2345 ").unwrap(),
            "PFY-ABCD-2345"
        );
    }

    #[test]
    fn normalize_rejects_malformed() {
        for bad in ["", "PFY-ABCD", "PFY-ABCD-234", "XYZ-ABCD-2345", "PFY-ABCD-2340", "PFY-ABCDE-2345"] {
            assert!(normalize_pairing_code(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn device_token_hash() {
        let token = generate_device_token();
        assert_eq!(token.len(), 43);
        assert_ne!(token, generate_device_token());

        let hash = hash_device_token(&token);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_device_token(&token));
        assert_ne!(hash, hash_device_token("other"));
    }
}
