//! Bearer JWT auth middleware.
//!
//! The relay trusts an upstream identity provider: a valid HS256 token's
//! `sub` claim is the owner id every handler scopes its work to.

use crate::error::RelayError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use cloudvault_core::OwnerId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Verifies session tokens.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(aud) => {
                validation.set_audience(&[aud]);
                validation.set_required_spec_claims(&["exp", "aud"]);
            }
            None => validation.validate_aud = false,
        }
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<OwnerId, RelayError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| RelayError::Unauthorized("Invalid or expired token".to_string()))?;
        OwnerId::new(data.claims.sub)
            .map_err(|_| RelayError::Unauthorized("Invalid subject".to_string()))
    }
}

/// Credentials after `scheme` in the Authorization header.
pub fn credentials<'a>(headers: &'a HeaderMap, scheme: &str) -> Result<&'a str, RelayError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RelayError::Unauthorized("Missing Authorization header".to_string()))?;

    header
        .split_once(' ')
        .filter(|(s, _)| s.eq_ignore_ascii_case(scheme))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| RelayError::Unauthorized("Invalid auth scheme".to_string()))
}

/// Auth middleware: resolves the bearer token to an [`OwnerId`] extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    let token = credentials(request.headers(), "Bearer")?;
    let owner = state.jwt.verify(token)?;

    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp_offset: i64, aud: Option<&str>) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as u64;
        let mut claims = serde_json::json!({ "sub": sub, "exp": exp });
        if let Some(aud) = aud {
            claims["aud"] = serde_json::Value::String(aud.to_string());
        }
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_owner() {
        let verifier = JwtVerifier::new("secret", None);
        let owner = verifier.verify(&token("secret", "user-42", 300, None)).unwrap();
        assert_eq!(owner.as_str(), "user-42");
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let verifier = JwtVerifier::new("secret", None);
        assert!(verifier.verify(&token("other", "user-42", 300, None)).is_err());
        assert!(verifier.verify(&token("secret", "user-42", -600, None)).is_err());
        assert!(verifier.verify(&token("secret", "../etc", 300, None)).is_err());
        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let verifier = JwtVerifier::new("secret", Some("cloudvault"));
        assert!(verifier.verify(&token("secret", "u", 300, Some("cloudvault"))).is_ok());
        assert!(verifier.verify(&token("secret", "u", 300, Some("other"))).is_err());
        assert!(verifier.verify(&token("secret", "u", 300, None)).is_err());
    }

    #[test]
    fn test_credentials_parsing() {
        let mut headers = HeaderMap::new();
        assert!(credentials(&headers, "Bearer").is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(credentials(&headers, "Bearer").unwrap(), "abc");
        assert!(credentials(&headers, "Device").is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(credentials(&headers, "Bearer").is_err());
    }
}
