//! Relay error types.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cloudvault_core::{BackendError, CloudVaultError};

/// Relay server error types mapped to HTTP status codes.
#[derive(Debug)]
pub enum RelayError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden,
    NotFound(String),
    Conflict(String),
    Gone(String),
    PayloadTooLarge,
    BadGateway(String),
    Internal(String),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(e) => write!(f, "Bad request: {}", e),
            Self::Unauthorized(e) => write!(f, "Unauthorized: {}", e),
            Self::Forbidden => write!(f, "Forbidden"),
            Self::NotFound(e) => write!(f, "Not found: {}", e),
            Self::Conflict(e) => write!(f, "Conflict: {}", e),
            Self::Gone(e) => write!(f, "Gone: {}", e),
            Self::PayloadTooLarge => write!(f, "Payload too large"),
            Self::BadGateway(e) => write!(f, "Object store error: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            Self::Conflict(e) => (StatusCode::CONFLICT, e.clone()),
            Self::Gone(e) => (StatusCode::GONE, e.clone()),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload too large".to_string(),
            ),
            Self::BadGateway(e) => {
                tracing::error!("Object store failure: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Object store unavailable".to_string(),
                )
            }
            Self::Internal(e) => {
                tracing::error!("Internal failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<CloudVaultError> for RelayError {
    fn from(e: CloudVaultError) -> Self {
        match e {
            CloudVaultError::InvalidInput(msg) => Self::BadRequest(msg),
            CloudVaultError::PayloadTooLarge => Self::PayloadTooLarge,
            CloudVaultError::Unauthorized => Self::Unauthorized("Invalid credentials".to_string()),
            CloudVaultError::Forbidden => Self::Forbidden,
            CloudVaultError::NotFound(msg) => Self::NotFound(msg),
            CloudVaultError::Conflict(msg) => Self::Conflict(msg),
            CloudVaultError::Gone(msg) => Self::Gone(msg),
            CloudVaultError::Storage(msg) => Self::Internal(msg),
            CloudVaultError::Transport(msg) => Self::BadGateway(msg),
            CloudVaultError::Backend(e) => e.into(),
            CloudVaultError::Crypto(_) => Self::BadRequest("Invalid envelope".to_string()),
        }
    }
}

impl From<BackendError> for RelayError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NoSuchUpload => Self::NotFound("Upload not found".to_string()),
            BackendError::InvalidPart(n) => Self::BadRequest(format!("Invalid part {}", n)),
            BackendError::InvalidSignature => Self::Forbidden,
            other => Self::BadGateway(other.to_string()),
        }
    }
}

/// `Json` extractor whose rejections use the relay's error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = RelayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> RelayError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::PayloadTooLarge
    } else {
        RelayError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(e: CloudVaultError) -> StatusCode {
        RelayError::from(e).into_response().status()
    }

    #[test]
    fn test_core_error_mapping() {
        assert_eq!(
            status_of(CloudVaultError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(CloudVaultError::PayloadTooLarge), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(status_of(CloudVaultError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(CloudVaultError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(status_of(CloudVaultError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CloudVaultError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(CloudVaultError::Gone("x".into())), StatusCode::GONE);
        assert_eq!(
            status_of(CloudVaultError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_backend_error_mapping() {
        assert_eq!(
            status_of(BackendError::NoSuchUpload.into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(BackendError::InvalidPart(3).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(BackendError::InvalidSignature.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(BackendError::Corrupt("bad json".into()).into()),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_echoed() {
        let response = RelayError::from(CloudVaultError::Storage("secret path".into())).into_response();
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret path"));
        assert!(text.contains("Internal server error"));
    }
}
