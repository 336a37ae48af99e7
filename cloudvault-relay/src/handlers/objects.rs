//! Presigned part sink.
//!
//! Not behind bearer auth: the HMAC signature in the query string is the
//! credential, and it binds bucket, key, upload id, part number and expiry.

use crate::error::RelayError;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header::ETAG;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use cloudvault_core::storage::PartUploadQuery;
use cloudvault_core::{BackupKey, ObjectStore};

pub async fn put_part(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    query: Result<Query<PartUploadQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, RelayError> {
    let Query(query) = query.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    let body = body.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayError::PayloadTooLarge
        } else {
            RelayError::BadRequest(e.body_text())
        }
    })?;
    if bucket != state.objects.bucket() {
        return Err(RelayError::NotFound("Bucket not found".to_string()));
    }
    let key = BackupKey::parse(&key).map_err(|_| RelayError::Forbidden)?;

    let etag = state
        .objects
        .put_part(&key, &query, &body, Utc::now())
        .await?;

    Ok((StatusCode::OK, [(ETAG, etag)]))
}
