//! Multipart backup handlers.

use crate::error::{ApiJson, RelayError};
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use cloudvault_core::backup::{
    AbortBackupRequest, AbortBackupResponse, CompleteBackupRequest, CompletedUpload,
    InitBackupRequest, InitBackupResponse, PresignPartsRequest, PresignPartsResponse,
};
use cloudvault_core::OwnerId;

pub async fn init(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<InitBackupRequest>,
) -> Result<Json<InitBackupResponse>, RelayError> {
    Ok(Json(state.backups.create_session(&owner, req).await?))
}

pub async fn presign_parts(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<PresignPartsRequest>,
) -> Result<Json<PresignPartsResponse>, RelayError> {
    Ok(Json(state.backups.presign_parts(&owner, req).await?))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<CompleteBackupRequest>,
) -> Result<Json<CompletedUpload>, RelayError> {
    Ok(Json(state.backups.complete(&owner, req).await?))
}

pub async fn abort(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<AbortBackupRequest>,
) -> Result<Json<AbortBackupResponse>, RelayError> {
    Ok(Json(state.backups.abort(&owner, req).await?))
}
