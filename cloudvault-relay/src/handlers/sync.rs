//! Vault sync handlers.

use crate::error::{ApiJson, RelayError};
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::Utc;
use cloudvault_core::sync::{
    InitVaultRequest, PullVaultResponse, PushVaultRequest, VaultVersionResponse,
};
use cloudvault_core::OwnerId;

pub async fn init(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<InitVaultRequest>,
) -> Result<Json<VaultVersionResponse>, RelayError> {
    let response = state.vaults.init(&owner, req, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn push(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<PushVaultRequest>,
) -> Result<Json<VaultVersionResponse>, RelayError> {
    let response = state.vaults.push(&owner, req, Utc::now()).await?;
    Ok(Json(response))
}

pub async fn pull(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<PullVaultResponse>, RelayError> {
    Ok(Json(state.vaults.pull(&owner).await?))
}
