//! Device pairing handlers.

use crate::error::{ApiJson, RelayError};
use crate::state::AppState;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::Utc;
use cloudvault_core::pairing::{
    ClaimPairingRequest, ClaimPairingResponse, PairingStatusResponse, RevokeDeviceRequest,
    StartPairingRequest, StartPairingResponse,
};
use cloudvault_core::OwnerId;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct StatusQuery {
    pub code: String,
}

pub async fn start(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<StartPairingRequest>,
) -> Result<Json<StartPairingResponse>, RelayError> {
    Ok(Json(state.pairing.start(&owner, req, Utc::now()).await?))
}

pub async fn claim(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<ClaimPairingRequest>,
) -> Result<Json<ClaimPairingResponse>, RelayError> {
    Ok(Json(state.pairing.claim(&owner, req, Utc::now()).await?))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Result<Json<PairingStatusResponse>, RelayError> {
    let Query(query) = query.map_err(|e| RelayError::BadRequest(e.body_text()))?;
    Ok(Json(
        state.pairing.status(&owner, &query.code, Utc::now()).await?,
    ))
}

pub async fn revoke(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(req): ApiJson<RevokeDeviceRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    state.pairing.revoke(&owner, req).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
