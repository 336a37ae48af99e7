//! Device listing and heartbeat handlers.

use crate::auth::credentials;
use crate::error::RelayError;
use crate::state::AppState;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};
use chrono::Utc;
use cloudvault_core::pairing::DeviceInfo;
use cloudvault_core::OwnerId;

pub async fn list_devices(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Vec<DeviceInfo>>, RelayError> {
    Ok(Json(state.pairing.list_devices(&owner).await?))
}

/// Authenticated by `Authorization: Device <token>` rather than a session.
pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DeviceInfo>, RelayError> {
    let token = credentials(&headers, "Device")?;
    let device = state.pairing.authenticate_device(token, Utc::now()).await?;
    tracing::debug!(device_id = %device.device_id, "Device heartbeat");
    Ok(Json(DeviceInfo::from(device)))
}
