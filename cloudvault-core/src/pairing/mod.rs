//! Device pairing.
//!
//! A signed-in owner starts a pairing and reads the short code to the new
//! device. The device claims the code (under the same owner's session) and
//! receives a long-lived device token exactly once. Requests move
//! `pending -> claimed` or `pending -> expired` and never back.

pub mod code;
pub mod models;

pub use code::{generate_device_token, generate_pairing_code, hash_device_token, normalize_pairing_code};
pub use models::{
    ClaimPairingRequest, ClaimPairingResponse, Device, DeviceInfo, DeviceType, PairingRequest,
    PairingStatus, PairingStatusResponse, RevokeDeviceRequest, StartPairingRequest,
    StartPairingResponse,
};

use crate::owner::OwnerId;
use crate::storage::{PairingInsert, PairingStore};
use crate::{CloudVaultError, Result};
use chrono::{DateTime, Duration, Utc};
use models::DEVICE_STATUS_ACTIVE;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAIRING_TTL_SECS: u64 = 10 * 60;
pub const DEFAULT_MAX_ACTIVE_PAIRINGS: u64 = 5;
pub const MAX_DEVICE_NAME_LEN: usize = 64;

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct PairingConfig {
    pub ttl_secs: u64,
    /// Pending, unexpired requests allowed per owner.
    pub max_active_pairings: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_PAIRING_TTL_SECS,
            max_active_pairings: DEFAULT_MAX_ACTIVE_PAIRINGS,
        }
    }
}

pub struct PairingService<S> {
    store: Arc<S>,
    config: PairingConfig,
}

impl<S> Clone for PairingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

fn normalize_device_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_DEVICE_NAME_LEN {
        return Err(CloudVaultError::InvalidInput(format!(
            "deviceName must be 1-{} characters",
            MAX_DEVICE_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn not_found() -> CloudVaultError {
    CloudVaultError::NotFound("Pairing request not found".to_string())
}

fn gone() -> CloudVaultError {
    CloudVaultError::Gone("Pairing code expired".to_string())
}

impl<S: PairingStore> PairingService<S> {
    pub fn new(store: Arc<S>, config: PairingConfig) -> Self {
        Self { store, config }
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_secs.min(i64::MAX as u64) as i64)
    }

    /// Open a pending pairing request and return its code.
    pub async fn start(
        &self,
        owner: &OwnerId,
        request: StartPairingRequest,
        now: DateTime<Utc>,
    ) -> Result<StartPairingResponse> {
        let device_name = normalize_device_name(&request.device_name)?;

        let expires_at = now + self.ttl();
        for _ in 0..CODE_ATTEMPTS {
            let pairing = PairingRequest {
                code: generate_pairing_code(),
                owner_id: owner.clone(),
                device_name: device_name.clone(),
                device_type: request.device_type,
                status: PairingStatus::Pending,
                device_id: None,
                created_at: now,
                expires_at,
            };
            match self
                .store
                .insert_pairing(&pairing, self.config.max_active_pairings)
                .await?
            {
                PairingInsert::Inserted => {
                    tracing::info!(
                        owner = %owner,
                        device_type = pairing.device_type.as_str(),
                        "Started pairing"
                    );
                    return Ok(StartPairingResponse {
                        code: pairing.code,
                        expires_at,
                    });
                }
                PairingInsert::LimitReached => {
                    tracing::warn!(owner = %owner, "Too many active pairing requests");
                    return Err(CloudVaultError::Conflict(
                        "Too many active pairing requests".to_string(),
                    ));
                }
                PairingInsert::CodeTaken => {
                    tracing::debug!("Pairing code collision, retrying");
                }
            }
        }

        Err(CloudVaultError::Storage(
            "Could not allocate a unique pairing code".to_string(),
        ))
    }

    async fn expire(&self, owner: &OwnerId, code: &str) -> Result<()> {
        let flipped = self
            .store
            .transition_pairing(owner, code, PairingStatus::Pending, PairingStatus::Expired)
            .await?;
        if flipped {
            tracing::info!(owner = %owner, "Pairing request expired");
        }
        Ok(())
    }

    /// Claim a pending code and mint the device token.
    ///
    /// The token is returned here and nowhere else; only its hash is stored.
    pub async fn claim(
        &self,
        owner: &OwnerId,
        request: ClaimPairingRequest,
        now: DateTime<Utc>,
    ) -> Result<ClaimPairingResponse> {
        let code = normalize_pairing_code(&request.code)?;

        let pairing = self
            .store
            .find_pairing(owner, &code)
            .await?
            .ok_or_else(not_found)?;

        match pairing.status {
            PairingStatus::Claimed => return Err(not_found()),
            PairingStatus::Expired => return Err(gone()),
            PairingStatus::Pending if pairing.is_expired_at(now) => {
                self.expire(owner, &code).await?;
                return Err(gone());
            }
            PairingStatus::Pending => {}
        }

        let device_token = generate_device_token();
        let device = Device {
            device_id: Uuid::new_v4(),
            owner_id: owner.clone(),
            device_name: pairing.device_name,
            device_type: pairing.device_type,
            token_hash: hash_device_token(&device_token),
            status: DEVICE_STATUS_ACTIVE.to_string(),
            created_at: now,
            last_seen_at: None,
        };

        if !self.store.claim_pairing(owner, &code, &device, now).await? {
            tracing::warn!(owner = %owner, "Pairing claim lost a race");
            return Err(not_found());
        }

        tracing::info!(
            owner = %owner,
            device_id = %device.device_id,
            device_type = device.device_type.as_str(),
            "Device paired"
        );
        Ok(ClaimPairingResponse {
            device_id: device.device_id,
            device_token,
        })
    }

    /// Report a request's status, expiring it lazily when its time is up.
    pub async fn status(
        &self,
        owner: &OwnerId,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<PairingStatusResponse> {
        let code = normalize_pairing_code(code)?;
        let pairing = self
            .store
            .find_pairing(owner, &code)
            .await?
            .ok_or_else(not_found)?;

        let status = match pairing.status {
            PairingStatus::Pending if pairing.is_expired_at(now) => {
                self.expire(owner, &code).await?;
                PairingStatus::Expired
            }
            status => status,
        };

        Ok(if status == PairingStatus::Claimed {
            PairingStatusResponse {
                status,
                device_id: pairing.device_id,
                device_name: Some(pairing.device_name),
                device_type: Some(pairing.device_type),
            }
        } else {
            PairingStatusResponse {
                status,
                device_id: None,
                device_name: None,
                device_type: None,
            }
        })
    }

    pub async fn revoke(&self, owner: &OwnerId, request: RevokeDeviceRequest) -> Result<()> {
        if !self.store.delete_device(owner, request.device_id).await? {
            return Err(CloudVaultError::NotFound("Device not found".to_string()));
        }
        tracing::info!(owner = %owner, device_id = %request.device_id, "Device revoked");
        Ok(())
    }

    pub async fn list_devices(&self, owner: &OwnerId) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .store
            .list_devices(owner)
            .await?
            .into_iter()
            .map(DeviceInfo::from)
            .collect())
    }

    /// Resolve a presented device token to its active device.
    pub async fn authenticate_device(&self, token: &str, now: DateTime<Utc>) -> Result<Device> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CloudVaultError::Unauthorized);
        }
        self.store
            .touch_device(&hash_device_token(token), now)
            .await?
            .ok_or(CloudVaultError::Unauthorized)
    }
}
