//! Pairing and device records, plus their wire types.

use crate::owner::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingStatus {
    Pending,
    Claimed,
    Expired,
}

impl PairingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Only `pending -> claimed` and `pending -> expired` exist.
    /// Terminal states never revert.
    pub fn can_transition_to(self, next: PairingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Claimed) | (Self::Pending, Self::Expired)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Agent,
    Vault,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Vault => "vault",
            Self::Mobile => "mobile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(Self::Agent),
            "vault" => Some(Self::Vault),
            "mobile" => Some(Self::Mobile),
            _ => None,
        }
    }
}

pub const DEVICE_STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    pub code: String,
    pub owner_id: OwnerId,
    pub device_name: String,
    pub device_type: DeviceType,
    pub status: PairingStatus,
    pub device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PairingRequest {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub device_id: Uuid,
    pub owner_id: OwnerId,
    pub device_name: String,
    pub device_type: DeviceType,
    pub token_hash: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPairingRequest {
    pub device_name: String,
    pub device_type: DeviceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPairingResponse {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPairingRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimPairingResponse {
    pub device_id: Uuid,
    pub device_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingStatusResponse {
    pub status: PairingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<DeviceType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeDeviceRequest {
    pub device_id: Uuid,
}

/// Device as shown to its owner. Never carries the token hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: Uuid,
    pub device_name: String,
    pub device_type: DeviceType,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl From<Device> for DeviceInfo {
    fn from(device: Device) -> Self {
        Self {
            device_id: device.device_id,
            device_name: device.device_name,
            device_type: device.device_type,
            status: device.status,
            created_at: device.created_at,
            last_seen_at: device.last_seen_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_transitions() {
        use PairingStatus::*;
        assert!(Pending.can_transition_to(Claimed));
        assert!(Pending.can_transition_to(Expired));
        for terminal in [Claimed, Expired] {
            for next in [Pending, Claimed, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in [PairingStatus::Pending, PairingStatus::Claimed, PairingStatus::Expired] {
            assert_eq!(PairingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PairingStatus::parse("revoked"), None);
    }

    #[test]
    fn device_type_wire_format() {
        let req: StartPairingRequest =
            serde_json::from_str(r#"{"deviceName":"Laptop","deviceType":"agent"}"#).unwrap();
        assert_eq!(req.device_type, DeviceType::Agent);
        assert!(serde_json::from_str::<StartPairingRequest>(
            r#"{"deviceName":"Laptop","deviceType":"desktop"}"#
        )
        .is_err());
        assert_eq!(DeviceType::parse("mobile"), Some(DeviceType::Mobile));
    }
}
