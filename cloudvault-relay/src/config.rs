//! Relay server configuration.

use cloudvault_core::backup::DEFAULT_PRESIGN_BATCH_SIZE;
use cloudvault_core::pairing::{DEFAULT_MAX_ACTIVE_PAIRINGS, DEFAULT_PAIRING_TTL_SECS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const JWT_SECRET_ENV: &str = "CLOUDVAULT_JWT_SECRET";
pub const PRESIGN_SECRET_ENV: &str = "CLOUDVAULT_PRESIGN_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub storage_path: PathBuf,
    pub object_root: PathBuf,
    pub bucket: String,
    /// Base of presigned part URLs, as reachable by clients.
    pub public_base_url: String,
    pub jwt_secret: String,
    pub jwt_audience: Option<String>,
    pub presign_secret: String,
    pub presign_batch_size: usize,
    /// Body limit for JSON API requests.
    pub max_payload_size: usize,
    pub max_active_pairings: u64,
    pub pairing_ttl_secs: u64,
    pub pairing_retention_hours: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8743".to_string(),
            storage_path: PathBuf::from("relay.db"),
            object_root: PathBuf::from("objects"),
            bucket: "cloudvault".to_string(),
            public_base_url: "http://127.0.0.1:8743".to_string(),
            jwt_secret: String::new(),
            jwt_audience: None,
            presign_secret: String::new(),
            presign_batch_size: DEFAULT_PRESIGN_BATCH_SIZE,
            max_payload_size: 1024 * 1024 + 16 * 1024,
            max_active_pairings: DEFAULT_MAX_ACTIVE_PAIRINGS,
            pairing_ttl_secs: DEFAULT_PAIRING_TTL_SECS,
            pairing_retention_hours: 24,
        }
    }
}

impl RelayConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml_dep::from_str(&content)?;
        Ok(config)
    }

    /// Secrets from the environment win over the config file.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            self.jwt_secret = secret;
        }
        if let Ok(secret) = std::env::var(PRESIGN_SECRET_ENV) {
            self.presign_secret = secret;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.is_empty() {
            anyhow::bail!("jwt_secret is not set (config or {})", JWT_SECRET_ENV);
        }
        if self.presign_secret.is_empty() {
            anyhow::bail!("presign_secret is not set (config or {})", PRESIGN_SECRET_ENV);
        }
        if self.max_active_pairings == 0 {
            anyhow::bail!("max_active_pairings must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RelayConfig = toml_dep::from_str(
            r#"
            listen_addr = "0.0.0.0:9000"
            jwt_secret = "s1"
            presign_secret = "s2"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.bucket, "cloudvault");
        assert_eq!(config.pairing_ttl_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_secrets_rejected() {
        assert!(RelayConfig::default().validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "bucket = \"backups\"\npresign_batch_size = 4\n").unwrap();
        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.bucket, "backups");
        assert_eq!(config.presign_batch_size, 4);
    }
}
