//! Shared handler state.

use crate::auth::JwtVerifier;
use crate::config::RelayConfig;
use cloudvault_core::{
    BackupConfig, BackupPipeline, LocalObjectStore, PairingConfig, PairingService, SqliteStore,
    VaultSync,
};
use std::sync::Arc;

/// Everything a handler needs. Cloning is cheap; no request state lives here.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub objects: Arc<LocalObjectStore>,
    pub vaults: VaultSync<SqliteStore>,
    pub backups: BackupPipeline<LocalObjectStore>,
    pub pairing: PairingService<SqliteStore>,
    pub jwt: Arc<JwtVerifier>,
}

impl AppState {
    pub fn open(config: &RelayConfig) -> anyhow::Result<Self> {
        let store = SqliteStore::open(&config.storage_path)?;
        let objects = LocalObjectStore::new(
            &config.object_root,
            &config.bucket,
            &config.public_base_url,
            config.presign_secret.as_bytes(),
        )?;
        Ok(Self::with_stores(Arc::new(store), Arc::new(objects), config))
    }

    pub fn with_stores(
        store: Arc<SqliteStore>,
        objects: Arc<LocalObjectStore>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            vaults: VaultSync::new(Arc::clone(&store)),
            backups: BackupPipeline::new(
                Arc::clone(&objects),
                BackupConfig {
                    presign_batch_size: config.presign_batch_size,
                },
            ),
            pairing: PairingService::new(
                Arc::clone(&store),
                PairingConfig {
                    ttl_secs: config.pairing_ttl_secs,
                    max_active_pairings: config.max_active_pairings,
                },
            ),
            jwt: Arc::new(JwtVerifier::new(
                &config.jwt_secret,
                config.jwt_audience.as_deref(),
            )),
            store,
            objects,
        }
    }
}
