//! SQLite row store for vault snapshots, pairing requests and devices.
//!
//! Every conditional write is a single statement (or a single transaction)
//! executed under the connection mutex, so the affected-row count is the
//! authoritative answer to "did this write happen".

use crate::crypto::EncryptedEnvelope;
use crate::owner::OwnerId;
use crate::pairing::models::{Device, DeviceType, PairingRequest, PairingStatus, DEVICE_STATUS_ACTIVE};
use crate::storage::{PairingInsert, PairingStore, VaultStore};
use crate::sync::models::{InsertOutcome, VaultRecord};
use crate::{CloudVaultError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Thread-safe SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cloud_vaults (
                owner_id TEXT PRIMARY KEY,
                vault_name TEXT,
                envelope TEXT NOT NULL,
                version INTEGER NOT NULL CHECK (version >= 0),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pairing_requests (
                code TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                device_name TEXT NOT NULL,
                device_type TEXT NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('pending', 'claimed', 'expired')),
                device_id TEXT,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS devices (
                device_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                device_name TEXT NOT NULL,
                device_type TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL,
                last_seen_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_pairing_owner_status
                ON pairing_requests(owner_id, status, expires_at);
            CREATE INDEX IF NOT EXISTS idx_pairing_created
                ON pairing_requests(created_at);
            CREATE INDEX IF NOT EXISTS idx_devices_owner
                ON devices(owner_id);",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CloudVaultError::Storage(format!("Lock error: {}", e)))
    }
}

fn from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CloudVaultError::Storage(format!("Invalid timestamp {}", secs)))
}

fn corrupt(what: &str) -> CloudVaultError {
    CloudVaultError::Storage(format!("Corrupt row: {}", what))
}

struct VaultRow {
    owner_id: String,
    vault_name: Option<String>,
    envelope: String,
    version: i64,
    created_at: i64,
    updated_at: i64,
}

impl VaultRow {
    const COLUMNS: &'static str =
        "owner_id, vault_name, envelope, version, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            owner_id: row.get(0)?,
            vault_name: row.get(1)?,
            envelope: row.get(2)?,
            version: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<VaultRecord> {
        Ok(VaultRecord {
            owner_id: OwnerId::new(self.owner_id).map_err(|_| corrupt("owner_id"))?,
            vault_name: self.vault_name,
            envelope: serde_json::from_str(&self.envelope).map_err(|_| corrupt("envelope"))?,
            version: u64::try_from(self.version).map_err(|_| corrupt("version"))?,
            created_at: from_timestamp(self.created_at)?,
            updated_at: from_timestamp(self.updated_at)?,
        })
    }
}

fn select_vault(conn: &Connection, owner: &OwnerId) -> Result<Option<VaultRecord>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM cloud_vaults WHERE owner_id = ?1",
                VaultRow::COLUMNS
            ),
            [owner.as_str()],
            VaultRow::from_row,
        )
        .optional()?;
    row.map(VaultRow::into_record).transpose()
}

fn encode_envelope(envelope: &EncryptedEnvelope) -> Result<String> {
    serde_json::to_string(envelope)
        .map_err(|e| CloudVaultError::InvalidInput(format!("Unserializable envelope: {}", e)))
}

#[async_trait]
impl VaultStore for SqliteStore {
    async fn insert_vault_if_absent(
        &self,
        owner: &OwnerId,
        vault_name: Option<&str>,
        envelope: &EncryptedEnvelope,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        let envelope = encode_envelope(envelope)?;
        let conn = self.conn()?;
        let now = now.timestamp();

        let inserted = conn.execute(
            "INSERT INTO cloud_vaults (owner_id, vault_name, envelope, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(owner_id) DO NOTHING",
            rusqlite::params![owner.as_str(), vault_name, envelope, now],
        )?;

        let record = select_vault(&conn, owner)?
            .ok_or_else(|| CloudVaultError::Storage("Vault row vanished after insert".to_string()))?;

        Ok(if inserted == 1 {
            InsertOutcome::Inserted(record)
        } else {
            InsertOutcome::Existing(record)
        })
    }

    async fn fetch_vault(&self, owner: &OwnerId) -> Result<Option<VaultRecord>> {
        let conn = self.conn()?;
        select_vault(&conn, owner)
    }

    async fn update_vault_if_version(
        &self,
        owner: &OwnerId,
        expected_version: u64,
        envelope: &EncryptedEnvelope,
        now: DateTime<Utc>,
    ) -> Result<Option<VaultRecord>> {
        let envelope = encode_envelope(envelope)?;
        let expected = i64::try_from(expected_version)
            .map_err(|_| CloudVaultError::InvalidInput("Version out of range".to_string()))?;
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE cloud_vaults
             SET envelope = ?1, version = version + 1, updated_at = ?2
             WHERE owner_id = ?3 AND version = ?4",
            rusqlite::params![envelope, now.timestamp(), owner.as_str(), expected],
        )?;

        if updated == 0 {
            return Ok(None);
        }
        select_vault(&conn, owner)
    }
}

struct PairingRow {
    code: String,
    owner_id: String,
    device_name: String,
    device_type: String,
    status: String,
    device_id: Option<String>,
    created_at: i64,
    expires_at: i64,
}

impl PairingRow {
    const COLUMNS: &'static str =
        "code, owner_id, device_name, device_type, status, device_id, created_at, expires_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            owner_id: row.get(1)?,
            device_name: row.get(2)?,
            device_type: row.get(3)?,
            status: row.get(4)?,
            device_id: row.get(5)?,
            created_at: row.get(6)?,
            expires_at: row.get(7)?,
        })
    }

    fn into_request(self) -> Result<PairingRequest> {
        Ok(PairingRequest {
            code: self.code,
            owner_id: OwnerId::new(self.owner_id).map_err(|_| corrupt("owner_id"))?,
            device_name: self.device_name,
            device_type: DeviceType::parse(&self.device_type).ok_or_else(|| corrupt("device_type"))?,
            status: PairingStatus::parse(&self.status).ok_or_else(|| corrupt("status"))?,
            device_id: self
                .device_id
                .map(|id| Uuid::parse_str(&id).map_err(|_| corrupt("device_id")))
                .transpose()?,
            created_at: from_timestamp(self.created_at)?,
            expires_at: from_timestamp(self.expires_at)?,
        })
    }
}

struct DeviceRow {
    device_id: String,
    owner_id: String,
    device_name: String,
    device_type: String,
    token_hash: String,
    status: String,
    created_at: i64,
    last_seen_at: Option<i64>,
}

impl DeviceRow {
    const COLUMNS: &'static str =
        "device_id, owner_id, device_name, device_type, token_hash, status, created_at, last_seen_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            owner_id: row.get(1)?,
            device_name: row.get(2)?,
            device_type: row.get(3)?,
            token_hash: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            last_seen_at: row.get(7)?,
        })
    }

    fn into_device(self) -> Result<Device> {
        Ok(Device {
            device_id: Uuid::parse_str(&self.device_id).map_err(|_| corrupt("device_id"))?,
            owner_id: OwnerId::new(self.owner_id).map_err(|_| corrupt("owner_id"))?,
            device_name: self.device_name,
            device_type: DeviceType::parse(&self.device_type).ok_or_else(|| corrupt("device_type"))?,
            token_hash: self.token_hash,
            status: self.status,
            created_at: from_timestamp(self.created_at)?,
            last_seen_at: self.last_seen_at.map(from_timestamp).transpose()?,
        })
    }
}

#[async_trait]
impl PairingStore for SqliteStore {
    async fn insert_pairing(
        &self,
        request: &PairingRequest,
        max_active: u64,
    ) -> Result<PairingInsert> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pairing_requests
             WHERE owner_id = ?1 AND status = ?2 AND expires_at > ?3",
            rusqlite::params![
                request.owner_id.as_str(),
                PairingStatus::Pending.as_str(),
                request.created_at.timestamp(),
            ],
            |row| row.get(0),
        )?;
        if active.max(0) as u64 >= max_active {
            return Ok(PairingInsert::LimitReached);
        }

        let inserted = tx.execute(
            "INSERT INTO pairing_requests
                (code, owner_id, device_name, device_type, status, device_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(code) DO NOTHING",
            rusqlite::params![
                request.code,
                request.owner_id.as_str(),
                request.device_name,
                request.device_type.as_str(),
                request.status.as_str(),
                request.device_id.map(|id| id.to_string()),
                request.created_at.timestamp(),
                request.expires_at.timestamp(),
            ],
        )?;
        if inserted == 0 {
            return Ok(PairingInsert::CodeTaken);
        }

        tx.commit()?;
        Ok(PairingInsert::Inserted)
    }

    async fn find_pairing(&self, owner: &OwnerId, code: &str) -> Result<Option<PairingRequest>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pairing_requests WHERE code = ?1 AND owner_id = ?2",
                    PairingRow::COLUMNS
                ),
                [code, owner.as_str()],
                PairingRow::from_row,
            )
            .optional()?;
        row.map(PairingRow::into_request).transpose()
    }

    async fn transition_pairing(
        &self,
        owner: &OwnerId,
        code: &str,
        from: PairingStatus,
        to: PairingStatus,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            return Err(CloudVaultError::InvalidInput(format!(
                "Pairing cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE pairing_requests SET status = ?1
             WHERE code = ?2 AND owner_id = ?3 AND status = ?4",
            rusqlite::params![to.as_str(), code, owner.as_str(), from.as_str()],
        )?;
        Ok(updated == 1)
    }

    async fn claim_pairing(
        &self,
        owner: &OwnerId,
        code: &str,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO devices
                (device_id, owner_id, device_name, device_type, token_hash, status, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                device.device_id.to_string(),
                device.owner_id.as_str(),
                device.device_name,
                device.device_type.as_str(),
                device.token_hash,
                device.status,
                device.created_at.timestamp(),
                device.last_seen_at.map(|t| t.timestamp()),
            ],
        )?;

        let claimed = tx.execute(
            "UPDATE pairing_requests SET status = ?1, device_id = ?2
             WHERE code = ?3 AND owner_id = ?4 AND status = ?5 AND expires_at > ?6",
            rusqlite::params![
                PairingStatus::Claimed.as_str(),
                device.device_id.to_string(),
                code,
                owner.as_str(),
                PairingStatus::Pending.as_str(),
                now.timestamp(),
            ],
        )?;

        if claimed == 0 {
            // Dropping the transaction rolls the device insert back
            return Ok(false);
        }
        tx.commit()?;
        Ok(true)
    }

    async fn list_devices(&self, owner: &OwnerId) -> Result<Vec<Device>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM devices WHERE owner_id = ?1 ORDER BY created_at ASC, device_id ASC",
            DeviceRow::COLUMNS
        ))?;
        let rows = stmt
            .query_map([owner.as_str()], DeviceRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(DeviceRow::into_device).collect()
    }

    async fn delete_device(&self, owner: &OwnerId, device_id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM devices WHERE device_id = ?1 AND owner_id = ?2",
            rusqlite::params![device_id.to_string(), owner.as_str()],
        )?;
        Ok(deleted == 1)
    }

    async fn touch_device(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<Device>> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE devices SET last_seen_at = ?1 WHERE token_hash = ?2 AND status = ?3",
            rusqlite::params![now.timestamp(), token_hash, DEVICE_STATUS_ACTIVE],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM devices WHERE token_hash = ?1",
                    DeviceRow::COLUMNS
                ),
                [token_hash],
                DeviceRow::from_row,
            )
            .optional()?;
        row.map(DeviceRow::into_device).transpose()
    }

    async fn prune_pairings(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM pairing_requests
             WHERE created_at < ?1 AND (status != ?2 OR expires_at < ?1)",
            rusqlite::params![cutoff.timestamp(), PairingStatus::Pending.as_str()],
        )?;
        Ok(deleted as u64)
    }
}
