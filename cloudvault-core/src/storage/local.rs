//! Filesystem object store with S3-style multipart semantics.
//!
//! Layout under `root`:
//!
//! ```text
//! <bucket>/uploads/<uploadId>/session.json
//! <bucket>/uploads/<uploadId>/part-00001       part bytes
//! <bucket>/uploads/<uploadId>/part-00001.etag  hex SHA-256 of the part
//! <bucket>/objects/vaults/<owner>/<snapshot>.enc
//! ```
//!
//! Part URLs carry an HMAC-SHA256 signature over the method, bucket, key,
//! upload id, part number and expiry, so the relay can accept part bodies
//! without a bearer token.

use crate::backup::{
    BackupKey, CompletedPart, CompletedUpload, PresignedPart, UploadAction, UploadState,
    MAX_PARTS, MAX_PART_SIZE_BYTES,
};
use crate::owner::is_valid_token;
use crate::storage::{BackendError, ObjectStore};
use crate::{CloudVaultError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type BackendResult<T> = std::result::Result<T, BackendError>;

const SESSION_FILE: &str = "session.json";

/// Query string of a presigned part URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartUploadQuery {
    pub upload_id: String,
    pub part_number: u32,
    pub expires: i64,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSession {
    key: String,
    content_type: String,
    state: UploadState,
    created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_parts: Option<Vec<CompletedPart>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<CompletedUpload>,
}

pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
    public_base_url: String,
    presign_secret: Zeroizing<Vec<u8>>,
    transitions: Mutex<()>,
}

impl LocalObjectStore {
    pub fn new(
        root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_base_url: impl Into<String>,
        presign_secret: impl Into<Vec<u8>>,
    ) -> Result<Self> {
        let bucket = bucket.into();
        if !is_valid_token(&bucket) {
            return Err(CloudVaultError::InvalidInput(format!(
                "Invalid bucket name: {}",
                bucket
            )));
        }
        let presign_secret = Zeroizing::new(presign_secret.into());
        if presign_secret.is_empty() {
            return Err(CloudVaultError::InvalidInput(
                "Presign secret must not be empty".to_string(),
            ));
        }

        Ok(Self {
            root: root.into(),
            bucket,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            presign_secret,
            transitions: Mutex::new(()),
        })
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn upload_dir(&self, upload_id: &str) -> BackendResult<PathBuf> {
        // Upload ids become path components; anything but our own format is unknown
        let well_formed = upload_id.len() == 32
            && upload_id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !well_formed {
            return Err(BackendError::NoSuchUpload);
        }
        Ok(self.bucket_dir().join("uploads").join(upload_id))
    }

    /// Path of a completed object.
    pub fn object_path(&self, key: &BackupKey) -> PathBuf {
        self.bucket_dir().join("objects").join(key.as_str())
    }

    fn object_url(&self, key: &BackupKey) -> String {
        format!("{}/objects/{}/{}", self.public_base_url, self.bucket, key)
    }

    fn part_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }

    fn etag_path(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}.etag", part_number))
    }

    fn sign(&self, key: &str, upload_id: &str, part_number: u32, expires: i64) -> BackendResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.presign_secret)
            .map_err(|_| BackendError::Corrupt("Invalid presign key".to_string()))?;
        mac.update(
            format!(
                "PUT\n{}\n{}\n{}\n{}\n{}",
                self.bucket, key, upload_id, part_number, expires
            )
            .as_bytes(),
        );
        Ok(mac)
    }

    fn verify_signature(
        &self,
        key: &BackupKey,
        query: &PartUploadQuery,
        now: DateTime<Utc>,
    ) -> BackendResult<()> {
        if now.timestamp() > query.expires {
            return Err(BackendError::InvalidSignature);
        }
        let presented = hex::decode(&query.signature).map_err(|_| BackendError::InvalidSignature)?;
        self.sign(key.as_str(), &query.upload_id, query.part_number, query.expires)?
            .verify_slice(&presented)
            .map_err(|_| BackendError::InvalidSignature)
    }

    async fn load_session(dir: &Path) -> BackendResult<Option<UploadSession>> {
        match tokio::fs::read(dir.join(SESSION_FILE)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| BackendError::Corrupt(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_session(dir: &Path, session: &UploadSession) -> BackendResult<()> {
        let bytes = serde_json::to_vec_pretty(session).map_err(|e| BackendError::Corrupt(e.to_string()))?;
        let tmp = dir.join(format!("{}.tmp", SESSION_FILE));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, dir.join(SESSION_FILE)).await?;
        Ok(())
    }

    /// Load the session for `upload_id` and check it belongs to `key`.
    async fn session_for(&self, key: &BackupKey, upload_id: &str) -> BackendResult<(PathBuf, UploadSession)> {
        let dir = self.upload_dir(upload_id)?;
        let session = Self::load_session(&dir)
            .await?
            .filter(|s| s.key == key.as_str())
            .ok_or(BackendError::NoSuchUpload)?;
        Ok((dir, session))
    }

    /// Store one part body received through a presigned URL.
    ///
    /// Returns the quoted ETag the client must echo back on completion.
    pub async fn put_part(
        &self,
        key: &BackupKey,
        query: &PartUploadQuery,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> BackendResult<String> {
        self.verify_signature(key, query, now)?;

        let part_number = query.part_number;
        if part_number == 0 || part_number > MAX_PARTS || body.len() as u64 > MAX_PART_SIZE_BYTES {
            return Err(BackendError::InvalidPart(part_number));
        }

        let dir = self.upload_dir(&query.upload_id)?;
        let digest = hex::encode(Sha256::digest(body));
        let tmp = dir.join(format!("part-{:05}.{}.tmp", part_number, Uuid::new_v4().simple()));

        {
            let _guard = self.transitions.lock().await;
            let (_, session) = self.session_for(key, &query.upload_id).await?;
            if !session.state.accepts_parts() {
                return Err(BackendError::NoSuchUpload);
            }
            tokio::fs::write(&tmp, body).await?;
            tokio::fs::write(Self::etag_path(&dir, part_number), &digest).await?;
            tokio::fs::rename(&tmp, Self::part_path(&dir, part_number)).await?;
        }

        tracing::debug!(
            upload_id = %query.upload_id,
            part_number,
            bytes = body.len(),
            "Stored upload part"
        );
        Ok(format!("\"{}\"", digest))
    }

    async fn remove_parts(dir: &Path) -> BackendResult<()> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with("part-") {
                tokio::fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn assemble(
        &self,
        key: &BackupKey,
        dir: &Path,
        parts: &[CompletedPart],
    ) -> BackendResult<CompletedUpload> {
        let mut digests = Vec::with_capacity(parts.len() * 32);
        for part in parts {
            let stored = match tokio::fs::read_to_string(Self::etag_path(dir, part.part_number)).await {
                Ok(stored) => stored,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(BackendError::InvalidPart(part.part_number))
                }
                Err(e) => return Err(e.into()),
            };
            if !part.etag.trim_matches('"').eq_ignore_ascii_case(stored.trim()) {
                return Err(BackendError::InvalidPart(part.part_number));
            }
            let raw = hex::decode(stored.trim()).map_err(|e| BackendError::Corrupt(e.to_string()))?;
            digests.extend_from_slice(&raw);
        }

        let object_path = self.object_path(key);
        if let Some(parent) = object_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = object_path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let mut out = tokio::fs::File::create(&tmp).await?;
        for part in parts {
            let mut input = tokio::fs::File::open(Self::part_path(dir, part.part_number)).await?;
            tokio::io::copy(&mut input, &mut out).await?;
        }
        out.flush().await?;
        out.sync_all().await?;
        drop(out);
        tokio::fs::rename(&tmp, &object_path).await?;

        Ok(CompletedUpload {
            etag: format!("{}-{}", hex::encode(Sha256::digest(&digests)), parts.len()),
            location: self.object_url(key),
            version_id: Some(Uuid::new_v4().to_string()),
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_upload(&self, key: &BackupKey, content_type: &str) -> BackendResult<String> {
        let upload_id = Uuid::new_v4().simple().to_string();
        let dir = self.upload_dir(&upload_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let session = UploadSession {
            key: key.as_str().to_string(),
            content_type: content_type.to_string(),
            state: UploadState::Created,
            created_at: Utc::now().timestamp(),
            completed_parts: None,
            result: None,
        };
        Self::save_session(&dir, &session).await?;
        Ok(upload_id)
    }

    async fn presign_upload_parts(
        &self,
        key: &BackupKey,
        upload_id: &str,
        part_numbers: &[u32],
        expires_in_secs: u64,
    ) -> BackendResult<Vec<PresignedPart>> {
        let (_, session) = self.session_for(key, upload_id).await?;
        if !session.state.accepts_parts() {
            return Err(BackendError::NoSuchUpload);
        }

        let expires = Utc::now().timestamp() + expires_in_secs as i64;
        let base = self.object_url(key);
        part_numbers
            .iter()
            .map(|&part_number| -> BackendResult<PresignedPart> {
                let signature = hex::encode(
                    self.sign(key.as_str(), upload_id, part_number, expires)?
                        .finalize()
                        .into_bytes(),
                );
                Ok(PresignedPart {
                    part_number,
                    url: format!(
                        "{}?uploadId={}&partNumber={}&expires={}&signature={}",
                        base, upload_id, part_number, expires, signature
                    ),
                })
            })
            .collect()
    }

    async fn complete_multipart_upload(
        &self,
        key: &BackupKey,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BackendResult<CompletedUpload> {
        let _guard = self.transitions.lock().await;
        let (dir, mut session) = self.session_for(key, upload_id).await?;

        let next = session
            .state
            .apply(UploadAction::Complete)
            .ok_or(BackendError::NoSuchUpload)?;

        if session.state == UploadState::Completed {
            // Replay of the same completion returns the stored result
            return match (&session.completed_parts, &session.result) {
                (Some(done), Some(result)) if done.as_slice() == parts => Ok(result.clone()),
                _ => Err(BackendError::NoSuchUpload),
            };
        }

        let result = self.assemble(key, &dir, parts).await?;
        session.state = next;
        session.completed_parts = Some(parts.to_vec());
        session.result = Some(result.clone());
        Self::save_session(&dir, &session).await?;
        Self::remove_parts(&dir).await?;

        tracing::info!(
            key = %key,
            upload_id,
            parts = parts.len(),
            "Completed multipart upload"
        );
        Ok(result)
    }

    async fn abort_multipart_upload(&self, key: &BackupKey, upload_id: &str) -> BackendResult<()> {
        let _guard = self.transitions.lock().await;
        let dir = match self.upload_dir(upload_id) {
            Ok(dir) => dir,
            Err(_) => return Ok(()),
        };
        let mut session = match Self::load_session(&dir).await? {
            Some(session) if session.key == key.as_str() => session,
            Some(_) => return Err(BackendError::NoSuchUpload),
            None => return Ok(()),
        };

        session.state = session
            .state
            .apply(UploadAction::Abort)
            .ok_or(BackendError::NoSuchUpload)?;
        Self::remove_parts(&dir).await?;
        Self::save_session(&dir, &session).await?;

        tracing::info!(key = %key, upload_id, "Aborted multipart upload");
        Ok(())
    }
}
