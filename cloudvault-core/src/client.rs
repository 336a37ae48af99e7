//! HTTP client for the CloudVault relay.

use crate::backup::{
    AbortBackupRequest, AbortBackupResponse, CompleteBackupRequest, CompletedPart,
    CompletedUpload, InitBackupRequest, InitBackupResponse, PresignPartsRequest,
    PresignPartsResponse, UploadPlan,
};
use crate::pairing::{
    ClaimPairingRequest, ClaimPairingResponse, DeviceInfo, PairingStatusResponse,
    RevokeDeviceRequest, StartPairingRequest, StartPairingResponse,
};
use crate::sync::{InitVaultRequest, PullVaultResponse, PushVaultRequest, VaultVersionResponse};
use crate::{CloudVaultError, Result};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const API_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Slowest uplink a part upload is allowed to run at before timing out.
const MIN_UPLOAD_BYTES_PER_SEC: u64 = 256 * 1024;

/// Time allowed for PUTting a part of `len` bytes.
fn part_upload_timeout(len: u64) -> Duration {
    API_TIMEOUT + Duration::from_secs(len / MIN_UPLOAD_BYTES_PER_SEC)
}

fn transport(e: impl std::fmt::Display) -> CloudVaultError {
    CloudVaultError::Transport(e.to_string())
}

/// Map a relay error response back onto the error taxonomy.
fn relay_error(status: StatusCode, body: &str) -> CloudVaultError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    match status {
        StatusCode::BAD_REQUEST => CloudVaultError::InvalidInput(message),
        StatusCode::UNAUTHORIZED => CloudVaultError::Unauthorized,
        StatusCode::FORBIDDEN => CloudVaultError::Forbidden,
        StatusCode::NOT_FOUND => CloudVaultError::NotFound(message),
        StatusCode::CONFLICT => CloudVaultError::Conflict(message),
        StatusCode::GONE => CloudVaultError::Gone(message),
        StatusCode::PAYLOAD_TOO_LARGE => CloudVaultError::PayloadTooLarge,
        _ => CloudVaultError::Transport(format!("Relay error {}: {}", status, message)),
    }
}

/// Client for one owner's session on a relay.
pub struct RelayClient {
    client: reqwest::Client,
    relay_url: String,
    bearer_token: String,
}

impl RelayClient {
    pub fn new(relay_url: &str, bearer_token: &str) -> Result<Self> {
        // No client-wide timeout: part uploads scale theirs with the body size
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            relay_url: relay_url.trim_end_matches('/').to_string(),
            bearer_token: bearer_token.to_string(),
        })
    }

    pub async fn sync_init(&self, request: &InitVaultRequest) -> Result<VaultVersionResponse> {
        self.post_json("/api/v1/sync/init", request).await
    }

    pub async fn sync_push(&self, request: &PushVaultRequest) -> Result<VaultVersionResponse> {
        self.post_json("/api/v1/sync/push", request).await
    }

    pub async fn sync_pull(&self) -> Result<PullVaultResponse> {
        self.get_json("/api/v1/sync/pull").await
    }

    pub async fn backup_init(&self, request: &InitBackupRequest) -> Result<InitBackupResponse> {
        self.post_json("/api/v1/backup/init", request).await
    }

    pub async fn backup_presign_parts(
        &self,
        request: &PresignPartsRequest,
    ) -> Result<PresignPartsResponse> {
        self.post_json("/api/v1/backup/presign-parts", request).await
    }

    pub async fn backup_complete(&self, request: &CompleteBackupRequest) -> Result<CompletedUpload> {
        self.post_json("/api/v1/backup/complete", request).await
    }

    pub async fn backup_abort(&self, request: &AbortBackupRequest) -> Result<AbortBackupResponse> {
        self.post_json("/api/v1/backup/abort", request).await
    }

    pub async fn pairing_start(&self, request: &StartPairingRequest) -> Result<StartPairingResponse> {
        self.post_json("/api/v1/pairing/start", request).await
    }

    pub async fn pairing_claim(&self, request: &ClaimPairingRequest) -> Result<ClaimPairingResponse> {
        self.post_json("/api/v1/pairing/claim", request).await
    }

    pub async fn pairing_status(&self, code: &str) -> Result<PairingStatusResponse> {
        let url = format!("{}/api/v1/pairing/status", self.relay_url);
        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.bearer_token)
            .query(&[("code", code)]);
        Self::send(request).await
    }

    pub async fn pairing_revoke(&self, request: &RevokeDeviceRequest) -> Result<()> {
        let _: serde_json::Value = self.post_json("/api/v1/pairing/revoke", request).await?;
        Ok(())
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.get_json("/api/v1/devices").await
    }

    /// Report liveness with a device token instead of the owner's session.
    pub async fn device_heartbeat(&self, device_token: &str) -> Result<DeviceInfo> {
        let url = format!("{}/api/v1/devices/heartbeat", self.relay_url);
        let request = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Device {}", device_token));
        Self::send(request).await
    }

    /// PUT one part body to a presigned URL and return its ETag.
    pub async fn put_part(&self, url: &str, body: Vec<u8>) -> Result<String> {
        let resp = self
            .client
            .put(url)
            .timeout(part_upload_timeout(body.len() as u64))
            .body(body)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(relay_error(status, &body));
        }

        resp.headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| CloudVaultError::Transport("Part upload returned no ETag".to_string()))
    }

    /// Upload a local file as a snapshot through the multipart pipeline.
    ///
    /// Any failure after the session is opened aborts it before the error
    /// is returned.
    pub async fn upload_snapshot(
        &self,
        snapshot_id: &str,
        path: &Path,
        part_size_bytes: Option<u64>,
    ) -> Result<CompletedUpload> {
        let size_bytes = tokio::fs::metadata(path).await.map_err(transport)?.len();
        let session = self
            .backup_init(&InitBackupRequest {
                snapshot_id: snapshot_id.to_string(),
                size_bytes,
                part_size_bytes,
                content_type: None,
            })
            .await?;

        tracing::info!(
            key = %session.key,
            part_count = session.part_count,
            "Opened backup session"
        );

        match self.upload_parts(&session, path, size_bytes).await {
            Ok(completed) => Ok(completed),
            Err(e) => {
                let abort = AbortBackupRequest {
                    key: session.key.clone(),
                    upload_id: session.upload_id.clone(),
                };
                if let Err(abort_err) = self.backup_abort(&abort).await {
                    tracing::warn!(key = %session.key, "Failed to abort backup session: {}", abort_err);
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        session: &InitBackupResponse,
        path: &Path,
        size_bytes: u64,
    ) -> Result<CompletedUpload> {
        let plan = UploadPlan {
            size_bytes,
            part_size_bytes: session.part_size_bytes,
            part_count: session.part_count,
        };
        if plan.part_size_bytes == 0
            || size_bytes.div_ceil(plan.part_size_bytes) != u64::from(plan.part_count)
        {
            return Err(CloudVaultError::Transport(
                "Relay returned an inconsistent upload plan".to_string(),
            ));
        }
        let mut file = tokio::fs::File::open(path).await.map_err(transport)?;
        let numbers: Vec<u32> = (1..=session.part_count).collect();
        let mut parts = Vec::with_capacity(numbers.len());

        for batch in numbers.chunks(session.max_parts_per_request.max(1)) {
            let presigned = self
                .backup_presign_parts(&PresignPartsRequest {
                    key: session.key.clone(),
                    upload_id: session.upload_id.clone(),
                    part_numbers: batch.to_vec(),
                    expires_in_seconds: None,
                })
                .await?;

            for part in presigned.urls {
                let (offset, len) = plan.part_range(part.part_number).ok_or_else(|| {
                    CloudVaultError::Transport(format!("Unexpected part {}", part.part_number))
                })?;
                let mut body = vec![0u8; len as usize];
                file.seek(SeekFrom::Start(offset)).await.map_err(transport)?;
                file.read_exact(&mut body).await.map_err(transport)?;

                let etag = self.put_part(&part.url, body).await?;
                tracing::debug!(part_number = part.part_number, "Uploaded part");
                parts.push(CompletedPart {
                    part_number: part.part_number,
                    etag,
                });
            }
        }

        self.backup_complete(&CompleteBackupRequest {
            key: session.key.clone(),
            upload_id: session.upload_id.clone(),
            parts,
            expected_part_count: Some(session.part_count),
        })
        .await
    }

    // --- Internal helpers ---

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.relay_url, path);
        let request = self
            .client
            .post(&url)
            .bearer_auth(&self.bearer_token)
            .json(body);
        Self::send(request).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.relay_url, path);
        let request = self.client.get(&url).bearer_auth(&self.bearer_token);
        Self::send(request).await
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let resp = request
            .timeout(API_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(relay_error(status, &body));
        }

        resp.json()
            .await
            .map_err(|e| CloudVaultError::Transport(format!("Invalid relay response: {}", e)))
    }
}
