//! Backup session orchestration over an [`ObjectStore`].

use crate::backup::key::BackupKey;
use crate::backup::models::{
    AbortBackupRequest, AbortBackupResponse, CompleteBackupRequest, CompletedUpload,
    InitBackupRequest, InitBackupResponse, PresignPartsRequest, PresignPartsResponse,
};
use crate::backup::parts::{normalize_completed_parts, normalize_part_numbers};
use crate::backup::plan::{clamp_batch_size, clamp_presign_ttl, plan_upload};
use crate::backup::{DEFAULT_CONTENT_TYPE, DEFAULT_PRESIGN_BATCH_SIZE};
use crate::owner::OwnerId;
use crate::storage::ObjectStore;
use crate::{CloudVaultError, Result};
use std::sync::Arc;

const MAX_CONTENT_TYPE_LEN: usize = 255;

#[derive(Debug, Clone, Copy)]
pub struct BackupConfig {
    /// Part numbers presigned per backend call.
    pub presign_batch_size: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            presign_batch_size: DEFAULT_PRESIGN_BATCH_SIZE,
        }
    }
}

/// Stateless backup pipeline. All session state lives in the object store.
pub struct BackupPipeline<O> {
    store: Arc<O>,
    batch_size: usize,
}

impl<O> Clone for BackupPipeline<O> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            batch_size: self.batch_size,
        }
    }
}

fn normalize_content_type(content_type: Option<&str>) -> Result<String> {
    let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE);
    if content_type.chars().any(char::is_control) {
        return Err(CloudVaultError::InvalidInput(
            "contentType must not contain control characters".to_string(),
        ));
    }
    let content_type = content_type.trim();
    if content_type.is_empty() || content_type.len() > MAX_CONTENT_TYPE_LEN {
        return Err(CloudVaultError::InvalidInput(
            "contentType must be 1-255 printable characters".to_string(),
        ));
    }
    Ok(content_type.to_string())
}

fn require_upload_id(upload_id: &str) -> Result<&str> {
    let upload_id = upload_id.trim();
    if upload_id.is_empty() {
        return Err(CloudVaultError::InvalidInput(
            "uploadId must not be empty".to_string(),
        ));
    }
    Ok(upload_id)
}

impl<O: ObjectStore> BackupPipeline<O> {
    pub fn new(store: Arc<O>, config: BackupConfig) -> Self {
        Self {
            store,
            batch_size: clamp_batch_size(config.presign_batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Open a multipart upload for a new snapshot of `owner`.
    pub async fn create_session(
        &self,
        owner: &OwnerId,
        request: InitBackupRequest,
    ) -> Result<InitBackupResponse> {
        let key = BackupKey::for_snapshot(owner, request.snapshot_id.trim())?;
        let plan = plan_upload(request.size_bytes, request.part_size_bytes)?;
        let content_type = normalize_content_type(request.content_type.as_deref())?;

        let upload_id = self
            .store
            .create_multipart_upload(&key, &content_type)
            .await?;

        tracing::info!(
            owner = %owner,
            key = %key,
            upload_id = %upload_id,
            part_count = plan.part_count,
            "Created backup session"
        );

        Ok(InitBackupResponse {
            bucket: self.store.bucket().to_string(),
            key: key.to_string(),
            upload_id,
            part_size_bytes: plan.part_size_bytes,
            part_count: plan.part_count,
            max_parts_per_request: self.batch_size,
        })
    }

    /// Presign PUT URLs for a set of parts, one backend call per batch.
    ///
    /// Batches run sequentially; a backend failure aborts the whole request
    /// and no partial result is returned.
    pub async fn presign_parts(
        &self,
        owner: &OwnerId,
        request: PresignPartsRequest,
    ) -> Result<PresignPartsResponse> {
        let key = BackupKey::parse_owned(&request.key, owner)?;
        let upload_id = require_upload_id(&request.upload_id)?;
        let part_numbers = normalize_part_numbers(&request.part_numbers)?;
        let expires_in_seconds = clamp_presign_ttl(request.expires_in_seconds);

        let mut urls = Vec::with_capacity(part_numbers.len());
        for batch in part_numbers.chunks(self.batch_size) {
            let signed = self
                .store
                .presign_upload_parts(&key, upload_id, batch, expires_in_seconds)
                .await?;
            urls.extend(signed);
        }
        urls.sort_by_key(|p| p.part_number);

        tracing::debug!(
            key = %key,
            upload_id,
            parts = urls.len(),
            "Presigned upload parts"
        );

        Ok(PresignPartsResponse {
            urls,
            expires_in_seconds,
        })
    }

    /// Stitch uploaded parts into the final object.
    ///
    /// The part list is fully validated before the backend is called. A
    /// backend failure leaves the upload open; the caller decides whether to
    /// retry or abort.
    pub async fn complete(
        &self,
        owner: &OwnerId,
        request: CompleteBackupRequest,
    ) -> Result<CompletedUpload> {
        let key = BackupKey::parse_owned(&request.key, owner)?;
        let upload_id = require_upload_id(&request.upload_id)?;
        let parts = normalize_completed_parts(request.parts, request.expected_part_count)?;

        let completed = self
            .store
            .complete_multipart_upload(&key, upload_id, &parts)
            .await?;

        tracing::info!(
            owner = %owner,
            key = %key,
            upload_id,
            parts = parts.len(),
            "Completed backup session"
        );
        Ok(completed)
    }

    pub async fn abort(
        &self,
        owner: &OwnerId,
        request: AbortBackupRequest,
    ) -> Result<AbortBackupResponse> {
        let key = BackupKey::parse_owned(&request.key, owner)?;
        let upload_id = require_upload_id(&request.upload_id)?;

        self.store.abort_multipart_upload(&key, upload_id).await?;

        tracing::info!(owner = %owner, key = %key, upload_id, "Aborted backup session");
        Ok(AbortBackupResponse { aborted: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::models::{CompletedPart, PresignedPart};
    use crate::storage::BackendError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        presign_calls: Mutex<Vec<Vec<u32>>>,
        complete_calls: Mutex<Vec<Vec<CompletedPart>>>,
        abort_calls: Mutex<usize>,
        fail_presign: bool,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        fn bucket(&self) -> &str {
            "test-bucket"
        }

        async fn create_multipart_upload(
            &self,
            _key: &BackupKey,
            _content_type: &str,
        ) -> std::result::Result<String, BackendError> {
            Ok("upload-1".to_string())
        }

        async fn presign_upload_parts(
            &self,
            _key: &BackupKey,
            upload_id: &str,
            part_numbers: &[u32],
            _expires_in_secs: u64,
        ) -> std::result::Result<Vec<PresignedPart>, BackendError> {
            if self.fail_presign {
                return Err(BackendError::NoSuchUpload);
            }
            self.presign_calls.lock().unwrap().push(part_numbers.to_vec());
            // Reverse order to prove the pipeline re-sorts
            Ok(part_numbers
                .iter()
                .rev()
                .map(|&n| PresignedPart {
                    part_number: n,
                    url: format!("https://s3.test/{}/{}", upload_id, n),
                })
                .collect())
        }

        async fn complete_multipart_upload(
            &self,
            key: &BackupKey,
            _upload_id: &str,
            parts: &[CompletedPart],
        ) -> std::result::Result<CompletedUpload, BackendError> {
            self.complete_calls.lock().unwrap().push(parts.to_vec());
            Ok(CompletedUpload {
                etag: "etag-final".to_string(),
                location: format!("https://s3.test/{}", key),
                version_id: None,
            })
        }

        async fn abort_multipart_upload(
            &self,
            _key: &BackupKey,
            _upload_id: &str,
        ) -> std::result::Result<(), BackendError> {
            *self.abort_calls.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("u1").unwrap()
    }

    fn pipeline(batch: usize) -> (Arc<RecordingStore>, BackupPipeline<RecordingStore>) {
        let store = Arc::new(RecordingStore::default());
        let pipeline = BackupPipeline::new(
            Arc::clone(&store),
            BackupConfig {
                presign_batch_size: batch,
            },
        );
        (store, pipeline)
    }

    fn part(n: u32) -> CompletedPart {
        CompletedPart {
            part_number: n,
            etag: format!("\"etag-{}\"", n),
        }
    }

    #[tokio::test]
    async fn create_session_plans_parts() {
        let (_, pipeline) = pipeline(8);
        let response = pipeline
            .create_session(
                &owner(),
                InitBackupRequest {
                    snapshot_id: "snap-1".to_string(),
                    size_bytes: 300 * 1024 * 1024,
                    part_size_bytes: None,
                    content_type: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.bucket, "test-bucket");
        assert_eq!(response.key, "vaults/u1/snap-1.enc");
        assert_eq!(response.upload_id, "upload-1");
        assert_eq!(response.part_size_bytes, 128 * 1024 * 1024);
        assert_eq!(response.part_count, 3);
        assert_eq!(response.max_parts_per_request, 8);
    }

    #[test]
    fn content_type_control_chars_are_not_trimmed_away() {
        assert_eq!(
            normalize_content_type(Some(" text/plain ")).unwrap(),
            "text/plain"
        );
        assert_eq!(
            normalize_content_type(None).unwrap(),
            DEFAULT_CONTENT_TYPE
        );
        for bad in ["text/plain\n", "\ttext/plain", "text/\u{7f}plain", "   "] {
            assert!(matches!(
                normalize_content_type(Some(bad)),
                Err(CloudVaultError::InvalidInput(_))
            ));
        }
        assert!(normalize_content_type(Some(&"a".repeat(256))).is_err());
    }

    #[tokio::test]
    async fn create_session_rejects_bad_input() {
        let (_, pipeline) = pipeline(8);
        let request = |snapshot: &str, size: u64, content_type: Option<&str>| InitBackupRequest {
            snapshot_id: snapshot.to_string(),
            size_bytes: size,
            part_size_bytes: None,
            content_type: content_type.map(str::to_string),
        };

        for bad in [
            request("../x", 10, None),
            request("snap", 0, None),
            request("snap", 10, Some("")),
            request("snap", 10, Some("text/plain\n")),
        ] {
            assert!(matches!(
                pipeline.create_session(&owner(), bad).await,
                Err(CloudVaultError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn presign_batches_sequentially_and_sorts() {
        let (store, pipeline) = pipeline(3);
        let response = pipeline
            .presign_parts(
                &owner(),
                PresignPartsRequest {
                    key: "vaults/u1/snap-1.enc".to_string(),
                    upload_id: "upload-1".to_string(),
                    part_numbers: vec![5, 1, 3, 2, 4, 3],
                    expires_in_seconds: Some(10),
                },
            )
            .await
            .unwrap();

        let calls = store.presign_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec![1, 2, 3], vec![4, 5]]);

        let numbers: Vec<u32> = response.urls.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert_eq!(response.expires_in_seconds, 60);
    }

    #[tokio::test]
    async fn presign_rejects_foreign_key_and_bad_parts() {
        let (store, pipeline) = pipeline(3);
        let request = |key: &str, parts: Vec<u32>| PresignPartsRequest {
            key: key.to_string(),
            upload_id: "upload-1".to_string(),
            part_numbers: parts,
            expires_in_seconds: None,
        };

        assert!(matches!(
            pipeline
                .presign_parts(&owner(), request("vaults/u2/snap-1.enc", vec![1]))
                .await,
            Err(CloudVaultError::Forbidden)
        ));
        assert!(matches!(
            pipeline
                .presign_parts(&owner(), request("vaults/u1/snap-1.enc", vec![]))
                .await,
            Err(CloudVaultError::InvalidInput(_))
        ));
        assert!(matches!(
            pipeline
                .presign_parts(&owner(), request("vaults/u1/snap-1.enc", vec![0]))
                .await,
            Err(CloudVaultError::InvalidInput(_))
        ));
        assert!(store.presign_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn presign_backend_failure_propagates() {
        let store = Arc::new(RecordingStore {
            fail_presign: true,
            ..Default::default()
        });
        let pipeline = BackupPipeline::new(store, BackupConfig::default());
        let result = pipeline
            .presign_parts(
                &owner(),
                PresignPartsRequest {
                    key: "vaults/u1/snap-1.enc".to_string(),
                    upload_id: "upload-1".to_string(),
                    part_numbers: vec![1],
                    expires_in_seconds: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(CloudVaultError::Backend(BackendError::NoSuchUpload))
        ));
    }

    #[tokio::test]
    async fn complete_validates_before_backend() {
        let (store, pipeline) = pipeline(8);
        let result = pipeline
            .complete(
                &owner(),
                CompleteBackupRequest {
                    key: "vaults/u1/snap-1.enc".to_string(),
                    upload_id: "upload-1".to_string(),
                    parts: vec![part(1), part(2), part(4)],
                    expected_part_count: Some(4),
                },
            )
            .await;
        assert!(matches!(result, Err(CloudVaultError::InvalidInput(_))));
        assert!(store.complete_calls.lock().unwrap().is_empty());

        let result = pipeline
            .complete(
                &owner(),
                CompleteBackupRequest {
                    key: "vaults/u2/snap-1.enc".to_string(),
                    upload_id: "upload-1".to_string(),
                    parts: vec![part(1)],
                    expected_part_count: None,
                },
            )
            .await;
        assert!(matches!(result, Err(CloudVaultError::Forbidden)));
        assert!(store.complete_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn complete_sends_sorted_parts() {
        let (store, pipeline) = pipeline(8);
        let completed = pipeline
            .complete(
                &owner(),
                CompleteBackupRequest {
                    key: "vaults/u1/snap-1.enc".to_string(),
                    upload_id: "upload-1".to_string(),
                    parts: vec![part(3), part(1), part(2)],
                    expected_part_count: Some(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.etag, "etag-final");

        let calls = store.complete_calls.lock().unwrap();
        let numbers: Vec<u32> = calls[0].iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn abort_checks_ownership() {
        let (store, pipeline) = pipeline(8);
        let request = |key: &str, upload_id: &str| AbortBackupRequest {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        };

        assert!(matches!(
            pipeline.abort(&owner(), request("vaults/u2/snap-1.enc", "upload-1")).await,
            Err(CloudVaultError::Forbidden)
        ));
        assert!(matches!(
            pipeline.abort(&owner(), request("vaults/u1/snap-1.enc", " ")).await,
            Err(CloudVaultError::InvalidInput(_))
        ));
        let response = pipeline
            .abort(&owner(), request("vaults/u1/snap-1.enc", "upload-1"))
            .await
            .unwrap();
        assert!(response.aborted);
        assert_eq!(*store.abort_calls.lock().unwrap(), 1);
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(pipeline(0).1.batch_size(), 1);
        assert_eq!(pipeline(100).1.batch_size(), 32);
    }
}
