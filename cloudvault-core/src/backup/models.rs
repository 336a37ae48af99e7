//! Backup wire types and the upload session state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of a multipart upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    Created,
    Completed,
    Aborted,
}

/// Operations that move an upload session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadAction {
    Complete,
    Abort,
}

impl UploadState {
    /// Transition table. `None` means the backend must reject the call.
    ///
    /// | from      | action   | to        |
    /// |-----------|----------|-----------|
    /// | created   | complete | completed |
    /// | created   | abort    | aborted   |
    /// | aborted   | abort    | aborted   |
    /// | completed | complete | completed |
    ///
    /// The two self-loops make abort and complete replays idempotent.
    pub fn apply(self, action: UploadAction) -> Option<UploadState> {
        match (self, action) {
            (Self::Created, UploadAction::Complete) => Some(Self::Completed),
            (Self::Created, UploadAction::Abort) => Some(Self::Aborted),
            (Self::Aborted, UploadAction::Abort) => Some(Self::Aborted),
            (Self::Completed, UploadAction::Complete) => Some(Self::Completed),
            (Self::Aborted, UploadAction::Complete) | (Self::Completed, UploadAction::Abort) => None,
        }
    }

    pub fn accepts_parts(self) -> bool {
        self == Self::Created
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPart {
    pub part_number: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Result of a successful completion, as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub etag: String,
    pub location: String,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitBackupRequest {
    pub snapshot_id: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub part_size_bytes: Option<u64>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitBackupResponse {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_size_bytes: u64,
    pub part_count: u32,
    pub max_parts_per_request: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignPartsRequest {
    pub key: String,
    pub upload_id: String,
    pub part_numbers: Vec<u32>,
    #[serde(default)]
    pub expires_in_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignPartsResponse {
    pub urls: Vec<PresignedPart>,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBackupRequest {
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
    #[serde(default)]
    pub expected_part_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortBackupRequest {
    pub key: String,
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortBackupResponse {
    pub aborted: bool,
}
