//! Multipart backup pipeline.
//!
//! Large encrypted snapshots bypass the vault sync row and go straight to
//! object storage as an S3-style multipart upload:
//!
//! 1. `create_session` opens an upload under `vaults/<owner>/<snapshot>.enc`
//! 2. `presign_parts` hands out time-limited PUT URLs, batched per backend call
//! 3. the client PUTs each part directly to storage
//! 4. `complete` stitches the parts together, or `abort` releases them
//!
//! The object key is the only authorization boundary: every call re-checks
//! the caller's owner prefix, an upload id alone grants nothing.

pub mod key;
pub mod models;
pub mod parts;
pub mod pipeline;
pub mod plan;

pub use key::BackupKey;
pub use models::{
    AbortBackupRequest, AbortBackupResponse, CompleteBackupRequest, CompletedPart,
    CompletedUpload, InitBackupRequest, InitBackupResponse, PresignPartsRequest,
    PresignPartsResponse, PresignedPart, UploadAction, UploadState,
};
pub use pipeline::{BackupConfig, BackupPipeline};
pub use plan::{plan_upload, UploadPlan};

const MIB: u64 = 1024 * 1024;

pub const MIN_PART_SIZE_BYTES: u64 = 5 * MIB;
pub const MAX_PART_SIZE_BYTES: u64 = 256 * MIB;
pub const DEFAULT_PART_SIZE_BYTES: u64 = 128 * MIB;
pub const MAX_PARTS: u32 = 10_000;

pub const MIN_PRESIGN_TTL_SECS: u64 = 60;
pub const MAX_PRESIGN_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_PRESIGN_TTL_SECS: u64 = 60 * 60;

pub const DEFAULT_PRESIGN_BATCH_SIZE: usize = 8;
pub const MAX_PRESIGN_BATCH_SIZE: usize = 32;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
