//! Part sizing and request clamping.

use crate::backup::{
    DEFAULT_PART_SIZE_BYTES, DEFAULT_PRESIGN_TTL_SECS, MAX_PARTS, MAX_PART_SIZE_BYTES,
    MAX_PRESIGN_BATCH_SIZE, MAX_PRESIGN_TTL_SECS, MIN_PART_SIZE_BYTES, MIN_PRESIGN_TTL_SECS,
};
use crate::{CloudVaultError, Result};

/// How a snapshot of `size_bytes` is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub size_bytes: u64,
    pub part_size_bytes: u64,
    pub part_count: u32,
}

impl UploadPlan {
    /// Byte range `(offset, len)` of a 1-based part, or `None` past the end.
    pub fn part_range(&self, part_number: u32) -> Option<(u64, u64)> {
        if part_number == 0 || part_number > self.part_count {
            return None;
        }
        let offset = (part_number as u64 - 1) * self.part_size_bytes;
        let len = self.part_size_bytes.min(self.size_bytes - offset);
        Some((offset, len))
    }
}

pub fn clamp_part_size(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_PART_SIZE_BYTES)
        .clamp(MIN_PART_SIZE_BYTES, MAX_PART_SIZE_BYTES)
}

pub fn clamp_presign_ttl(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_PRESIGN_TTL_SECS)
        .clamp(MIN_PRESIGN_TTL_SECS, MAX_PRESIGN_TTL_SECS)
}

pub fn clamp_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_PRESIGN_BATCH_SIZE)
}

/// Split `size_bytes` into parts of the clamped part size.
pub fn plan_upload(size_bytes: u64, part_size_bytes: Option<u64>) -> Result<UploadPlan> {
    if size_bytes == 0 {
        return Err(CloudVaultError::InvalidInput(
            "sizeBytes must be greater than zero".to_string(),
        ));
    }

    let part_size_bytes = clamp_part_size(part_size_bytes);
    let part_count = size_bytes.div_ceil(part_size_bytes);
    if part_count > MAX_PARTS as u64 {
        return Err(CloudVaultError::InvalidInput(format!(
            "Snapshot needs {} parts at {} bytes per part (max {})",
            part_count, part_size_bytes, MAX_PARTS
        )));
    }

    Ok(UploadPlan {
        size_bytes,
        part_size_bytes,
        part_count: part_count as u32,
    })
}
