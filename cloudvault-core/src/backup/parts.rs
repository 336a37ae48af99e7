//! Part list validation for presign and complete requests.
//!
//! Both functions are pure: they run before any backend call, so a request
//! rejected here never reaches object storage.

use crate::backup::models::CompletedPart;
use crate::backup::MAX_PARTS;
use crate::{CloudVaultError, Result};
use std::collections::BTreeSet;

fn check_part_number(part_number: u32) -> Result<()> {
    if part_number == 0 || part_number > MAX_PARTS {
        return Err(CloudVaultError::InvalidInput(format!(
            "partNumber {} outside 1..={}",
            part_number, MAX_PARTS
        )));
    }
    Ok(())
}

/// Dedupe, range-check and sort part numbers for presigning.
pub fn normalize_part_numbers(part_numbers: &[u32]) -> Result<Vec<u32>> {
    if part_numbers.is_empty() {
        return Err(CloudVaultError::InvalidInput(
            "partNumbers must not be empty".to_string(),
        ));
    }

    let mut unique = BTreeSet::new();
    for &part_number in part_numbers {
        check_part_number(part_number)?;
        unique.insert(part_number);
    }
    Ok(unique.into_iter().collect())
}

/// Validate the part list of a completion request and sort it ascending.
///
/// Duplicated part numbers are errors rather than being merged: two
/// different ETags for one part cannot both be right. With
/// `expected_part_count = N` the list must be exactly `1..=N`.
pub fn normalize_completed_parts(
    parts: Vec<CompletedPart>,
    expected_part_count: Option<u32>,
) -> Result<Vec<CompletedPart>> {
    if parts.is_empty() {
        return Err(CloudVaultError::InvalidInput(
            "parts must not be empty".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut normalized = Vec::with_capacity(parts.len());
    for part in parts {
        check_part_number(part.part_number)?;
        if !seen.insert(part.part_number) {
            return Err(CloudVaultError::InvalidInput(format!(
                "Duplicate partNumber {}",
                part.part_number
            )));
        }
        let etag = part.etag.trim();
        if etag.trim_matches('"').is_empty() {
            return Err(CloudVaultError::InvalidInput(format!(
                "Missing etag for part {}",
                part.part_number
            )));
        }
        normalized.push(CompletedPart {
            part_number: part.part_number,
            etag: etag.to_string(),
        });
    }
    normalized.sort_by_key(|p| p.part_number);

    if let Some(expected) = expected_part_count {
        if expected == 0 || expected > MAX_PARTS {
            return Err(CloudVaultError::InvalidInput(format!(
                "expectedPartCount must be within 1..={}",
                MAX_PARTS
            )));
        }
        let contiguous = normalized.len() == expected as usize
            && normalized
                .iter()
                .zip(1u32..)
                .all(|(part, n)| part.part_number == n);
        if !contiguous {
            return Err(CloudVaultError::InvalidInput(format!(
                "Expected parts 1..={} without gaps",
                expected
            )));
        }
    }

    Ok(normalized)
}
