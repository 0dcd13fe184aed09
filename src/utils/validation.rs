//! Backend-agnostic rules applied before a part or a completion request is accepted.

use crate::services::upload_service::UploadError;
use std::collections::{BTreeSet, HashSet};

/// Maximum length of a target name in bytes
pub const MAX_TARGET_NAME_LEN: usize = 1024;

pub fn validate_target_name(name: &str) -> Result<(), UploadError> {
    if name.trim().is_empty() {
        return Err(UploadError::InvalidArgument(
            "target name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_TARGET_NAME_LEN {
        return Err(UploadError::InvalidArgument(format!(
            "target name exceeds {} bytes",
            MAX_TARGET_NAME_LEN
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(UploadError::InvalidArgument(
            "target name contains control characters".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_declared_size(size: u64, max_size: u64) -> Result<(), UploadError> {
    if size > max_size {
        return Err(UploadError::InvalidArgument(format!(
            "declared size {} exceeds maximum of {} bytes",
            size, max_size
        )));
    }
    Ok(())
}

/// Part numbers are 1-based and capped by `max_parts`.
pub fn validate_part_number(part_number: u32, max_parts: u32) -> Result<(), UploadError> {
    if part_number < 1 || part_number > max_parts {
        return Err(UploadError::InvalidPart(format!(
            "part number {} is outside [1, {}]",
            part_number, max_parts
        )));
    }
    Ok(())
}

pub fn validate_part_payload(part_number: u32, len: u64, max_size: u64) -> Result<(), UploadError> {
    if len == 0 {
        return Err(UploadError::InvalidPart(format!(
            "part {} has an empty payload",
            part_number
        )));
    }

    if len > max_size {
        return Err(UploadError::InvalidPart(format!(
            "part {} is {} bytes, above the {} byte maximum",
            part_number, len, max_size
        )));
    }

    Ok(())
}

/// Only the last part in the final byte order may be smaller than `minimum`.
pub fn validate_part_size(
    part_number: u32,
    size: u64,
    is_last: bool,
    minimum: u64,
) -> Result<(), UploadError> {
    if !is_last && size < minimum {
        return Err(UploadError::PartTooSmall {
            part_number,
            size,
            minimum,
        });
    }
    Ok(())
}

/// Checks that `order` names every uploaded part exactly once and nothing else.
///
/// Entries are scanned in declared order, so the first offending number is
/// the one reported. Parts that were uploaded but never referenced are
/// reported as missing from the declared order.
pub fn validate_declared_order(
    order: &[u32],
    manifest_keys: &BTreeSet<u32>,
) -> Result<(), UploadError> {
    if order.is_empty() {
        return Err(UploadError::InvalidArgument(
            "completion requires at least one part".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(order.len());
    for &part_number in order {
        if !seen.insert(part_number) {
            return Err(UploadError::DuplicatePart(part_number));
        }
        if !manifest_keys.contains(&part_number) {
            return Err(UploadError::MissingPart(part_number));
        }
    }

    if let Some(unreferenced) = manifest_keys.iter().find(|n| !seen.contains(n)) {
        return Err(UploadError::MissingPart(*unreferenced));
    }

    Ok(())
}
