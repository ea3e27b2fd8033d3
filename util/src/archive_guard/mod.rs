//! # Archive Guard
//!
//! Validates and unpacks untrusted archive containers (ZIP and RAR) entirely in memory.
//!
//! Every limit in [`ExtractionOptions`] is checked against the archive's *declared*
//! metadata before a single payload is inflated, and the actual inflated byte count is
//! checked again while reading. Any violation aborts the whole extraction: callers get a
//! [`ExtractionResult::Failure`] and never a partial entry map.
//!
//! Nested archives are returned as opaque bytes and are never expanded recursively.

mod rar_reader;
mod types;
mod zip_reader;

pub use types::{
    ArchiveEntry, ArchiveFormat, ExtractedEntries, ExtractionOptions, ExtractionResult,
    GuardError, ValidationReport,
};

use tracing::{debug, warn};

/// Smallest byte count that can carry any of the accepted signatures.
pub const MIN_ARCHIVE_SIZE: usize = 4;

const ZIP_SIGNATURES: [[u8; 4]; 3] = [
    [0x50, 0x4B, 0x03, 0x04], // local file header
    [0x50, 0x4B, 0x05, 0x06], // empty archive
    [0x50, 0x4B, 0x07, 0x08], // spanned archive
];

pub(crate) const RAR4_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
pub(crate) const RAR5_SIGNATURE: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

/// Detect the container format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<ArchiveFormat> {
    if bytes.len() < MIN_ARCHIVE_SIZE {
        return None;
    }
    if ZIP_SIGNATURES.iter().any(|sig| bytes.starts_with(sig)) {
        return Some(ArchiveFormat::Zip);
    }
    if bytes.starts_with(&RAR5_SIGNATURE) || bytes.starts_with(&RAR4_SIGNATURE) {
        return Some(ArchiveFormat::Rar);
    }
    None
}

/// Checks size and magic signature. Never panics and never inflates anything.
pub fn validate(bytes: &[u8]) -> ValidationReport {
    let mut errors = Vec::new();

    if bytes.len() < MIN_ARCHIVE_SIZE {
        errors.push(format!(
            "File too small to be an archive ({} bytes, need at least {})",
            bytes.len(),
            MIN_ARCHIVE_SIZE
        ));
        return ValidationReport {
            is_valid: false,
            errors,
            format: None,
        };
    }

    let format = detect_format(bytes);
    if format.is_none() {
        errors.push(format!(
            "No valid signature found (leading bytes {:02X} {:02X} {:02X} {:02X})",
            bytes[0], bytes[1], bytes[2], bytes[3]
        ));
    }

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        format,
    }
}

/// Enumerates entry metadata without inflating any payload.
pub fn list_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, GuardError> {
    match require_format(bytes)? {
        ArchiveFormat::Zip => zip_reader::list_entries(bytes),
        ArchiveFormat::Rar => rar_reader::list_entries(bytes),
    }
}

/// Safely unpacks an archive under `options`.
pub fn extract(bytes: &[u8], options: &ExtractionOptions) -> ExtractionResult {
    let outcome = require_format(bytes).and_then(|format| match format {
        ArchiveFormat::Zip => zip_reader::extract(bytes, options),
        ArchiveFormat::Rar => rar_reader::extract(bytes, options),
    });

    match &outcome {
        Ok(entries) => debug!(entries = entries.len(), "archive extracted"),
        Err(err) => warn!(error = %err, "archive extraction rejected"),
    }
    outcome.into()
}

fn require_format(bytes: &[u8]) -> Result<ArchiveFormat, GuardError> {
    let report = validate(bytes);
    match report.format {
        Some(format) if report.is_valid => Ok(format),
        _ => Err(GuardError::Validation(report.errors.join("; "))),
    }
}

/// Normalizes an entry name to a relative `/`-separated path.
///
/// Rejects absolute paths, drive prefixes, NUL bytes and any `..` segment, so the
/// result can never resolve outside the extraction root.
pub fn normalize_entry_path(name: &str) -> Result<String, GuardError> {
    let unified = name.replace('\\', "/");
    let raw = unified.as_bytes();

    let has_drive = raw.len() >= 2 && raw[1] == b':' && raw[0].is_ascii_alphabetic();
    if unified.contains('\0') || unified.starts_with('/') || has_drive {
        return Err(GuardError::PathTraversal(name.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(GuardError::PathTraversal(name.to_string())),
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return Err(GuardError::Malformed(format!("empty entry name '{name}'")));
    }
    Ok(parts.join("/"))
}

/// Number of directories above the entry.
fn entry_depth(normalized: &str) -> usize {
    normalized.matches('/').count()
}

fn extension_allowed(normalized: &str, allowed: &[String]) -> bool {
    let file_name = normalized.rsplit('/').next().unwrap_or(normalized);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => allowed
            .iter()
            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

/// Applies every limit to the enumerated metadata. Returns the normalized names.
pub(crate) fn check_entries(
    entries: &[ArchiveEntry],
    options: &ExtractionOptions,
) -> Result<Vec<String>, GuardError> {
    if entries.len() > options.max_files {
        return Err(GuardError::QuotaExceeded(format!(
            "archive has {} entries, maximum is {}",
            entries.len(),
            options.max_files
        )));
    }

    let mut declared_total: u64 = 0;
    let mut names = Vec::with_capacity(entries.len());

    for entry in entries {
        let normalized = normalize_entry_path(&entry.name)?;

        let depth = entry_depth(&normalized);
        if depth > options.max_depth {
            return Err(GuardError::QuotaExceeded(format!(
                "entry '{}' is nested {} levels deep, maximum is {}",
                normalized, depth, options.max_depth
            )));
        }

        if entry.encrypted {
            return Err(GuardError::Malformed(
                "encrypted entries are not supported".to_string(),
            ));
        }

        if !entry.is_dir {
            if let Some(allowed) = &options.allowed_extensions {
                if !extension_allowed(&normalized, allowed) {
                    return Err(GuardError::DisallowedExtension(normalized));
                }
            }
        }

        declared_total = declared_total.saturating_add(entry.declared_size);
        if declared_total > options.max_total_size {
            return Err(GuardError::QuotaExceeded(format!(
                "declared uncompressed size exceeds {} bytes",
                options.max_total_size
            )));
        }

        names.push(normalized);
    }

    Ok(names)
}

/// Tracks inflated bytes against `max_total_size`.
pub(crate) struct SizeBudget {
    remaining: u64,
    limit: u64,
}

impl SizeBudget {
    pub(crate) fn new(limit: u64) -> Self {
        Self {
            remaining: limit,
            limit,
        }
    }

    pub(crate) fn remaining(&self) -> u64 {
        self.remaining
    }

    pub(crate) fn consume(&mut self, n: u64) -> Result<(), GuardError> {
        if n > self.remaining {
            return Err(GuardError::QuotaExceeded(format!(
                "inflated size exceeds {} bytes",
                self.limit
            )));
        }
        self.remaining -= n;
        Ok(())
    }
}
