//! ZIP enumeration and bounded inflation.

use std::io::{Cursor, Read};

use zip::ZipArchive;

use super::{ArchiveEntry, ExtractedEntries, ExtractionOptions, GuardError, SizeBudget};

const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const EOCD_MIN_LEN: usize = 22;
const ZIP64_LOCATOR_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x07];
const ZIP64_LOCATOR_LEN: usize = 20;
const ZIP64_EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4B, 0x06, 0x06];
const ZIP64_EOCD_LEN: usize = 56;

fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
    let b = bytes.get(at..at + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(b);
    Some(u64::from_le_bytes(buf))
}

/// Reads the entry count recorded in the end-of-central-directory record.
///
/// This is a cheap scan of the archive tail so absurd entry counts can be
/// rejected before the central directory is parsed at all.
pub(crate) fn declared_entry_count(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < EOCD_MIN_LEN {
        return None;
    }
    let last = bytes.len() - EOCD_MIN_LEN;
    let first = last.saturating_sub(u16::MAX as usize);

    let eocd = (first..=last)
        .rev()
        .find(|&i| bytes[i..i + 4] == EOCD_SIGNATURE)?;
    let total = read_u16(bytes, eocd + 10)?;

    if total != u16::MAX {
        return Some(total as u64);
    }

    // Zip64: follow the locator to the zip64 end-of-central-directory record.
    let locator = eocd.checked_sub(ZIP64_LOCATOR_LEN)?;
    if bytes[locator..locator + 4] != ZIP64_LOCATOR_SIGNATURE {
        return Some(total as u64);
    }
    let record = usize::try_from(read_u64(bytes, locator + 8)?).ok()?;
    if record.checked_add(ZIP64_EOCD_LEN)? > bytes.len()
        || bytes[record..record + 4] != ZIP64_EOCD_SIGNATURE
    {
        return Some(total as u64);
    }
    read_u64(bytes, record + 32)
}

fn open(bytes: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, GuardError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| GuardError::Malformed(format!("Failed to read zip archive: {e}")))
}

fn collect_entries(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<Vec<ArchiveEntry>, GuardError> {
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        // raw access reads header metadata only, nothing is decompressed
        let file = archive
            .by_index_raw(i)
            .map_err(|e| GuardError::Malformed(format!("Failed to read entry {i}: {e}")))?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            declared_size: file.size(),
            compressed_size: file.compressed_size(),
            is_dir: file.is_dir(),
            encrypted: file.encrypted(),
        });
    }
    Ok(entries)
}

pub(crate) fn list_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, GuardError> {
    let mut archive = open(bytes)?;
    collect_entries(&mut archive)
}

pub(crate) fn extract(
    bytes: &[u8],
    options: &ExtractionOptions,
) -> Result<ExtractedEntries, GuardError> {
    if let Some(declared) = declared_entry_count(bytes) {
        if declared > options.max_files as u64 {
            return Err(GuardError::QuotaExceeded(format!(
                "archive declares {} entries, maximum is {}",
                declared, options.max_files
            )));
        }
    }

    let mut archive = open(bytes)?;
    let entries = collect_entries(&mut archive)?;
    let names = super::check_entries(&entries, options)?;

    let mut budget = SizeBudget::new(options.max_total_size);
    let mut extracted = ExtractedEntries::new();

    for (i, (entry, name)) in entries.iter().zip(names).enumerate() {
        if entry.is_dir {
            continue;
        }

        let file = archive
            .by_index(i)
            .map_err(|e| GuardError::Malformed(format!("Failed to open entry '{name}': {e}")))?;

        // Never trust the declared size: read at most one byte past the budget.
        let cap = budget.remaining();
        let mut data = Vec::with_capacity(entry.declared_size.min(cap).min(1 << 20) as usize);
        file.take(cap.saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| GuardError::Malformed(format!("Failed to inflate '{name}': {e}")))?;
        budget.consume(data.len() as u64)?;

        if extracted.insert(name.clone(), data).is_some() {
            return Err(GuardError::Malformed(format!("duplicate entry '{name}'")));
        }
    }

    Ok(extracted)
}
