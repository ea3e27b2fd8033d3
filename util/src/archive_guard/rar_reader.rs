//! RAR header enumeration and guarded extraction.
//!
//! Block headers are walked directly so every limit is applied before the
//! decoder runs. Decompression itself is delegated to the `rar` crate, which
//! only works on files, so the payload is staged in a temporary directory and
//! read back under the same size budget.
//!
//! The decoder handles single-volume RAR 5 archives whose entries use the
//! store method, without directory records. It copies data areas verbatim and
//! cannot parse RAR 1.5 - 4.x headers. Those inputs still go through every
//! header limit, then fail as `Malformed` instead of reaching the decoder.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::{
    ArchiveEntry, ExtractedEntries, ExtractionOptions, GuardError, RAR4_SIGNATURE,
    RAR5_SIGNATURE, SizeBudget,
};

// RAR 1.5 - 4.x block types and flags
const RAR4_FILE_HEAD: u8 = 0x74;
const RAR4_END_ARCHIVE: u8 = 0x7B;
const RAR4_LONG_BLOCK: u16 = 0x8000;
const RAR4_LARGE_FILE: u16 = 0x0100;
const RAR4_ENCRYPTED: u16 = 0x0004;
const RAR4_DIRECTORY_MASK: u16 = 0x00E0;
const RAR4_FILE_HEAD_FIXED: usize = 32;

// RAR 5 header types and flags
const RAR5_FILE_HEADER: u64 = 2;
const RAR5_ENCRYPTION_HEADER: u64 = 4;
const RAR5_END_ARCHIVE: u64 = 5;
const RAR5_HAS_EXTRA: u64 = 0x01;
const RAR5_HAS_DATA: u64 = 0x02;
const RAR5_DIRECTORY: u64 = 0x01;
const RAR5_HAS_MTIME: u64 = 0x02;
const RAR5_HAS_CRC: u64 = 0x04;
const RAR5_METHOD_SHIFT: u64 = 7;
const RAR5_METHOD_MASK: u64 = 0x07;
const RAR5_STORE: u64 = 0;

fn malformed(msg: &str) -> GuardError {
    GuardError::Malformed(format!("RAR header: {msg}"))
}

fn u16_at(b: &[u8], at: usize) -> Result<u16, GuardError> {
    b.get(at..at + 2)
        .map(|s| u16::from_le_bytes([s[0], s[1]]))
        .ok_or_else(|| malformed("truncated"))
}

fn u32_at(b: &[u8], at: usize) -> Result<u32, GuardError> {
    b.get(at..at + 4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .ok_or_else(|| malformed("truncated"))
}

/// Variable-length integer used by RAR 5 headers. Returns the value and its width.
fn vint_at(b: &[u8], at: usize) -> Result<(u64, usize), GuardError> {
    let mut value: u64 = 0;
    for i in 0..10 {
        let byte = *b.get(at + i).ok_or_else(|| malformed("truncated vint"))?;
        value |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(malformed("vint too long"))
}

fn name_from(raw: &[u8]) -> String {
    // RAR 4 unicode names carry an ASCII name, a NUL, then an encoded form.
    let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

fn list_rar4(b: &[u8]) -> Result<Vec<ArchiveEntry>, GuardError> {
    let mut entries = Vec::new();
    let mut pos = RAR4_SIGNATURE.len();

    while pos + 7 <= b.len() {
        let head_type = b[pos + 2];
        let flags = u16_at(b, pos + 3)?;
        let head_size = u16_at(b, pos + 5)? as usize;
        if head_size < 7 {
            return Err(malformed("block smaller than its own header"));
        }
        if head_type == RAR4_END_ARCHIVE {
            break;
        }

        let mut add_size: u64 = 0;
        if head_type == RAR4_FILE_HEAD {
            if head_size < RAR4_FILE_HEAD_FIXED {
                return Err(malformed("file header too short"));
            }
            let mut pack_size = u32_at(b, pos + 7)? as u64;
            let mut unp_size = u32_at(b, pos + 11)? as u64;
            let name_size = u16_at(b, pos + 26)? as usize;
            let mut name_at = pos + RAR4_FILE_HEAD_FIXED;
            if flags & RAR4_LARGE_FILE != 0 {
                pack_size |= (u32_at(b, name_at)? as u64) << 32;
                unp_size |= (u32_at(b, name_at + 4)? as u64) << 32;
                name_at += 8;
            }
            let raw_name = b
                .get(name_at..name_at + name_size)
                .ok_or_else(|| malformed("truncated file name"))?;

            entries.push(ArchiveEntry {
                name: name_from(raw_name),
                declared_size: unp_size,
                compressed_size: pack_size,
                is_dir: flags & RAR4_DIRECTORY_MASK == RAR4_DIRECTORY_MASK,
                encrypted: flags & RAR4_ENCRYPTED != 0,
            });
            add_size = pack_size;
        } else if flags & RAR4_LONG_BLOCK != 0 {
            add_size = u32_at(b, pos + 7)? as u64;
        }

        let next = (pos as u64)
            .checked_add(head_size as u64)
            .and_then(|n| n.checked_add(add_size))
            .ok_or_else(|| malformed("block size overflow"))?;
        pos = usize::try_from(next).map_err(|_| malformed("block size overflow"))?;
    }

    Ok(entries)
}

/// A RAR 5 file header plus its compression method.
struct Rar5Entry {
    entry: ArchiveEntry,
    method: u64,
}

fn list_rar5(b: &[u8]) -> Result<Vec<ArchiveEntry>, GuardError> {
    Ok(scan_rar5(b)?.into_iter().map(|e| e.entry).collect())
}

fn scan_rar5(b: &[u8]) -> Result<Vec<Rar5Entry>, GuardError> {
    let mut entries = Vec::new();
    let mut pos = RAR5_SIGNATURE.len();

    while pos + 4 < b.len() {
        let size_at = pos + 4; // skip header CRC32
        let (header_size, width) = vint_at(b, size_at)?;
        let start = size_at + width;
        let end = usize::try_from(header_size)
            .ok()
            .and_then(|h| start.checked_add(h))
            .filter(|&e| e <= b.len())
            .ok_or_else(|| malformed("header exceeds archive"))?;

        let mut p = start;
        let (header_type, w) = vint_at(b, p)?;
        p += w;
        let (header_flags, w) = vint_at(b, p)?;
        p += w;
        if header_flags & RAR5_HAS_EXTRA != 0 {
            let (_, w) = vint_at(b, p)?;
            p += w;
        }
        let mut data_size = 0u64;
        if header_flags & RAR5_HAS_DATA != 0 {
            let (v, w) = vint_at(b, p)?;
            data_size = v;
            p += w;
        }

        match header_type {
            RAR5_END_ARCHIVE => break,
            RAR5_ENCRYPTION_HEADER => {
                return Err(GuardError::Malformed(
                    "encrypted entries are not supported".to_string(),
                ));
            }
            RAR5_FILE_HEADER => {
                let (file_flags, w) = vint_at(b, p)?;
                p += w;
                let (unpacked, w) = vint_at(b, p)?;
                p += w;
                let (_attributes, w) = vint_at(b, p)?;
                p += w;
                if file_flags & RAR5_HAS_MTIME != 0 {
                    p += 4;
                }
                if file_flags & RAR5_HAS_CRC != 0 {
                    p += 4;
                }
                let (compression, w) = vint_at(b, p)?;
                p += w;
                let (_host_os, w) = vint_at(b, p)?;
                p += w;
                let (name_len, w) = vint_at(b, p)?;
                p += w;
                let name_end = usize::try_from(name_len)
                    .ok()
                    .and_then(|n| p.checked_add(n))
                    .filter(|&e| e <= end)
                    .ok_or_else(|| malformed("truncated file name"))?;

                entries.push(Rar5Entry {
                    entry: ArchiveEntry {
                        name: String::from_utf8_lossy(&b[p..name_end]).into_owned(),
                        declared_size: unpacked,
                        compressed_size: data_size,
                        is_dir: file_flags & RAR5_DIRECTORY != 0,
                        encrypted: false,
                    },
                    method: (compression >> RAR5_METHOD_SHIFT) & RAR5_METHOD_MASK,
                });
            }
            _ => {}
        }

        pos = usize::try_from(data_size)
            .ok()
            .and_then(|d| end.checked_add(d))
            .ok_or_else(|| malformed("data size overflow"))?;
    }

    Ok(entries)
}

pub(crate) fn list_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, GuardError> {
    if bytes.starts_with(&RAR5_SIGNATURE) {
        list_rar5(bytes)
    } else if bytes.starts_with(&RAR4_SIGNATURE) {
        list_rar4(bytes)
    } else {
        Err(GuardError::Validation("not a RAR archive".to_string()))
    }
}

fn read_back(
    root: &Path,
    options: &ExtractionOptions,
    budget: &mut SizeBudget,
) -> Result<ExtractedEntries, GuardError> {
    let mut extracted = ExtractedEntries::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| GuardError::Malformed(format!("Failed to walk output: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if extracted.len() >= options.max_files {
            return Err(GuardError::QuotaExceeded(format!(
                "archive produced more than {} files",
                options.max_files
            )));
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| GuardError::PathTraversal(entry.path().display().to_string()))?;
        let name = super::normalize_entry_path(&relative.to_string_lossy())?;

        let file = fs::File::open(entry.path())
            .map_err(|e| GuardError::Malformed(format!("Failed to read '{name}': {e}")))?;
        let mut data = Vec::new();
        file.take(budget.remaining().saturating_add(1))
            .read_to_end(&mut data)
            .map_err(|e| GuardError::Malformed(format!("Failed to read '{name}': {e}")))?;
        budget.consume(data.len() as u64)?;

        extracted.insert(name, data);
    }

    Ok(extracted)
}

/// Rejects archives the decoder would mishandle. Runs after the limits so
/// quota and path errors keep precedence.
fn ensure_decodable(scanned: &[Rar5Entry]) -> Result<(), GuardError> {
    for Rar5Entry { entry, method } in scanned {
        if entry.is_dir {
            return Err(GuardError::Malformed(format!(
                "RAR directory record '{}' cannot be decoded; archive the files without folder entries",
                entry.name
            )));
        }
        if *method != RAR5_STORE {
            return Err(GuardError::Malformed(format!(
                "RAR entry '{}' is compressed; only stored RAR 5 archives can be decoded",
                entry.name
            )));
        }
    }
    Ok(())
}

pub(crate) fn extract(
    bytes: &[u8],
    options: &ExtractionOptions,
) -> Result<ExtractedEntries, GuardError> {
    if !bytes.starts_with(&RAR5_SIGNATURE) {
        let entries = list_entries(bytes)?;
        super::check_entries(&entries, options)?;
        return Err(GuardError::Malformed(
            "RAR 4 archives cannot be decoded; re-pack as RAR 5 with the store method".to_string(),
        ));
    }

    let scanned = scan_rar5(bytes)?;
    let entries: Vec<ArchiveEntry> = scanned.iter().map(|e| e.entry.clone()).collect();
    let names = super::check_entries(&entries, options)?;
    ensure_decodable(&scanned)?;
    debug!(entries = entries.len(), "RAR headers passed limits, decoding");

    let staging = tempfile::tempdir()
        .map_err(|e| GuardError::Malformed(format!("Failed to create staging dir: {e}")))?;
    let archive_path = staging.path().join("input.rar");
    let output_dir = staging.path().join("out");

    fs::create_dir_all(&output_dir)
        .and_then(|_| fs::File::create(&archive_path))
        .and_then(|mut f| f.write_all(bytes))
        .map_err(|e| GuardError::Malformed(format!("Failed to stage archive: {e}")))?;
    // the decoder writes `<dest>/<name>` without creating parent folders
    for name in &names {
        if let Some(parent) = Path::new(name).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(output_dir.join(parent))
                .map_err(|e| GuardError::Malformed(format!("Failed to stage '{name}': {e}")))?;
        }
    }

    let path_str = archive_path
        .to_str()
        .ok_or_else(|| GuardError::Malformed("staging path is not valid UTF-8".to_string()))?;
    let dest_str = output_dir
        .to_str()
        .ok_or_else(|| GuardError::Malformed("staging path is not valid UTF-8".to_string()))?;

    rar::Archive::extract_all(path_str, dest_str, "")
        .map_err(|e| GuardError::Malformed(format!("Failed to extract RAR: {e:?}")))?;

    let mut budget = SizeBudget::new(options.max_total_size);
    read_back(&output_dir, options, &mut budget)
    // staging dir is removed when `staging` drops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{build_rar5, build_stored_rar, build_zip};

    fn vint(mut v: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (v & 0x7F) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn rar5_file_block(name: &str, unpacked: u64, is_dir: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend(vint(RAR5_FILE_HEADER));
        body.extend(vint(RAR5_HAS_DATA));
        body.extend(vint(0)); // data size
        body.extend(vint(if is_dir { RAR5_DIRECTORY } else { 0 }));
        body.extend(vint(unpacked));
        body.extend(vint(0)); // attributes
        body.extend(vint(0)); // compression info
        body.extend(vint(0)); // host os
        body.extend(vint(name.len() as u64));
        body.extend_from_slice(name.as_bytes());

        let mut block = vec![0u8; 4]; // crc, unchecked
        block.extend(vint(body.len() as u64));
        block.extend(body);
        block
    }

    fn rar5_end_block() -> Vec<u8> {
        let body = [vint(RAR5_END_ARCHIVE), vint(0), vint(0)].concat();
        let mut block = vec![0u8; 4];
        block.extend(vint(body.len() as u64));
        block.extend(body);
        block
    }

    fn rar4_file_block(name: &str, unpacked: u32, flags: u16) -> Vec<u8> {
        let head_size = (RAR4_FILE_HEAD_FIXED + name.len()) as u16;
        let mut block = Vec::new();
        block.extend_from_slice(&0u16.to_le_bytes()); // crc
        block.push(RAR4_FILE_HEAD);
        block.extend_from_slice(&flags.to_le_bytes());
        block.extend_from_slice(&head_size.to_le_bytes());
        block.extend_from_slice(&0u32.to_le_bytes()); // pack size
        block.extend_from_slice(&unpacked.to_le_bytes());
        block.push(0); // host os
        block.extend_from_slice(&0u32.to_le_bytes()); // file crc
        block.extend_from_slice(&0u32.to_le_bytes()); // ftime
        block.push(29); // unpack version
        block.push(0x30); // method: store
        block.extend_from_slice(&(name.len() as u16).to_le_bytes());
        block.extend_from_slice(&0u32.to_le_bytes()); // attributes
        block.extend_from_slice(name.as_bytes());
        block
    }

    #[test]
    fn vint_decodes_multi_byte_values() {
        let encoded = vint(300);
        assert_eq!(vint_at(&encoded, 0).unwrap(), (300, 2));
        assert!(vint_at(&[0x80, 0x80], 0).is_err());
    }

    #[test]
    fn lists_rar5_entries() {
        let mut bytes = RAR5_SIGNATURE.to_vec();
        bytes.extend(rar5_file_block("docs", 0, true));
        bytes.extend(rar5_file_block("docs/report.docx", 1234, false));
        bytes.extend(rar5_end_block());

        let entries = list_entries(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name, "docs/report.docx");
        assert_eq!(entries[1].declared_size, 1234);
    }

    #[test]
    fn lists_rar4_entries_with_windows_separators() {
        let mut bytes = RAR4_SIGNATURE.to_vec();
        bytes.extend(rar4_file_block("sub\\slides.pptx", 99, 0));
        bytes.extend(rar4_file_block("sub", 0, RAR4_DIRECTORY_MASK));
        let entries = list_entries(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "sub\\slides.pptx");
        assert!(entries[1].is_dir);
    }

    #[test]
    fn rar_traversal_is_rejected_before_decoding() {
        let mut bytes = RAR5_SIGNATURE.to_vec();
        bytes.extend(rar5_file_block("../../evil.txt", 4, false));
        bytes.extend(rar5_end_block());

        let err = extract(&bytes, &ExtractionOptions::default()).unwrap_err();
        assert!(matches!(err, GuardError::PathTraversal(_)));
    }

    #[test]
    fn rar_entry_count_limit_applies() {
        let mut bytes = RAR4_SIGNATURE.to_vec();
        for i in 0..20 {
            bytes.extend(rar4_file_block(&format!("f{i}.txt"), 0, 0));
        }
        let opts = ExtractionOptions {
            max_files: 10,
            ..Default::default()
        };
        let err = extract(&bytes, &opts).unwrap_err();
        assert!(matches!(err, GuardError::QuotaExceeded(_)));
    }

    #[test]
    fn rar_encrypted_entry_is_rejected() {
        let mut bytes = RAR4_SIGNATURE.to_vec();
        bytes.extend(rar4_file_block("secret.docx", 10, RAR4_ENCRYPTED));
        let err = extract(&bytes, &ExtractionOptions::default()).unwrap_err();
        assert!(matches!(err, GuardError::Malformed(ref m) if m.contains("encrypted")));
    }

    #[test]
    fn stored_rar5_extracts_in_lexical_order() {
        let docx = build_zip(&[("word/document.xml", b"<w:document/>".as_slice())]);
        let bytes = build_stored_rar(&[
            ("submission/report.docx", docx.as_slice()),
            ("notes.txt", b"hello".as_slice()),
        ]);

        let entries = list_entries(&bytes).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].declared_size, docx.len() as u64);

        let extracted = extract(&bytes, &ExtractionOptions::default()).unwrap();
        let keys: Vec<&str> = extracted.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["notes.txt", "submission/report.docx"]);
        assert_eq!(extracted["notes.txt"], b"hello");
        assert_eq!(extracted["submission/report.docx"], docx);
    }

    #[test]
    fn stored_rar5_respects_extension_allow_list() {
        let bytes = build_stored_rar(&[("report.docx", b"PK".as_slice()), ("run.sh", b"#!".as_slice())]);
        let opts = ExtractionOptions {
            allowed_extensions: Some(vec!["docx".into()]),
            ..Default::default()
        };
        let err = extract(&bytes, &opts).unwrap_err();
        assert!(matches!(err, GuardError::DisallowedExtension(ref n) if n == "run.sh"));
    }

    #[test]
    fn compressed_rar5_fails_before_decoding() {
        let bytes = build_rar5(&[("report.docx", b"not really compressed".as_slice())], 3);
        let err = extract(&bytes, &ExtractionOptions::default()).unwrap_err();
        assert!(matches!(err, GuardError::Malformed(ref m) if m.contains("compressed")), "{err:?}");
    }

    #[test]
    fn rar5_directory_records_fail_cleanly() {
        let mut bytes = RAR5_SIGNATURE.to_vec();
        bytes.extend(rar5_file_block("docs", 0, true));
        bytes.extend(rar5_end_block());
        let err = extract(&bytes, &ExtractionOptions::default()).unwrap_err();
        assert!(matches!(err, GuardError::Malformed(ref m) if m.contains("directory record")));
    }

    #[test]
    fn rar4_passes_limits_then_fails_cleanly() {
        let mut bytes = RAR4_SIGNATURE.to_vec();
        bytes.extend(rar4_file_block("slides.pptx", 10, 0));
        let err = extract(&bytes, &ExtractionOptions::default()).unwrap_err();
        assert!(matches!(err, GuardError::Malformed(ref m) if m.contains("RAR 4")), "{err:?}");
    }

    #[test]
    fn truncated_rar5_header_is_malformed() {
        let mut bytes = RAR5_SIGNATURE.to_vec();
        let block = rar5_file_block("a.docx", 1, false);
        bytes.extend_from_slice(&block[..block.len() - 3]);
        assert!(matches!(
            list_entries(&bytes),
            Err(GuardError::Malformed(_))
        ));
    }
}
