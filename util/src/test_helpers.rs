use std::io::{Cursor, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use crate::config::AppConfig;

/// Creates a unique temporary directory and points the global staging root
/// at it. The directory is automatically cleaned up when the returned
/// `TempDir` is dropped.
///
/// Keep the returned `TempDir` in scope for as long as you need the files.
pub fn setup_test_staging_root() -> TempDir {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let abs = tmp
        .path()
        .canonicalize()
        .unwrap_or_else(|_| tmp.path().to_path_buf());
    AppConfig::set_staging_root(abs.to_string_lossy().into_owned());
    tmp
}

/// Builds an in-memory ZIP from `(name, contents)` pairs, in the given order.
pub fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in files {
        zip.start_file(*name, options).expect("start_file");
        zip.write_all(data).expect("write entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Same as [`build_zip`] for textual parts such as XML.
pub fn build_zip_str(files: &[(&str, &str)]) -> Vec<u8> {
    let owned: Vec<(&str, &[u8])> = files.iter().map(|(n, d)| (*n, d.as_bytes())).collect();
    build_zip(&owned)
}

fn rar_vint(mut v: u64) -> Vec<u8> {
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

fn rar_block(body: Vec<u8>) -> Vec<u8> {
    // header CRCs are not verified by the reader
    let mut block = vec![0u8; 4];
    block.extend(rar_vint(body.len() as u64));
    block.extend(body);
    block
}

/// Builds a single-volume RAR 5 archive whose entries use compression
/// `method` (0 is store). Only stored archives carry payloads that decode
/// back to `files`.
pub fn build_rar5(files: &[(&str, &[u8])], method: u64) -> Vec<u8> {
    let mut out = vec![0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];
    // main archive header: type 1, no header flags, no archive flags
    out.extend(rar_block(vec![0x01, 0x00, 0x00]));

    for (name, data) in files {
        let mut body = Vec::new();
        body.extend(rar_vint(2)); // file header
        body.extend(rar_vint(0x02)); // data area follows
        body.extend(rar_vint(data.len() as u64));
        body.extend(rar_vint(0)); // no mtime, no crc
        body.extend(rar_vint(data.len() as u64));
        body.extend(rar_vint(0x20)); // attributes
        body.extend(rar_vint(method << 7));
        body.extend(rar_vint(1)); // unix
        body.extend(rar_vint(name.len() as u64));
        body.extend_from_slice(name.as_bytes());
        out.extend(rar_block(body));
        out.extend_from_slice(data);
    }

    // end of archive: type 5, no flags, last volume
    out.extend(rar_block(vec![0x05, 0x00, 0x00]));
    out
}

/// A stored (uncompressed) RAR 5 archive of `(name, contents)` pairs.
pub fn build_stored_rar(files: &[(&str, &[u8])]) -> Vec<u8> {
    build_rar5(files, 0)
}
