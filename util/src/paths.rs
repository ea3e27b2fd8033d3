use crate::config::AppConfig;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Create a directory (and all parents) if it doesn't exist, and return the path.
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> io::Result<PathBuf> {
    let p = path.as_ref();
    fs::create_dir_all(p)?;
    Ok(p.to_path_buf())
}

/// Ensure the parent directory of a *file path* exists (no-op if none).
pub fn ensure_parent_dir<P: AsRef<Path>>(file_path: P) -> io::Result<()> {
    if let Some(parent) = file_path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists<P: AsRef<Path>>(path: P) -> io::Result<()> {
    match fs::remove_dir_all(path.as_ref()) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Global staging root (absolute), from `AppConfig::staging_root`.
pub fn staging_root() -> PathBuf {
    AppConfig::global().staging_root_path()
}

/// Reduce a user-supplied file name to a single safe path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "upload".to_string(),
        s => s.to_string(),
    }
}

// ─── Batch staging layout ───────────────────────────────────────────

// {STAGING_ROOT}/batch_{batch_id}
pub fn batch_dir(batch_id: &str) -> PathBuf {
    staging_root().join(format!("batch_{batch_id}"))
}

// {STAGING_ROOT}/batch_{batch_id}/file_{index}
pub fn staged_file_dir(batch_id: &str, index: usize) -> PathBuf {
    batch_dir(batch_id).join(format!("file_{index}"))
}

/// Where an input is copied while it is being graded (does not create).
pub fn staged_file_path(batch_id: &str, index: usize, file_name: &str) -> PathBuf {
    staged_file_dir(batch_id, index).join(sanitize_file_name(file_name))
}

// Results
pub fn results_dir(batch_id: &str) -> PathBuf {
    staging_root().join("results").join(format!("batch_{batch_id}"))
}
pub fn result_path(batch_id: &str, result_id: &str) -> PathBuf {
    results_dir(batch_id).join(format!("{result_id}.json"))
}
