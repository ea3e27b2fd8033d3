use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Supported container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

/// Metadata for a single archive entry, read before any payload is inflated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub declared_size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExtractionOptions {
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,

    /// Case-insensitive extension allow-list, without the leading dot.
    #[serde(default)]
    pub allowed_extensions: Option<Vec<String>>,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_total_size: default_max_total_size(),
            allowed_extensions: None,
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_files() -> usize {
    1_000
}

fn default_max_total_size() -> u64 {
    100 * 1024 * 1024
}

fn default_max_depth() -> usize {
    10
}

/// Extracted regular files keyed by normalized entry path, in lexical order.
pub type ExtractedEntries = BTreeMap<String, Vec<u8>>;

/// Outcome of [`extract`](super::extract). Never carries a partial map on failure.
#[derive(Debug)]
pub enum ExtractionResult {
    Success(ExtractedEntries),
    Failure(GuardError),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    /// Human readable failure reason, if any.
    pub fn reason(&self) -> Option<String> {
        match self {
            ExtractionResult::Success(_) => None,
            ExtractionResult::Failure(err) => Some(err.to_string()),
        }
    }

    pub fn into_result(self) -> Result<ExtractedEntries, GuardError> {
        match self {
            ExtractionResult::Success(entries) => Ok(entries),
            ExtractionResult::Failure(err) => Err(err),
        }
    }
}

impl From<Result<ExtractedEntries, GuardError>> for ExtractionResult {
    fn from(value: Result<ExtractedEntries, GuardError>) -> Self {
        match value {
            Ok(entries) => ExtractionResult::Success(entries),
            Err(err) => ExtractionResult::Failure(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub format: Option<ArchiveFormat>,
}

/// Why an archive was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Invalid archive: {0}")]
    Validation(String),

    #[error("Archive limit exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Unsafe entry path '{0}' (path traversal)")]
    PathTraversal(String),

    #[error("Entry '{0}' has a disallowed extension")]
    DisallowedExtension(String),

    #[error("Malformed archive: {0}")]
    Malformed(String),
}
