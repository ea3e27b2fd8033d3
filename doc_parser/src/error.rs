//! Document Loader Error Types
//!
//! [`DocumentError`] covers everything that can go wrong between receiving raw
//! bytes and producing a feature record: unknown or ambiguous inputs, unsafe
//! containers, and malformed package parts.

use util::archive_guard::GuardError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// Input is not a recognised office document (or the container holds none).
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A required part is missing or cannot be parsed.
    #[error("Malformed part '{part}': {reason}")]
    Malformed { part: String, reason: String },

    /// A parsing ceiling was hit on a part that cannot be partially read.
    #[error("Processing limit exceeded: {0}")]
    QuotaExceeded(String),

    /// The outer container or the package itself was rejected by the archive guard.
    #[error(transparent)]
    Archive(#[from] GuardError),
}

impl DocumentError {
    pub fn malformed(part: impl Into<String>, reason: impl ToString) -> Self {
        DocumentError::Malformed {
            part: part.into(),
            reason: reason.to_string(),
        }
    }
}
