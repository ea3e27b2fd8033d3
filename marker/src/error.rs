//! Marker Error Types
//!
//! [`MarkerError`] covers loading and validating rubrics. [`DetectorError`] is
//! produced while measuring a single criterion; the rule engine converts it to
//! an `error` level for that criterion instead of aborting the evaluation.

use doc_parser::FileKind;
use thiserror::Error;

/// Errors raised while reading or validating a rubric.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarkerError {
    /// The rubric parsed but breaks a structural rule.
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),
    /// JSON is malformed or does not match the rubric schema.
    #[error("invalid rubric JSON: {0}")]
    InvalidJson(String),
    /// I/O error (file not found, unreadable, etc.).
    #[error("I/O error: {0}")]
    Io(String),
    /// No built-in preset has the requested name.
    #[error("unknown rubric preset '{0}'")]
    UnknownPreset(String),
}

impl From<std::io::Error> for MarkerError {
    fn from(e: std::io::Error) -> Self {
        MarkerError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for MarkerError {
    fn from(e: serde_json::Error) -> Self {
        MarkerError::InvalidJson(e.to_string())
    }
}

/// Errors raised by a detector for one criterion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("unresolved detector '{0}'")]
    Unresolved(String),
    #[error("detector '{key}' expects a {expected} document, got {found}")]
    WrongDocumentKind {
        key: String,
        expected: FileKind,
        found: FileKind,
    },
    #[error("detector '{key}' failed: {reason}")]
    Measurement { key: String, reason: String },
}
