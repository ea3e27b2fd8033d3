use doc_parser::DocumentError;
use marker::MarkerError;
use serde::Serialize;
use thiserror::Error;
use util::archive_guard::GuardError;

/// Why a file could not be graded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradingError {
    /// Malformed signature or unsafe archive shape.
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Malformed package or XML part.
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("detector error: {0}")]
    Detector(String),
    /// The source bytes could not be fetched from staging.
    #[error("staging error: {0}")]
    Staging(String),
    #[error("batch cancelled before processing started")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

/// Short, stable name of an error category for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    QuotaExceeded,
    UnsupportedFormat,
    Extraction,
    Detector,
    Staging,
    Cancelled,
    Internal,
}

impl GradingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GradingError::Validation(_) => ErrorKind::Validation,
            GradingError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            GradingError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            GradingError::Extraction(_) => ErrorKind::Extraction,
            GradingError::Detector(_) => ErrorKind::Detector,
            GradingError::Staging(_) => ErrorKind::Staging,
            GradingError::Cancelled => ErrorKind::Cancelled,
            GradingError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<GuardError> for GradingError {
    fn from(e: GuardError) -> Self {
        let msg = e.to_string();
        match e {
            GuardError::QuotaExceeded(_) => GradingError::QuotaExceeded(msg),
            GuardError::Malformed(_) => GradingError::Extraction(msg),
            GuardError::Validation(_)
            | GuardError::PathTraversal(_)
            | GuardError::DisallowedExtension(_) => GradingError::Validation(msg),
        }
    }
}

impl From<DocumentError> for GradingError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Archive(inner) => inner.into(),
            DocumentError::UnsupportedFormat(msg) => GradingError::UnsupportedFormat(msg),
            DocumentError::QuotaExceeded(msg) => GradingError::QuotaExceeded(msg),
            e @ DocumentError::Malformed { .. } => GradingError::Extraction(e.to_string()),
        }
    }
}

impl From<MarkerError> for GradingError {
    fn from(e: MarkerError) -> Self {
        GradingError::Validation(e.to_string())
    }
}

impl From<std::io::Error> for GradingError {
    fn from(e: std::io::Error) -> Self {
        GradingError::Staging(e.to_string())
    }
}
