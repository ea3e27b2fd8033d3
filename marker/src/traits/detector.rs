use doc_parser::{DocumentFeatures, FileKind};

use crate::error::DetectorError;
use crate::types::Measurement;

/// Detector is a strategy trait for measuring one aspect of a document.
///
/// Each implementation reads a feature record and reports a [`Measurement`];
/// level selection against the rubric happens in the scorer.
pub trait Detector: Send + Sync {
    /// Registry key referenced by `Criterion::detector_key`.
    fn key(&self) -> &str;

    /// Document kind this detector understands, or `None` for any kind.
    fn applies_to(&self) -> Option<FileKind> {
        None
    }

    fn evaluate(&self, features: &DocumentFeatures) -> Result<Measurement, DetectorError>;
}
