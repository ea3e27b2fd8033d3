//! # Doc Parser
//!
//! Opens word-processor and presentation packages and reduces them to
//! [`DocumentFeatures`] records for rubric evaluation.
//!
//! ```text
//! bytes ──► loader::load ──► LoadedDocument ──► extract_features ──► DocumentFeatures
//!            (archive guard,                     (presentation / word walker,
//!             package limits)                     parse ceilings)
//! ```
//!
//! Missing optional parts (themes, notes, headers, property parts) produce
//! default values. Only a missing or malformed main part is an error.

pub mod error;
pub mod features;
pub mod kind;
pub mod loader;
pub mod metadata;
pub mod package;
pub mod presentation;
pub mod word;
pub mod xml;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use error::DocumentError;
pub use features::DocumentFeatures;
pub use kind::FileKind;
pub use loader::{LoadedDocument, load, locate_office_file};
pub use package::{OoxmlPackage, PackageHandle, Relationship};

use util::grading_config::ParseLimits;

/// Runs the extractor matching the document's kind.
pub fn extract_features(
    doc: &LoadedDocument,
    limits: &ParseLimits,
) -> Result<DocumentFeatures, DocumentError> {
    match doc.kind {
        FileKind::Presentation => {
            presentation::extract(&doc.package, &doc.main_part, limits).map(DocumentFeatures::Presentation)
        }
        FileKind::WordProcessor => {
            word::extract(&doc.package, &doc.main_part, limits).map(DocumentFeatures::WordProcessor)
        }
        FileKind::ArchiveContainer => Err(DocumentError::UnsupportedFormat(
            "a container must be loaded before extraction".to_string(),
        )),
    }
}
