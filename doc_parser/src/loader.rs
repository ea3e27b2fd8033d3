//! # Document Loader
//!
//! Turns raw submission bytes into an opened [`OoxmlPackage`]. When the input
//! is a generic container (ZIP or RAR) it is first unpacked by the archive
//! guard and a single office file is selected from its entries.

use tracing::{debug, info};
use util::archive_guard::{self, ExtractedEntries};
use util::grading_config::GradingConfig;

use crate::error::DocumentError;
use crate::kind::FileKind;
use crate::package::{OoxmlPackage, PackageHandle};

/// An opened office document ready for feature extraction.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub kind: FileKind,
    /// Entry path inside the outer container, when there was one.
    pub source_entry: Option<String>,
    pub main_part: String,
    pub package: OoxmlPackage,
}

fn is_ignored_entry(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    path.starts_with("__MACOSX/")
        || path.contains("/__MACOSX/")
        || file_name.starts_with("~$")
        || file_name.starts_with("._")
}

/// Picks the office file to grade from a container's entries.
///
/// Entries are considered in lexical path order and the first word-processor
/// or presentation file wins (restricted to `preferred` when given). Other
/// candidates are ignored.
pub fn locate_office_file(
    entries: &ExtractedEntries,
    preferred: Option<FileKind>,
) -> Option<(&str, FileKind)> {
    let mut candidates = entries.keys().filter(|path| !is_ignored_entry(path)).filter_map(|path| {
        let kind = FileKind::from_file_name(path).filter(FileKind::is_office)?;
        match preferred {
            Some(want) if want.is_office() && want != kind => None,
            _ => Some((path.as_str(), kind)),
        }
    });

    let chosen = candidates.next()?;
    let ignored: Vec<&str> = candidates.map(|(p, _)| p).collect();
    if !ignored.is_empty() {
        debug!(chosen = chosen.0, ?ignored, "container holds several office files, grading the first");
    }
    Some(chosen)
}

/// Loads `bytes` as an office document.
///
/// `declared` is the caller's idea of the input kind; when absent the kind is
/// sniffed from the content.
pub fn load(
    bytes: &[u8],
    declared: Option<FileKind>,
    config: &GradingConfig,
) -> Result<LoadedDocument, DocumentError> {
    let kind = declared
        .or_else(|| FileKind::sniff(bytes))
        .ok_or_else(|| DocumentError::UnsupportedFormat("input is neither an office file nor an archive".to_string()))?;

    match kind {
        FileKind::ArchiveContainer => {
            let entries = archive_guard::extract(bytes, &config.archive).into_result()?;
            let (path, ext_kind) = locate_office_file(&entries, None).ok_or_else(|| {
                DocumentError::UnsupportedFormat(format!(
                    "container holds no office document ({} entries)",
                    entries.len()
                ))
            })?;
            info!(entry = path, "office file selected from container");

            let inner = &entries[path];
            // trust content over the entry's extension
            let inner_kind = FileKind::sniff(inner)
                .filter(FileKind::is_office)
                .unwrap_or(ext_kind);
            let mut doc = open_office(inner, inner_kind, config)?;
            doc.source_entry = Some(path.to_string());
            Ok(doc)
        }
        office => open_office(bytes, office, config),
    }
}

fn open_office(
    bytes: &[u8],
    kind: FileKind,
    config: &GradingConfig,
) -> Result<LoadedDocument, DocumentError> {
    let package = OoxmlPackage::open(bytes, &config.package)?
        .with_nodes_limit(config.parsing.max_xml_nodes);

    let main_part = package
        .main_part()?
        .ok_or_else(|| DocumentError::UnsupportedFormat("package has no main document part".to_string()))?;

    let found = if main_part.starts_with("ppt/") || main_part.ends_with("presentation.xml") {
        FileKind::Presentation
    } else {
        FileKind::WordProcessor
    };
    if found != kind {
        return Err(DocumentError::UnsupportedFormat(format!(
            "expected a {kind} document but the package holds a {found} ({main_part})"
        )));
    }

    debug!(%kind, main_part = %main_part, parts = package.part_count(), "document loaded");
    Ok(LoadedDocument {
        kind,
        source_entry: None,
        main_part,
        package,
    })
}

impl LoadedDocument {
    pub fn has_part(&self, part: &str) -> bool {
        self.package.has_part(part)
    }
}
