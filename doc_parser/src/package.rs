//! # OOXML Package
//!
//! A document's native container opened as a read-only virtual filesystem of
//! named parts. Part names are stored without a leading slash and looked up
//! case-insensitively, as OPC requires.
//!
//! The package is unpacked through the archive guard with [`PackageLimits`],
//! so a hostile document gets the same entry-count, size and path checks as
//! an outer container.

use std::collections::BTreeMap;

use tracing::debug;
use util::archive_guard::{self, ArchiveFormat, ExtractedEntries};
use util::grading_config::PackageLimits;

use crate::error::DocumentError;
use crate::xml;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Relationship type suffixes (the namespace prefix differs between
/// transitional and strict documents).
pub mod rel_types {
    pub const OFFICE_DOCUMENT: &str = "/officeDocument";
    pub const CORE_PROPERTIES: &str = "/core-properties";
    pub const EXTENDED_PROPERTIES: &str = "/extended-properties";
    pub const SLIDE: &str = "/slide";
    pub const SLIDE_LAYOUT: &str = "/slideLayout";
    pub const NOTES_SLIDE: &str = "/notesSlide";
    pub const THEME: &str = "/theme";
    pub const HYPERLINK: &str = "/hyperlink";
    pub const HEADER: &str = "/header";
    pub const FOOTER: &str = "/footer";
    pub const STYLES: &str = "/styles";
    pub const SETTINGS: &str = "/settings";
}

/// One `<Relationship>` of a part, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    /// Raw target as written; relative to the source part unless external.
    pub target: String,
    /// `TargetMode="External"`, e.g. a web hyperlink.
    pub external: bool,
}

impl Relationship {
    pub fn is_type(&self, suffix: &str) -> bool {
        self.rel_type.ends_with(suffix)
    }
}

/// Path of the relationships part belonging to `part` (`""` is the package root).
pub fn rels_part_for(part: &str) -> String {
    let part = part.trim_start_matches('/');
    match part.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/_rels/{name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against its source part.
///
/// Absolute targets are taken from the package root. Returns `None` when the
/// target climbs above the root.
pub fn resolve_target(source_part: &str, target: &str) -> Option<String> {
    let target = target.split('#').next().unwrap_or(target);
    let mut segments: Vec<&str> = Vec::new();

    if !target.starts_with('/') {
        let source = source_part.trim_start_matches('/');
        if let Some((dir, _)) = source.rsplit_once('/') {
            segments.extend(dir.split('/').filter(|s| !s.is_empty()));
        }
    }

    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Read access to a document package.
pub trait PackageHandle {
    fn read_part(&self, path: &str) -> Option<&[u8]>;

    /// Part names under `prefix`, in lexical order.
    fn list_parts(&self, prefix: &str) -> Vec<String>;

    /// Relationships declared by `part`; empty when it has no `.rels` companion.
    fn relationships(&self, part: &str) -> Result<Vec<Relationship>, DocumentError> {
        let rels_path = rels_part_for(part);
        let Some(text) = self.read_xml_part(&rels_path)? else {
            return Ok(Vec::new());
        };
        let doc = xml::parse(&rels_path, &text, self.xml_nodes_limit())?;

        let rels = xml::children(doc.root_element(), "Relationship")
            .filter_map(|node| {
                Some(Relationship {
                    id: xml::attr(node, "Id")?.to_string(),
                    rel_type: xml::attr(node, "Type").unwrap_or_default().to_string(),
                    target: xml::attr(node, "Target")?.to_string(),
                    external: xml::attr(node, "TargetMode")
                        .is_some_and(|m| m.eq_ignore_ascii_case("External")),
                })
            })
            .collect();
        Ok(rels)
    }

    /// Node ceiling used when parsing parts of this package.
    fn xml_nodes_limit(&self) -> u32 {
        xml::DEFAULT_NODES_LIMIT
    }

    fn has_part(&self, path: &str) -> bool {
        self.read_part(path).is_some()
    }

    /// Reads and decodes an XML part. `Ok(None)` when the part is absent.
    fn read_xml_part(&self, path: &str) -> Result<Option<String>, DocumentError> {
        self.read_part(path)
            .map(|bytes| xml::decode(path, bytes))
            .transpose()
    }

    /// Internal part targeted by relationship `rel` of `source_part`.
    fn resolve(&self, source_part: &str, rel: &Relationship) -> Option<String> {
        if rel.external {
            return None;
        }
        resolve_target(source_part, &rel.target)
    }

    /// First internal target of `source_part` whose type ends with `suffix`.
    fn related_part(&self, source_part: &str, suffix: &str) -> Result<Option<String>, DocumentError> {
        Ok(self
            .relationships(source_part)?
            .iter()
            .filter(|r| r.is_type(suffix))
            .find_map(|r| self.resolve(source_part, r)))
    }
}

/// In-memory OOXML package.
#[derive(Debug, Clone)]
pub struct OoxmlPackage {
    parts: ExtractedEntries,
    lower_index: BTreeMap<String, String>,
    nodes_limit: u32,
}

impl OoxmlPackage {
    /// Unpacks a ZIP-based package under `limits` and checks that it looks
    /// like OPC (a `[Content_Types].xml` part is present).
    pub fn open(bytes: &[u8], limits: &PackageLimits) -> Result<Self, DocumentError> {
        match archive_guard::detect_format(bytes) {
            Some(ArchiveFormat::Zip) => {}
            _ => {
                return Err(DocumentError::UnsupportedFormat(
                    "document is not a ZIP-based package".to_string(),
                ));
            }
        }

        let parts = archive_guard::extract(bytes, &limits.to_extraction_options()).into_result()?;
        let package = Self::from_parts(parts);

        if !package.has_part(CONTENT_TYPES_PART) {
            return Err(DocumentError::UnsupportedFormat(format!(
                "package has no {CONTENT_TYPES_PART}"
            )));
        }
        debug!(parts = package.parts.len(), "package opened");
        Ok(package)
    }

    pub fn from_parts(parts: ExtractedEntries) -> Self {
        let lower_index = parts
            .keys()
            .map(|k| (k.to_ascii_lowercase(), k.clone()))
            .collect();
        Self {
            parts,
            lower_index,
            nodes_limit: xml::DEFAULT_NODES_LIMIT,
        }
    }

    pub fn with_nodes_limit(mut self, limit: u32) -> Self {
        self.nodes_limit = limit.max(1);
        self
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Main document part from the root relationships, falling back to the
    /// conventional locations.
    pub fn main_part(&self) -> Result<Option<String>, DocumentError> {
        if let Some(part) = self.related_part("", rel_types::OFFICE_DOCUMENT)? {
            if self.has_part(&part) {
                return Ok(Some(part));
            }
        }
        Ok(["word/document.xml", "ppt/presentation.xml"]
            .into_iter()
            .find(|p| self.has_part(p))
            .map(str::to_string))
    }
}

impl PackageHandle for OoxmlPackage {
    fn read_part(&self, path: &str) -> Option<&[u8]> {
        let path = path.trim_start_matches('/');
        self.parts
            .get(path)
            .or_else(|| {
                self.lower_index
                    .get(&path.to_ascii_lowercase())
                    .and_then(|real| self.parts.get(real))
            })
            .map(Vec::as_slice)
    }

    fn list_parts(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.trim_start_matches('/');
        self.parts
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn xml_nodes_limit(&self) -> u32 {
        self.nodes_limit
    }
}
