use tracing::warn;

use crate::features::DocumentMetadata;
use crate::package::{PackageHandle, rel_types};
use crate::xml;

const CORE_FALLBACK: &str = "docProps/core.xml";
const APP_FALLBACK: &str = "docProps/app.xml";

/// Reads core and extended properties. Missing or broken parts yield empty fields.
pub fn read_metadata<P: PackageHandle + ?Sized>(pkg: &P) -> DocumentMetadata {
    let mut meta = DocumentMetadata::default();

    let core = property_part(pkg, rel_types::CORE_PROPERTIES, CORE_FALLBACK);
    with_part(pkg, &core, |root| {
        meta.title = field(root, "title");
        meta.subject = field(root, "subject");
        meta.creator = field(root, "creator");
        meta.last_modified_by = field(root, "lastModifiedBy");
        meta.created = field(root, "created");
        meta.modified = field(root, "modified");
    });

    let app = property_part(pkg, rel_types::EXTENDED_PROPERTIES, APP_FALLBACK);
    with_part(pkg, &app, |root| {
        meta.application = field(root, "Application");
        meta.app_version = field(root, "AppVersion");
        meta.declared_pages = number(root, "Pages");
        meta.declared_slides = number(root, "Slides");
        meta.declared_words = number(root, "Words");
    });

    meta
}

fn property_part<P: PackageHandle + ?Sized>(pkg: &P, rel_suffix: &str, fallback: &str) -> String {
    match pkg.related_part("", rel_suffix) {
        Ok(Some(part)) if pkg.has_part(&part) => part,
        _ => fallback.to_string(),
    }
}

fn with_part<P, F>(pkg: &P, part: &str, read: F)
where
    P: PackageHandle + ?Sized,
    F: FnOnce(roxmltree::Node),
{
    let text = match pkg.read_xml_part(part) {
        Ok(Some(text)) => text,
        Ok(None) => return,
        Err(e) => {
            warn!(part, error = %e, "unreadable property part ignored");
            return;
        }
    };
    match xml::parse(part, &text, pkg.xml_nodes_limit()) {
        Ok(doc) => read(doc.root_element()),
        Err(e) => warn!(part, error = %e, "unparsable property part ignored"),
    }
}

/// Direct child text, trimmed; empty values count as absent.
fn field(root: roxmltree::Node, local: &str) -> Option<String> {
    xml::child(root, local)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(root: roxmltree::Node, local: &str) -> Option<u32> {
    field(root, local).and_then(|s| s.parse().ok())
}
