//! Word-processor feature extraction.
//!
//! The body is walked once in document order. Top-level paragraphs and tables
//! become [`ContentBlock`]s; paragraphs inside tables still feed the counters
//! and heading list but are not emitted as blocks.

use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::Node;
use tracing::{debug, warn};
use util::grading_config::ParseLimits;

use crate::error::DocumentError;
use crate::features::{
    ContentBlock, HeaderFooterSummary, SectionHeaderFooter, TocEntry, TocSource, WordFeatures,
};
use crate::metadata::read_metadata;
use crate::package::{PackageHandle, Relationship, rel_types};
use crate::xml;

static HEADING_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^heading\s*([1-9])$").expect("valid heading regex"));
static TOC_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^toc\s*([1-9])$").expect("valid toc regex"));
static TOC_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*TOC\b").expect("valid toc field regex"));
static PAGE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bPAGE\b").expect("valid page field regex"));

const TOC_GALLERY: &str = "Table of Contents";
const MAX_STYLE_CHAIN: usize = 10;

#[derive(Debug, Clone, Default)]
struct StyleInfo {
    name: Option<String>,
    outline_level: Option<u8>,
    based_on: Option<String>,
}

#[derive(Debug, Default)]
struct StyleMap(HashMap<String, StyleInfo>);

impl StyleMap {
    fn parse(root: Node) -> Self {
        let styles = xml::children(root, "style")
            .filter_map(|style| {
                let id = xml::attr(style, "styleId")?.to_string();
                let info = StyleInfo {
                    name: xml::child(style, "name")
                        .and_then(|n| xml::attr(n, "val"))
                        .map(str::to_string),
                    outline_level: xml::child(style, "pPr").and_then(outline_level),
                    based_on: xml::child(style, "basedOn")
                        .and_then(|n| xml::attr(n, "val"))
                        .map(str::to_string),
                };
                Some((id, info))
            })
            .collect();
        StyleMap(styles)
    }

    /// Heading level of a style: its `heading N` name, its outline level, or
    /// the same for the style it is based on.
    fn heading_level(&self, style_id: &str) -> Option<u8> {
        let mut current = Some(style_id.to_string());
        for _ in 0..MAX_STYLE_CHAIN {
            let id = current?;
            let Some(info) = self.0.get(&id) else {
                return level_from(&HEADING_NAME, &id);
            };
            if let Some(level) = info.name.as_deref().and_then(|n| level_from(&HEADING_NAME, n)) {
                return Some(level);
            }
            if let Some(level) = info.outline_level {
                return Some(level);
            }
            current = info.based_on.clone();
        }
        None
    }

    fn toc_level(&self, style_id: &str) -> Option<u8> {
        level_from(&TOC_NAME, style_id).or_else(|| {
            self.0
                .get(style_id)
                .and_then(|info| info.name.as_deref())
                .and_then(|n| level_from(&TOC_NAME, n))
        })
    }
}

fn level_from(re: &Regex, s: &str) -> Option<u8> {
    re.captures(s.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// `w:outlineLvl` (0-based, 9 = body text) as a 1-based heading level.
fn outline_level(ppr: Node) -> Option<u8> {
    xml::child(ppr, "outlineLvl")
        .and_then(|n| xml::attr(n, "val"))
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|l| *l < 9)
        .map(|l| l + 1)
}

/// OOXML on/off property: present without `val`, or `val` not false.
fn on_off(node: Node) -> bool {
    !matches!(xml::attr(node, "val"), Some("0" | "false" | "off"))
}

fn read_optional_root<P, T, F>(pkg: &P, part: &str, read: F) -> Option<T>
where
    P: PackageHandle + ?Sized,
    F: FnOnce(Node) -> T,
{
    let text = match pkg.read_xml_part(part) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(e) => {
            warn!(part, error = %e, "optional part unreadable");
            return None;
        }
    };
    match xml::parse(part, &text, pkg.xml_nodes_limit()) {
        Ok(doc) => Some(read(doc.root_element())),
        Err(e) => {
            warn!(part, error = %e, "optional part unparsable");
            None
        }
    }
}

fn related_or<P: PackageHandle + ?Sized>(
    pkg: &P,
    rels: &[Relationship],
    main_part: &str,
    suffix: &str,
    fallback: &str,
) -> String {
    rels.iter()
        .filter(|r| r.is_type(suffix))
        .find_map(|r| pkg.resolve(main_part, r))
        .unwrap_or_else(|| fallback.to_string())
}

struct BodyWalker<'a> {
    styles: &'a StyleMap,
    max_paragraphs: usize,
    features: WordFeatures,
    headings: Vec<TocEntry>,
    toc_entries: Vec<TocEntry>,
    stopped: bool,
}

impl<'a> BodyWalker<'a> {
    fn new(styles: &'a StyleMap, limits: &ParseLimits) -> Self {
        Self {
            styles,
            max_paragraphs: limits.max_paragraphs,
            features: WordFeatures::default(),
            headings: Vec::new(),
            toc_entries: Vec::new(),
            stopped: false,
        }
    }

    fn walk(&mut self, container: Node, emit: bool) {
        for node in container.children().filter(|n| n.is_element()) {
            if self.stopped {
                return;
            }
            match node.tag_name().name() {
                "p" => self.paragraph(node, emit),
                "tbl" => self.table(node, emit),
                "sdt" => {
                    let is_toc = xml::descendant(node, "docPartGallery")
                        .and_then(|g| xml::attr(g, "val"))
                        .is_some_and(|v| v.eq_ignore_ascii_case(TOC_GALLERY));
                    if is_toc {
                        self.features.toc.has_field = true;
                    }
                    if let Some(content) = xml::child(node, "sdtContent") {
                        self.walk(content, emit);
                    }
                }
                "customXml" | "smartTag" => self.walk(node, emit),
                _ => {}
            }
        }
    }

    fn table(&mut self, tbl: Node, emit: bool) {
        self.features.table_count += 1;

        let rows: Vec<Node> = xml::children(tbl, "tr").collect();
        if emit {
            let columns = rows
                .iter()
                .map(|r| xml::children(*r, "tc").count())
                .max()
                .unwrap_or(0);
            self.features.blocks.push(ContentBlock::Table {
                rows: rows.len(),
                columns,
            });
        }

        for row in rows {
            for cell in xml::children(row, "tc") {
                self.walk(cell, false);
            }
        }
    }

    fn paragraph(&mut self, p: Node, emit: bool) {
        if self.features.paragraph_count >= self.max_paragraphs {
            warn!(max_paragraphs = self.max_paragraphs, "paragraph ceiling reached, rest of body skipped");
            self.features.truncated = true;
            self.stopped = true;
            return;
        }
        self.features.paragraph_count += 1;

        let ppr = xml::child(p, "pPr");
        let style = ppr
            .and_then(|n| xml::child(n, "pStyle"))
            .and_then(|n| xml::attr(n, "val"))
            .map(str::to_string);
        let heading_level = ppr
            .and_then(outline_level)
            .or_else(|| style.as_deref().and_then(|s| self.styles.heading_level(s)));
        let text = paragraph_text(p);

        let f = &mut self.features;
        f.word_count += xml::word_count(&text);
        f.character_count += text.chars().filter(|c| !c.is_control()).count();
        f.character_count_no_spaces += text.chars().filter(|c| !c.is_whitespace()).count();
        f.image_count += xml::count_descendants(p, "pic") + xml::count_descendants(p, "imagedata");

        let has_toc_field = p
            .descendants()
            .filter(|n| xml::is(*n, "instrText"))
            .filter_map(|n| n.text())
            .chain(
                p.descendants()
                    .filter(|n| xml::is(*n, "fldSimple"))
                    .filter_map(|n| xml::attr(n, "instr")),
            )
            .any(|instr| TOC_FIELD.is_match(instr));
        if has_toc_field {
            f.toc.has_field = true;
        }

        let entry_text = text.trim();
        if let Some(level) = heading_level {
            f.heading_count += 1;
            if !entry_text.is_empty() {
                self.headings.push(TocEntry {
                    level,
                    text: entry_text.to_string(),
                });
            }
        } else if let Some(level) = style.as_deref().and_then(|s| self.styles.toc_level(s)) {
            if !entry_text.is_empty() {
                self.toc_entries.push(TocEntry {
                    level,
                    text: entry_text.to_string(),
                });
            }
        }

        if emit {
            self.features.blocks.push(ContentBlock::Paragraph {
                style,
                heading_level,
                text,
            });
        }
    }

    fn finish(mut self) -> WordFeatures {
        let toc = &mut self.features.toc;
        if toc.has_field && !self.toc_entries.is_empty() {
            toc.source = TocSource::Field;
            toc.entries = self.toc_entries;
        } else if !self.headings.is_empty() {
            toc.source = TocSource::Headings;
            toc.entries = self.headings;
        }
        self.features
    }
}

/// Visible text of a paragraph: runs' `w:t`, with tabs and breaks.
fn paragraph_text(p: Node) -> String {
    let mut text = String::new();
    for node in p.descendants().filter(|n| n.is_element()) {
        let in_run = node.parent().is_some_and(|parent| xml::is(parent, "r"));
        match node.tag_name().name() {
            "t" => text.push_str(node.text().unwrap_or_default()),
            "tab" if in_run => text.push('\t'),
            "br" | "cr" if in_run => text.push('\n'),
            _ => {}
        }
    }
    text
}

fn read_sections<P: PackageHandle + ?Sized>(
    pkg: &P,
    main_part: &str,
    body: Node,
    rels: &[Relationship],
) -> (Vec<SectionHeaderFooter>, BTreeSet<String>) {
    let mut sections = Vec::new();
    let mut parts = BTreeSet::new();

    let sect_prs = body.descendants().filter(|n| {
        xml::is(*n, "sectPr")
            && n.parent()
                .is_some_and(|parent| xml::is(parent, "pPr") || xml::is(parent, "body"))
    });

    for (index, sect) in sect_prs.enumerate() {
        let mut section = SectionHeaderFooter {
            index,
            title_page: xml::child(sect, "titlePg").is_some_and(on_off),
            ..Default::default()
        };

        for reference in sect.children().filter(|n| n.is_element()) {
            let is_header = match reference.tag_name().name() {
                "headerReference" => true,
                "footerReference" => false,
                _ => continue,
            };
            let Some(target) = xml::rel_attr(reference, "id")
                .and_then(|id| rels.iter().find(|r| r.id == id))
                .and_then(|r| pkg.resolve(main_part, r))
                .filter(|part| pkg.has_part(part))
            else {
                debug!(section = index, "header/footer reference without a part");
                continue;
            };
            parts.insert(target);

            let slot = match (is_header, xml::attr(reference, "type").unwrap_or("default")) {
                (true, "first") => &mut section.header_first,
                (true, "even") => &mut section.header_even,
                (true, _) => &mut section.header_default,
                (false, "first") => &mut section.footer_first,
                (false, "even") => &mut section.footer_even,
                (false, _) => &mut section.footer_default,
            };
            *slot = true;
        }
        sections.push(section);
    }

    (sections, parts)
}

fn has_page_field(root: Node) -> bool {
    root.descendants().any(|n| {
        (xml::is(n, "instrText") && n.text().is_some_and(|t| PAGE_FIELD.is_match(t)))
            || (xml::is(n, "fldSimple") && xml::attr(n, "instr").is_some_and(|t| PAGE_FIELD.is_match(t)))
            || xml::is(n, "pgNum")
    })
}

pub fn extract<P: PackageHandle + ?Sized>(
    pkg: &P,
    main_part: &str,
    limits: &ParseLimits,
) -> Result<WordFeatures, DocumentError> {
    let text = pkg
        .read_xml_part(main_part)?
        .ok_or_else(|| DocumentError::malformed(main_part, "document part is missing"))?;
    let doc = xml::parse(main_part, &text, pkg.xml_nodes_limit())?;
    let rels = pkg.relationships(main_part)?;

    let styles_part = related_or(pkg, &rels, main_part, rel_types::STYLES, "word/styles.xml");
    let styles = read_optional_root(pkg, &styles_part, StyleMap::parse).unwrap_or_default();

    let Some(body) = xml::child(doc.root_element(), "body") else {
        return Err(DocumentError::malformed(main_part, "document has no body"));
    };

    let mut walker = BodyWalker::new(&styles, limits);
    walker.walk(body, true);
    let mut features = walker.finish();

    let settings_part = related_or(pkg, &rels, main_part, rel_types::SETTINGS, "word/settings.xml");
    let even_and_odd = read_optional_root(pkg, &settings_part, |root| {
        xml::child(root, "evenAndOddHeaders").is_some_and(on_off)
    })
    .unwrap_or(false);

    let (sections, hf_parts) = read_sections(pkg, main_part, body, &rels);
    let has_page_numbers = hf_parts
        .iter()
        .any(|part| read_optional_root(pkg, part, has_page_field).unwrap_or(false));

    features.header_footer = HeaderFooterSummary {
        has_header: sections
            .iter()
            .any(|s| s.header_default || s.header_first || s.header_even),
        has_footer: sections
            .iter()
            .any(|s| s.footer_default || s.footer_first || s.footer_even),
        first_page_differs: sections
            .iter()
            .any(|s| s.title_page && (s.header_first || s.footer_first)),
        even_page_differs: even_and_odd && sections.iter().any(|s| s.header_even || s.footer_even),
        has_page_numbers,
        even_and_odd,
        sections,
    };
    features.metadata = read_metadata(pkg);

    debug!(
        paragraphs = features.paragraph_count,
        tables = features.table_count,
        truncated = features.truncated,
        "word document extracted"
    );
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DocxBuilder, HfVariant};
    use crate::package::OoxmlPackage;
    use util::grading_config::PackageLimits;

    fn extract_from(bytes: &[u8]) -> WordFeatures {
        let pkg = OoxmlPackage::open(bytes, &PackageLimits::default()).unwrap();
        extract(&pkg, "word/document.xml", &ParseLimits::default()).unwrap()
    }

    #[test]
    fn headings_synthesize_toc_without_field() {
        let f = extract_from(
            &DocxBuilder::new()
                .heading(1, "Introduction")
                .paragraph("Some body text here.")
                .heading(2, "Background")
                .styled("Titre1", "Conclusion")
                .styled("ChapterHeading", "Appendix")
                .outline_paragraph(2, "Direct outline")
                .build(),
        );

        assert!(!f.toc.has_field);
        assert_eq!(f.toc.source, TocSource::Headings);
        let entries: Vec<(u8, &str)> = f.toc.entries.iter().map(|e| (e.level, e.text.as_str())).collect();
        assert_eq!(
            entries,
            vec![
                (1, "Introduction"),
                (2, "Background"),
                (1, "Conclusion"),
                (1, "Appendix"),
                (3, "Direct outline"),
            ]
        );
        assert_eq!(f.heading_count, 5);
        assert_eq!(f.paragraph_count, 6);
    }

    #[test]
    fn literal_toc_field_entries_win() {
        let f = extract_from(
            &DocxBuilder::new()
                .toc_field(&[(1, "Intro"), (2, "Details")])
                .heading(1, "Intro")
                .heading(2, "Details")
                .build(),
        );
        assert!(f.toc.has_field);
        assert_eq!(f.toc.source, TocSource::Field);
        assert_eq!(f.toc.entries.len(), 2);
        assert_eq!(f.toc.entries[1].level, 2);
    }

    #[test]
    fn toc_content_control_counts_as_field() {
        let f = extract_from(&DocxBuilder::new().toc_content_control().build());
        assert!(f.toc.has_field);
        assert_eq!(f.toc.source, TocSource::Field);
    }

    #[test]
    fn blocks_in_order_and_nested_tables_counted() {
        let f = extract_from(
            &DocxBuilder::new()
                .paragraph("one two three")
                .table(2, 3)
                .nested_table()
                .image()
                .build(),
        );

        assert!(matches!(f.blocks[0], ContentBlock::Paragraph { ref text, .. } if text == "one two three"));
        assert_eq!(f.blocks[1], ContentBlock::Table { rows: 2, columns: 3 });
        assert_eq!(f.blocks[2], ContentBlock::Table { rows: 1, columns: 1 });
        assert_eq!(f.blocks.len(), 4);
        assert_eq!(f.table_count, 3);
        assert_eq!(f.image_count, 1);
        // 3 words + 6 + 4 "cell" runs
        assert_eq!(f.word_count, 13);
        assert_eq!(f.character_count, "one two three".len() + 10 * 4);
        assert_eq!(f.character_count_no_spaces, 11 + 10 * 4);
    }

    #[test]
    fn header_footer_variants() {
        let f = extract_from(
            &DocxBuilder::new()
                .paragraph("x")
                .header(HfVariant::Default)
                .header(HfVariant::First)
                .footer(HfVariant::Even, true)
                .dangling_header()
                .title_page()
                .even_and_odd()
                .build(),
        );
        let hf = &f.header_footer;
        assert_eq!(hf.sections.len(), 1);
        assert!(hf.sections[0].header_default);
        assert!(hf.sections[0].header_first);
        assert!(hf.sections[0].footer_even);
        assert!(!hf.sections[0].footer_default);
        assert!(hf.has_header && hf.has_footer);
        assert!(hf.first_page_differs);
        assert!(hf.even_page_differs);
        assert!(hf.has_page_numbers);
    }

    #[test]
    fn no_headers_means_no_variants() {
        let f = extract_from(&DocxBuilder::new().paragraph("x").footer(HfVariant::Default, false).build());
        let hf = &f.header_footer;
        assert!(!hf.has_header);
        assert!(hf.has_footer);
        assert!(!hf.first_page_differs);
        assert!(!hf.even_page_differs);
        assert!(!hf.has_page_numbers);
    }

    #[test]
    fn paragraph_ceiling_truncates() {
        let mut builder = DocxBuilder::new();
        for i in 0..10 {
            builder = builder.paragraph(&format!("p{i}"));
        }
        let pkg = OoxmlPackage::open(&builder.build(), &PackageLimits::default()).unwrap();
        let limits = ParseLimits {
            max_paragraphs: 4,
            ..Default::default()
        };
        let f = extract(&pkg, "word/document.xml", &limits).unwrap();
        assert_eq!(f.paragraph_count, 4);
        assert!(f.truncated);
    }

    #[test]
    fn metadata_is_shared_with_presentations() {
        let f = extract_from(&DocxBuilder::new().title("Lab Report").paragraph("x").build());
        assert_eq!(f.metadata.title.as_deref(), Some("Lab Report"));
        assert_eq!(f.metadata.application.as_deref(), Some("Microsoft Office Word"));
    }
}
