//! Presentation feature extraction.
//!
//! Slides are visited in authored order, i.e. the order of `p:sldIdLst` in the
//! presentation part resolved through its relationships, not the order parts
//! happen to be stored in the package.

use std::collections::HashMap;

use roxmltree::Node;
use tracing::{debug, warn};
use util::grading_config::ParseLimits;

use crate::error::DocumentError;
use crate::features::{PresentationFeatures, ShapeSummary, SlideFeatures, ThemeDescriptor};
use crate::metadata::read_metadata;
use crate::package::{PackageHandle, Relationship, rel_types};
use crate::xml;

const STOCK_THEME_NAME: &str = "Office Theme";
const STOCK_SCHEME_NAME: &str = "Office";

/// Children of `p:transition` that carry sound or extensions rather than the effect.
const NON_EFFECT_CHILDREN: [&str; 2] = ["sndAc", "extLst"];

#[derive(Debug, Clone, Default)]
struct LayoutInfo {
    name: Option<String>,
    layout_type: Option<String>,
}

pub fn extract<P: PackageHandle + ?Sized>(
    pkg: &P,
    main_part: &str,
    limits: &ParseLimits,
) -> Result<PresentationFeatures, DocumentError> {
    let text = pkg
        .read_xml_part(main_part)?
        .ok_or_else(|| DocumentError::malformed(main_part, "presentation part is missing"))?;
    let doc = xml::parse(main_part, &text, pkg.xml_nodes_limit())?;
    let rels = pkg.relationships(main_part)?;

    let mut features = PresentationFeatures {
        metadata: read_metadata(pkg),
        theme: read_theme(pkg, main_part, &rels),
        ..Default::default()
    };

    let slide_ids: Vec<&str> = xml::child(doc.root_element(), "sldIdLst")
        .map(|list| {
            xml::children(list, "sldId")
                .filter_map(|n| xml::rel_attr(n, "id"))
                .collect()
        })
        .unwrap_or_default();

    let mut layouts: HashMap<String, LayoutInfo> = HashMap::new();

    for rel_id in slide_ids {
        if features.slides.len() >= limits.max_slides {
            warn!(max_slides = limits.max_slides, "slide ceiling reached, remaining slides skipped");
            features.truncated = true;
            break;
        }

        let Some(part) = rels
            .iter()
            .find(|r| r.id == rel_id)
            .and_then(|r| pkg.resolve(main_part, r))
        else {
            warn!(rel_id, "slide id has no relationship target");
            continue;
        };
        let Some(slide_text) = pkg.read_xml_part(&part)? else {
            warn!(part = %part, "slide part listed but missing");
            continue;
        };

        let index = features.slides.len() + 1;
        let (slide, truncated) = read_slide(pkg, &part, &slide_text, index, limits, &mut layouts)?;
        features.truncated |= truncated;
        features.slides.push(slide);
    }

    features.slide_count = features.slides.len();
    features.hyperlink_count = features.slides.iter().map(|s| s.hyperlink_count).sum();
    features.has_any_transition = features.slides.iter().any(|s| s.transition.is_some());
    features.has_any_animation = features.slides.iter().any(|s| s.has_animation);
    features.has_theme_customization = theme_is_customized(&features.theme);

    debug!(slides = features.slide_count, truncated = features.truncated, "presentation extracted");
    Ok(features)
}

fn read_slide<P: PackageHandle + ?Sized>(
    pkg: &P,
    part: &str,
    text: &str,
    index: usize,
    limits: &ParseLimits,
    layouts: &mut HashMap<String, LayoutInfo>,
) -> Result<(SlideFeatures, bool), DocumentError> {
    let doc = xml::parse(part, text, pkg.xml_nodes_limit())?;
    let root = doc.root_element();
    let rels = pkg.relationships(part)?;

    let mut slide = SlideFeatures {
        index,
        part_name: part.to_string(),
        ..Default::default()
    };

    if let Some(layout_part) = first_target(pkg, part, &rels, rel_types::SLIDE_LAYOUT) {
        let info = layouts
            .entry(layout_part.clone())
            .or_insert_with(|| read_layout(pkg, &layout_part));
        slide.layout_name = info.name.clone();
        slide.layout_type = info.layout_type.clone();
        slide.layout_id = Some(layout_part);
    }

    let mut truncated = false;
    if let Some(tree) = xml::descendant(root, "spTree") {
        truncated = summarize_shapes(tree, limits.max_shapes_per_slide, &mut slide.shapes);
        slide.title = tree
            .descendants()
            .filter(|n| xml::is(*n, "sp"))
            .find(|sp| matches!(placeholder_type(*sp), Some("title" | "ctrTitle")))
            .map(paragraph_text)
            .filter(|t| !t.trim().is_empty());
        slide.word_count = tree
            .descendants()
            .filter(|n| xml::is(*n, "p") && n.tag_name().namespace().is_some_and(is_drawingml))
            .map(|p| xml::word_count(&xml::text_of(p, "t")))
            .sum();
    }

    slide.transition = xml::descendant(root, "transition").map(|t| {
        t.children()
            .filter(|c| c.is_element())
            .map(|c| c.tag_name().name())
            .find(|name| !NON_EFFECT_CHILDREN.contains(name))
            .unwrap_or("transition")
            .to_string()
    });

    slide.has_animation = xml::child(root, "timing")
        .is_some_and(|timing| xml::count_descendants(timing, "par") > 0);

    slide.hyperlink_count = root
        .descendants()
        .filter(|n| xml::is(*n, "hlinkClick"))
        .filter_map(|n| xml::rel_attr(n, "id"))
        .filter(|id| {
            rels.iter()
                .any(|r| r.id == *id && r.is_type(rel_types::HYPERLINK))
        })
        .count();

    if let Some(notes_part) = first_target(pkg, part, &rels, rel_types::NOTES_SLIDE) {
        slide.has_notes = notes_have_text(pkg, &notes_part);
    }

    Ok((slide, truncated))
}

fn is_drawingml(ns: &str) -> bool {
    ns.contains("drawingml")
}

fn first_target<P: PackageHandle + ?Sized>(
    pkg: &P,
    source: &str,
    rels: &[Relationship],
    suffix: &str,
) -> Option<String> {
    rels.iter()
        .filter(|r| r.is_type(suffix))
        .find_map(|r| pkg.resolve(source, r))
}

/// Counts shapes below `tree`, visiting at most `max` of them. Returns true
/// when the ceiling cut the walk short.
fn summarize_shapes(tree: Node, max: usize, summary: &mut ShapeSummary) -> bool {
    let mut visited = 0usize;
    for node in tree.descendants().filter(|n| n.is_element()) {
        let name = node.tag_name().name();
        if !matches!(name, "sp" | "pic" | "graphicFrame" | "cxnSp" | "grpSp") {
            continue;
        }
        if visited >= max {
            return true;
        }
        visited += 1;

        match name {
            "grpSp" => summary.groups += 1,
            "sp" => {
                summary.total += 1;
                if xml::child(node, "txBody").is_some() {
                    summary.text_frames += 1;
                }
            }
            "pic" => {
                summary.total += 1;
                summary.pictures += 1;
            }
            "graphicFrame" => {
                summary.total += 1;
                let uri = xml::descendant(node, "graphicData")
                    .and_then(|g| xml::attr(g, "uri"))
                    .unwrap_or_default();
                if uri.contains("/chart") {
                    summary.charts += 1;
                } else if uri.ends_with("/table") {
                    summary.tables += 1;
                }
            }
            _ => summary.total += 1,
        }
    }
    false
}

fn placeholder_type<'a>(sp: Node<'a, '_>) -> Option<&'a str> {
    let nv = xml::child(sp, "nvSpPr")?;
    let ph = xml::descendant(nv, "ph")?;
    // a placeholder without a type is a body placeholder
    Some(xml::attr(ph, "type").unwrap_or("body"))
}

/// Text of each `a:p` below `node`, one line per paragraph.
fn paragraph_text(node: Node) -> String {
    node.descendants()
        .filter(|n| xml::is(*n, "p"))
        .map(|p| xml::text_of(p, "t"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_layout<P: PackageHandle + ?Sized>(pkg: &P, part: &str) -> LayoutInfo {
    let text = match pkg.read_xml_part(part) {
        Ok(Some(text)) => text,
        Ok(None) => return LayoutInfo::default(),
        Err(e) => {
            warn!(part, error = %e, "slide layout unreadable");
            return LayoutInfo::default();
        }
    };
    match xml::parse(part, &text, pkg.xml_nodes_limit()) {
        Ok(doc) => {
            let root = doc.root_element();
            LayoutInfo {
                name: xml::child(root, "cSld")
                    .and_then(|c| xml::attr(c, "name"))
                    .map(str::to_string),
                layout_type: xml::attr(root, "type").map(str::to_string),
            }
        }
        Err(e) => {
            warn!(part, error = %e, "slide layout unparsable");
            LayoutInfo::default()
        }
    }
}

fn notes_have_text<P: PackageHandle + ?Sized>(pkg: &P, part: &str) -> bool {
    let Ok(Some(text)) = pkg.read_xml_part(part) else {
        return false;
    };
    let Ok(doc) = xml::parse(part, &text, pkg.xml_nodes_limit()) else {
        warn!(part, "notes slide unparsable");
        return false;
    };
    doc.root_element()
        .descendants()
        .filter(|n| xml::is(*n, "sp"))
        .filter(|sp| placeholder_type(*sp) == Some("body"))
        .any(|sp| !xml::text_of(sp, "t").trim().is_empty())
}

fn read_theme<P: PackageHandle + ?Sized>(
    pkg: &P,
    main_part: &str,
    rels: &[Relationship],
) -> ThemeDescriptor {
    let Some(part) = first_target(pkg, main_part, rels, rel_types::THEME) else {
        return ThemeDescriptor::default();
    };
    let Ok(Some(text)) = pkg.read_xml_part(&part) else {
        return ThemeDescriptor::default();
    };
    let doc = match xml::parse(&part, &text, pkg.xml_nodes_limit()) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(part = %part, error = %e, "theme unparsable");
            return ThemeDescriptor::default();
        }
    };

    let root = doc.root_element();
    let owned = |v: Option<&str>| v.map(str::to_string);
    let color_scheme = xml::descendant(root, "clrScheme");
    let font_scheme = xml::descendant(root, "fontScheme");
    let typeface = |which: &str| {
        font_scheme
            .and_then(|fs| xml::child(fs, which))
            .and_then(|f| xml::child(f, "latin"))
            .and_then(|l| xml::attr(l, "typeface"))
            .map(str::to_string)
    };

    let accent_colors = color_scheme
        .map(|scheme| {
            (1..=6)
                .filter_map(|i| xml::child(scheme, &format!("accent{i}")))
                .filter_map(|accent| {
                    let color = accent.children().find(|c| c.is_element())?;
                    xml::attr(color, "val")
                        .filter(|_| xml::is(color, "srgbClr"))
                        .or_else(|| xml::attr(color, "lastClr"))
                        .or_else(|| xml::attr(color, "val"))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    ThemeDescriptor {
        name: owned(xml::attr(root, "name")),
        color_scheme: owned(color_scheme.and_then(|c| xml::attr(c, "name"))),
        font_scheme: owned(font_scheme.and_then(|f| xml::attr(f, "name"))),
        major_font: typeface("majorFont"),
        minor_font: typeface("minorFont"),
        accent_colors,
    }
}

fn theme_is_customized(theme: &ThemeDescriptor) -> bool {
    let differs = |value: &Option<String>, stock: &str| value.as_deref().is_some_and(|v| v != stock);
    differs(&theme.name, STOCK_THEME_NAME)
        || differs(&theme.color_scheme, STOCK_SCHEME_NAME)
        || differs(&theme.font_scheme, STOCK_SCHEME_NAME)
}
