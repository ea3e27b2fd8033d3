//! Structured feature records produced by the extractors.
//!
//! Everything here is plain data. Records serialize to camelCase JSON so they
//! can be attached to grade details or printed by `grader inspect`.

use serde::Serialize;

use crate::kind::FileKind;

/// Feature record of one document, tagged by document kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DocumentFeatures {
    Presentation(PresentationFeatures),
    WordProcessor(WordFeatures),
}

impl DocumentFeatures {
    pub fn kind(&self) -> FileKind {
        match self {
            DocumentFeatures::Presentation(_) => FileKind::Presentation,
            DocumentFeatures::WordProcessor(_) => FileKind::WordProcessor,
        }
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        match self {
            DocumentFeatures::Presentation(p) => &p.metadata,
            DocumentFeatures::WordProcessor(w) => &w.metadata,
        }
    }

    pub fn truncated(&self) -> bool {
        match self {
            DocumentFeatures::Presentation(p) => p.truncated,
            DocumentFeatures::WordProcessor(w) => w.truncated,
        }
    }

    pub fn as_presentation(&self) -> Option<&PresentationFeatures> {
        match self {
            DocumentFeatures::Presentation(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_word(&self) -> Option<&WordFeatures> {
        match self {
            DocumentFeatures::WordProcessor(w) => Some(w),
            _ => None,
        }
    }
}

/// Core (`docProps/core.xml`) and extended (`docProps/app.xml`) properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub last_modified_by: Option<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
    pub application: Option<String>,
    pub app_version: Option<String>,
    pub declared_pages: Option<u32>,
    pub declared_slides: Option<u32>,
    pub declared_words: Option<u32>,
}

// ─── Presentation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeSummary {
    pub text_frames: usize,
    pub pictures: usize,
    pub charts: usize,
    pub tables: usize,
    pub groups: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideFeatures {
    /// 1-based position in authored order.
    pub index: usize,
    pub part_name: String,
    pub layout_id: Option<String>,
    pub layout_name: Option<String>,
    pub layout_type: Option<String>,
    pub title: Option<String>,
    pub shapes: ShapeSummary,
    pub word_count: usize,
    /// Transition effect name, or `"transition"` when only the container is present.
    pub transition: Option<String>,
    pub has_animation: bool,
    pub has_notes: bool,
    pub hyperlink_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDescriptor {
    pub name: Option<String>,
    pub color_scheme: Option<String>,
    pub font_scheme: Option<String>,
    pub major_font: Option<String>,
    pub minor_font: Option<String>,
    pub accent_colors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationFeatures {
    pub slides: Vec<SlideFeatures>,
    pub theme: ThemeDescriptor,
    pub metadata: DocumentMetadata,
    pub slide_count: usize,
    pub hyperlink_count: usize,
    pub has_theme_customization: bool,
    pub has_any_transition: bool,
    pub has_any_animation: bool,
    pub truncated: bool,
}

// ─── Word-processor ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    #[serde(rename_all = "camelCase")]
    Paragraph {
        style: Option<String>,
        heading_level: Option<u8>,
        text: String,
    },
    Table { rows: usize, columns: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TocSource {
    /// Entries read from a literal TOC field's cached result.
    Field,
    /// Entries synthesized from heading-styled paragraphs.
    Headings,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOfContents {
    pub has_field: bool,
    pub source: TocSource,
    pub entries: Vec<TocEntry>,
}

/// Header/footer references of one section whose target parts exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionHeaderFooter {
    pub index: usize,
    pub header_default: bool,
    pub header_first: bool,
    pub header_even: bool,
    pub footer_default: bool,
    pub footer_first: bool,
    pub footer_even: bool,
    pub title_page: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderFooterSummary {
    pub sections: Vec<SectionHeaderFooter>,
    pub even_and_odd: bool,
    pub has_header: bool,
    pub has_footer: bool,
    pub first_page_differs: bool,
    pub even_page_differs: bool,
    pub has_page_numbers: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WordFeatures {
    pub blocks: Vec<ContentBlock>,
    pub header_footer: HeaderFooterSummary,
    pub toc: TableOfContents,
    pub metadata: DocumentMetadata,
    pub paragraph_count: usize,
    pub heading_count: usize,
    pub table_count: usize,
    pub image_count: usize,
    pub word_count: usize,
    pub character_count: usize,
    pub character_count_no_spaces: usize,
    pub truncated: bool,
}
