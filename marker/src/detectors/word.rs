use doc_parser::features::{TocSource, WordFeatures};
use doc_parser::{DocumentFeatures, FileKind};
use serde_json::json;

use super::{Measure, wrong_kind};
use crate::error::DetectorError;
use crate::traits::detector::Detector;
use crate::types::Measurement;

const TARGET_HEADINGS: usize = 3;
const TARGET_WORDS: usize = 500;

/// A detector that reads word-processor features only.
pub struct WordDetector {
    key: &'static str,
    measure: Measure<WordFeatures>,
}

impl WordDetector {
    pub const fn new(key: &'static str, measure: Measure<WordFeatures>) -> Self {
        Self { key, measure }
    }
}

impl Detector for WordDetector {
    fn key(&self) -> &str {
        self.key
    }

    fn applies_to(&self) -> Option<FileKind> {
        Some(FileKind::WordProcessor)
    }

    fn evaluate(&self, features: &DocumentFeatures) -> Result<Measurement, DetectorError> {
        features
            .as_word()
            .map(self.measure)
            .ok_or_else(|| wrong_kind(self.key, FileKind::WordProcessor, features))
    }
}

pub fn builtin() -> Vec<WordDetector> {
    vec![
        WordDetector::new("table_of_contents", table_of_contents),
        WordDetector::new("headings", headings),
        WordDetector::new("header_footer", header_footer),
        WordDetector::new("header_footer_variants", header_footer_variants),
        WordDetector::new("page_numbers", page_numbers),
        WordDetector::new("tables", tables),
        WordDetector::new("word_count", word_count),
    ]
}

/// 2 for an inserted TOC field, 1 when entries can only be synthesised from
/// headings, 0 otherwise.
fn table_of_contents(w: &WordFeatures) -> Measurement {
    let score = if w.toc.has_field {
        2.0
    } else if !w.toc.entries.is_empty() {
        1.0
    } else {
        0.0
    };
    let source = match w.toc.source {
        TocSource::Field => "field",
        TocSource::Headings => "headings",
        TocSource::None => "none",
    };
    Measurement::new(score, score / 2.0).with_evidence(json!({
        "hasField": w.toc.has_field,
        "source": source,
        "entries": w.toc.entries.len(),
    }))
}

fn headings(w: &WordFeatures) -> Measurement {
    Measurement::count(w.heading_count, TARGET_HEADINGS).with_evidence(json!({
        "headings": w.heading_count,
    }))
}

fn header_footer(w: &WordFeatures) -> Measurement {
    let hf = &w.header_footer;
    let score = u8::from(hf.has_header) + u8::from(hf.has_footer);
    Measurement::new(f64::from(score), f64::from(score) / 2.0).with_evidence(json!({
        "hasHeader": hf.has_header,
        "hasFooter": hf.has_footer,
        "sections": hf.sections.len(),
    }))
}

fn header_footer_variants(w: &WordFeatures) -> Measurement {
    let hf = &w.header_footer;
    let score = u8::from(hf.first_page_differs) + u8::from(hf.even_page_differs);
    Measurement::new(f64::from(score), f64::from(score) / 2.0).with_evidence(json!({
        "firstPageDiffers": hf.first_page_differs,
        "evenPageDiffers": hf.even_page_differs,
        "evenAndOdd": hf.even_and_odd,
    }))
}

fn page_numbers(w: &WordFeatures) -> Measurement {
    Measurement::flag(w.header_footer.has_page_numbers)
}

fn tables(w: &WordFeatures) -> Measurement {
    Measurement::count(w.table_count, 1).with_evidence(json!({ "tables": w.table_count }))
}

fn word_count(w: &WordFeatures) -> Measurement {
    Measurement::count(w.word_count, TARGET_WORDS).with_evidence(json!({
        "words": w.word_count,
        "characters": w.character_count,
        "truncated": w.truncated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_parser::features::{HeaderFooterSummary, TableOfContents, TocEntry};

    #[test]
    fn toc_field_beats_synthesised_headings() {
        let mut w = WordFeatures::default();
        assert_eq!(table_of_contents(&w).value, 0.0);

        w.toc = TableOfContents {
            has_field: false,
            source: TocSource::Headings,
            entries: vec![TocEntry {
                level: 1,
                text: "Intro".into(),
            }],
        };
        let m = table_of_contents(&w);
        assert_eq!((m.value, m.fraction), (1.0, 0.5));

        w.toc.has_field = true;
        w.toc.source = TocSource::Field;
        let m = table_of_contents(&w);
        assert_eq!((m.value, m.fraction), (2.0, 1.0));
        assert_eq!(m.evidence["source"], "field");
    }

    #[test]
    fn header_footer_scores_each_part() {
        let mut w = WordFeatures {
            header_footer: HeaderFooterSummary {
                has_header: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(header_footer(&w).value, 1.0);
        w.header_footer.has_footer = true;
        assert_eq!(header_footer(&w).fraction, 1.0);

        assert_eq!(header_footer_variants(&w).value, 0.0);
        w.header_footer.first_page_differs = true;
        assert_eq!(header_footer_variants(&w).fraction, 0.5);
    }

    #[test]
    fn counts_saturate_at_target() {
        let w = WordFeatures {
            heading_count: 7,
            word_count: 250,
            ..Default::default()
        };
        assert_eq!(headings(&w).fraction, 1.0);
        assert_eq!(word_count(&w).fraction, 0.5);
        assert_eq!(word_count(&w).value, 250.0);
    }
}
