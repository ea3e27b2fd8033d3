//! Detectors that work on either document kind.

use doc_parser::DocumentFeatures;
use serde_json::json;

use crate::error::DetectorError;
use crate::traits::detector::Detector;
use crate::types::Measurement;

/// Pictures across all slides, or inline and VML images in a document.
pub struct ImagesDetector;

impl Detector for ImagesDetector {
    fn key(&self) -> &str {
        "images"
    }

    fn evaluate(&self, features: &DocumentFeatures) -> Result<Measurement, DetectorError> {
        let images = match features {
            DocumentFeatures::Presentation(p) => p.slides.iter().map(|s| s.shapes.pictures).sum(),
            DocumentFeatures::WordProcessor(w) => w.image_count,
        };
        Ok(Measurement::count(images, 1).with_evidence(json!({ "images": images })))
    }
}

/// Whether the core properties carry a non-blank title.
pub struct MetadataTitleDetector;

impl Detector for MetadataTitleDetector {
    fn key(&self) -> &str {
        "metadata_title"
    }

    fn evaluate(&self, features: &DocumentFeatures) -> Result<Measurement, DetectorError> {
        let title = features.metadata().title.as_deref().map(str::trim).filter(|t| !t.is_empty());
        Ok(Measurement::flag(title.is_some()).with_evidence(json!({ "title": title })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_parser::features::{PresentationFeatures, SlideFeatures, WordFeatures};

    #[test]
    fn images_cover_both_kinds() {
        let mut slide = SlideFeatures::default();
        slide.shapes.pictures = 3;
        let deck = DocumentFeatures::Presentation(PresentationFeatures {
            slides: vec![slide.clone(), slide],
            slide_count: 2,
            ..Default::default()
        });
        assert_eq!(ImagesDetector.evaluate(&deck).unwrap().value, 6.0);

        let doc = DocumentFeatures::WordProcessor(WordFeatures {
            image_count: 1,
            ..Default::default()
        });
        let m = ImagesDetector.evaluate(&doc).unwrap();
        assert_eq!((m.value, m.fraction), (1.0, 1.0));
    }

    #[test]
    fn blank_title_does_not_count() {
        let mut w = WordFeatures::default();
        w.metadata.title = Some("   ".into());
        let m = MetadataTitleDetector
            .evaluate(&DocumentFeatures::WordProcessor(w.clone()))
            .unwrap();
        assert_eq!(m.value, 0.0);

        w.metadata.title = Some("Report".into());
        let m = MetadataTitleDetector
            .evaluate(&DocumentFeatures::WordProcessor(w))
            .unwrap();
        assert_eq!(m.value, 1.0);
        assert_eq!(m.evidence["title"], "Report");
    }
}
