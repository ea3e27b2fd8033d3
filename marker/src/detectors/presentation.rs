use std::collections::BTreeSet;

use doc_parser::features::PresentationFeatures;
use doc_parser::{DocumentFeatures, FileKind};
use serde_json::json;

use super::{Measure, wrong_kind};
use crate::error::DetectorError;
use crate::traits::detector::Detector;
use crate::types::Measurement;

/// Slides needed for full credit from `slide_count` when a level has no
/// explicit requirement.
const TARGET_SLIDES: usize = 10;
const TARGET_LAYOUTS: usize = 3;

/// A detector that reads presentation features only.
pub struct PresentationDetector {
    key: &'static str,
    measure: Measure<PresentationFeatures>,
}

impl PresentationDetector {
    pub const fn new(key: &'static str, measure: Measure<PresentationFeatures>) -> Self {
        Self { key, measure }
    }
}

impl Detector for PresentationDetector {
    fn key(&self) -> &str {
        self.key
    }

    fn applies_to(&self) -> Option<FileKind> {
        Some(FileKind::Presentation)
    }

    fn evaluate(&self, features: &DocumentFeatures) -> Result<Measurement, DetectorError> {
        features
            .as_presentation()
            .map(self.measure)
            .ok_or_else(|| wrong_kind(self.key, FileKind::Presentation, features))
    }
}

pub fn builtin() -> Vec<PresentationDetector> {
    vec![
        PresentationDetector::new("slide_count", slide_count),
        PresentationDetector::new("transitions", transitions),
        PresentationDetector::new("animations", animations),
        PresentationDetector::new("theme_customization", theme_customization),
        PresentationDetector::new("speaker_notes", speaker_notes),
        PresentationDetector::new("layout_variety", layout_variety),
        PresentationDetector::new("title_slide", title_slide),
        PresentationDetector::new("charts", charts),
        PresentationDetector::new("presentation_hyperlinks", hyperlinks),
    ]
}

fn slide_count(p: &PresentationFeatures) -> Measurement {
    Measurement::count(p.slide_count, TARGET_SLIDES).with_evidence(json!({
        "slideCount": p.slide_count,
        "truncated": p.truncated,
    }))
}

fn transitions(p: &PresentationFeatures) -> Measurement {
    let with: Vec<&str> = p.slides.iter().filter_map(|s| s.transition.as_deref()).collect();
    let kinds: BTreeSet<&str> = with.iter().copied().collect();
    Measurement::share(with.len(), p.slide_count).with_evidence(json!({
        "slidesWithTransition": with.len(),
        "slideCount": p.slide_count,
        "kinds": kinds,
    }))
}

fn animations(p: &PresentationFeatures) -> Measurement {
    let animated: Vec<usize> = p.slides.iter().filter(|s| s.has_animation).map(|s| s.index).collect();
    Measurement::share(animated.len(), p.slide_count).with_evidence(json!({
        "animatedSlides": animated,
    }))
}

fn theme_customization(p: &PresentationFeatures) -> Measurement {
    Measurement::flag(p.has_theme_customization).with_evidence(json!({
        "theme": p.theme.name,
        "colorScheme": p.theme.color_scheme,
        "fontScheme": p.theme.font_scheme,
    }))
}

fn speaker_notes(p: &PresentationFeatures) -> Measurement {
    let with: Vec<usize> = p.slides.iter().filter(|s| s.has_notes).map(|s| s.index).collect();
    Measurement::share(with.len(), p.slide_count).with_evidence(json!({
        "slidesWithNotes": with,
    }))
}

fn layout_variety(p: &PresentationFeatures) -> Measurement {
    let layouts: BTreeSet<&str> = p
        .slides
        .iter()
        .filter_map(|s| s.layout_name.as_deref().or(s.layout_id.as_deref()))
        .collect();
    Measurement::count(layouts.len(), TARGET_LAYOUTS).with_evidence(json!({
        "layouts": layouts,
    }))
}

/// 1 when the deck opens on a title layout, 0.5 when the first slide only
/// carries a title placeholder, otherwise 0.
fn title_slide(p: &PresentationFeatures) -> Measurement {
    let Some(first) = p.slides.first() else {
        return Measurement::flag(false);
    };
    let title_layout = matches!(first.layout_type.as_deref(), Some("title") | Some("ctrTitle"));
    let has_title = first.title.as_deref().is_some_and(|t| !t.trim().is_empty());
    let score = if title_layout {
        1.0
    } else if has_title {
        0.5
    } else {
        0.0
    };
    Measurement::new(score, score).with_evidence(json!({
        "layoutType": first.layout_type,
        "title": first.title,
    }))
}

fn charts(p: &PresentationFeatures) -> Measurement {
    let total: usize = p.slides.iter().map(|s| s.shapes.charts).sum();
    Measurement::count(total, 1).with_evidence(json!({ "charts": total }))
}

fn hyperlinks(p: &PresentationFeatures) -> Measurement {
    Measurement::count(p.hyperlink_count, 1).with_evidence(json!({
        "hyperlinks": p.hyperlink_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_parser::features::SlideFeatures;

    fn slide(index: usize) -> SlideFeatures {
        SlideFeatures {
            index,
            part_name: format!("ppt/slides/slide{index}.xml"),
            ..Default::default()
        }
    }

    fn deck(slides: Vec<SlideFeatures>) -> PresentationFeatures {
        PresentationFeatures {
            slide_count: slides.len(),
            has_any_transition: slides.iter().any(|s| s.transition.is_some()),
            has_any_animation: slides.iter().any(|s| s.has_animation),
            slides,
            ..Default::default()
        }
    }

    #[test]
    fn transitions_report_share_of_slides() {
        let mut a = slide(1);
        a.transition = Some("fade".into());
        let mut b = slide(2);
        b.transition = Some("push".into());
        let p = deck(vec![a, b, slide(3), slide(4)]);

        let m = transitions(&p);
        assert_eq!(m.value, 2.0);
        assert_eq!(m.fraction, 0.5);
        assert_eq!(m.evidence["kinds"], json!(["fade", "push"]));
    }

    #[test]
    fn empty_deck_measures_zero() {
        let p = deck(vec![]);
        for d in builtin() {
            let m = d.evaluate(&DocumentFeatures::Presentation(p.clone())).unwrap();
            assert_eq!(m.value, 0.0, "{}", d.key());
            assert_eq!(m.fraction, 0.0, "{}", d.key());
        }
    }

    #[test]
    fn title_slide_prefers_layout() {
        let mut first = slide(1);
        first.title = Some("Welcome".into());
        assert_eq!(title_slide(&deck(vec![first.clone()])).value, 0.5);

        first.layout_type = Some("title".into());
        assert_eq!(title_slide(&deck(vec![first])).value, 1.0);
    }

    #[test]
    fn layout_variety_counts_distinct_layouts() {
        let mut slides: Vec<SlideFeatures> = (1..=4).map(slide).collect();
        slides[0].layout_name = Some("Title Slide".into());
        slides[1].layout_name = Some("Title and Content".into());
        slides[2].layout_name = Some("Title and Content".into());
        slides[3].layout_id = Some("ppt/slideLayouts/slideLayout7.xml".into());

        let m = layout_variety(&deck(slides));
        assert_eq!(m.value, 3.0);
        assert_eq!(m.fraction, 1.0);
    }

    #[test]
    fn counts_charts_and_notes() {
        let mut a = slide(1);
        a.shapes.charts = 2;
        a.has_notes = true;
        let p = deck(vec![a, slide(2)]);
        assert_eq!(charts(&p).value, 2.0);
        let notes = speaker_notes(&p);
        assert_eq!(notes.value, 1.0);
        assert_eq!(notes.fraction, 0.5);
    }
}
