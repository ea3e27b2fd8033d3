//! # Marker Library
//!
//! Rubric-driven grading of extracted document features.
//!
//! ## Key Concepts
//! - **Rubric**: criteria with point levels, loaded from JSON or a built-in preset.
//! - **Detectors**: pluggable measurements looked up by a criterion's `detectorKey`.
//! - **RuleEngine**: measures every criterion, selects a level, and rolls the
//!   points into a [`GradeResult`].
//!
//! A detector that is missing or cannot handle the document degrades only its
//! own criterion to the `error` level; the rest of the rubric is still graded.

pub mod detectors;
pub mod error;
pub mod presets;
pub mod report;
pub mod rubric;
pub mod scorer;
pub mod traits;
pub mod types;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use doc_parser::DocumentFeatures;
use serde_json::json;
use tracing::{debug, warn};

use crate::detectors::DetectorRegistry;
use crate::report::{CriterionEvalResult, FileIdentity, GradeResult, UNMATCHED_LEVEL};
use crate::rubric::{Criterion, Rubric};
use crate::types::{EvaluationOptions, Measurement};

pub use crate::error::{DetectorError, MarkerError};

/// Evaluates feature records against rubrics.
///
/// The engine owns a detector registry and is otherwise stateless, so one
/// instance can be shared by any number of concurrent evaluations.
pub struct RuleEngine {
    registry: DetectorRegistry,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    /// An engine backed by every built-in detector.
    pub fn new() -> Self {
        Self::with_registry(DetectorRegistry::with_builtin())
    }

    pub fn with_registry(registry: DetectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Grades `features` against `rubric`.
    ///
    /// # Arguments
    /// * `file` - Identity copied into the result.
    /// * `features` - Feature record of the document.
    /// * `rubric` - The rubric to apply. It is not re-validated here.
    /// * `options` - Criterion filter and whether to attach details.
    pub fn evaluate(
        &self,
        file: FileIdentity,
        features: &DocumentFeatures,
        rubric: &Rubric,
        options: &EvaluationOptions,
    ) -> GradeResult {
        let started = Instant::now();

        if let Some(only) = &options.only_criteria {
            for id in only.iter().filter(|id| rubric.criterion(id).is_none()) {
                warn!(criterion = %id, rubric = %rubric.title, "requested criterion not in rubric");
            }
        }

        let mut criteria = BTreeMap::new();
        let mut earned = 0.0;
        let mut max_possible = 0.0;
        for criterion in rubric.criteria.iter().filter(|c| options.includes(&c.id)) {
            let result = self.evaluate_criterion(criterion, features, options.include_details);
            debug!(
                file_id = %file.id,
                criterion = %criterion.id,
                level = %result.level,
                points = result.points,
                "criterion evaluated"
            );
            earned += result.points;
            max_possible += criterion.max_points;
            criteria.insert(criterion.id.clone(), result);
        }

        let total_points = scorer::round_to_quarter(earned);
        GradeResult {
            file,
            file_type: features.kind(),
            rubric_title: rubric.title.clone(),
            total_points,
            max_possible_points: max_possible,
            percentage: scorer::percentage(total_points, max_possible),
            criteria,
            truncated: features.truncated(),
            graded_at: Utc::now(),
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Measures one criterion and maps the measurement onto a level.
    pub fn evaluate_criterion(
        &self,
        criterion: &Criterion,
        features: &DocumentFeatures,
        include_details: bool,
    ) -> CriterionEvalResult {
        let key = criterion.detector_key.as_str();
        let detector = match self.registry.resolve(key) {
            Ok(d) => d,
            Err(e) => {
                warn!(criterion = %criterion.id, detector = %key, "unresolved detector");
                let details = include_details.then(|| json!({ "detector": key, "error": e.to_string() }));
                return CriterionEvalResult::error("unresolved detector", details);
            }
        };

        let measurement = match detector.evaluate(features) {
            Ok(m) => m,
            Err(e) => {
                warn!(criterion = %criterion.id, detector = %key, error = %e, "detector failed");
                let details = include_details.then(|| json!({ "detector": key }));
                return CriterionEvalResult::error(e.to_string(), details);
            }
        };

        let details = include_details.then(|| details_for(key, &measurement));
        match scorer::select_level(criterion, &measurement) {
            Some(level) => {
                let points = scorer::clamp_points(level.points, criterion.max_points);
                CriterionEvalResult {
                    passed: points > 0.0,
                    points,
                    level: level.code.clone(),
                    reason: format!("{} (measured {})", level.name, format_value(measurement.value)),
                    details,
                }
            }
            None => CriterionEvalResult {
                passed: false,
                points: 0.0,
                level: UNMATCHED_LEVEL.to_string(),
                reason: format!(
                    "no level matched measured value {}",
                    format_value(measurement.value)
                ),
                details,
            },
        }
    }
}

fn details_for(key: &str, m: &Measurement) -> serde_json::Value {
    json!({
        "detector": key,
        "value": m.value,
        "fraction": m.fraction,
        "evidence": m.evidence,
    })
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{}", scorer::round2(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{Level, Requirement, ScoringConfig};
    use crate::traits::detector::Detector;
    use doc_parser::features::{PresentationFeatures, SlideFeatures, WordFeatures};

    struct Failing;

    impl Detector for Failing {
        fn key(&self) -> &str {
            "failing"
        }

        fn evaluate(&self, _: &DocumentFeatures) -> Result<Measurement, DetectorError> {
            Err(DetectorError::Measurement {
                key: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    fn level(code: &str, points: f64, min: Option<f64>) -> Level {
        Level {
            code: code.into(),
            name: code.to_uppercase(),
            description: String::new(),
            points,
            requirement: min.map(Requirement::at_least),
        }
    }

    fn criterion(id: &str, key: &str, max: f64, levels: Vec<Level>) -> Criterion {
        Criterion {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            detector_key: key.into(),
            max_points: max,
            levels,
        }
    }

    fn rubric(criteria: Vec<Criterion>) -> Rubric {
        Rubric {
            title: "test".into(),
            version: "1.0".into(),
            locale: "en".into(),
            document_kind: None,
            total_points: criteria.iter().map(|c| c.max_points).sum(),
            scoring: ScoringConfig::default(),
            criteria,
        }
    }

    fn deck(slides: usize) -> DocumentFeatures {
        let slides: Vec<SlideFeatures> = (1..=slides)
            .map(|index| SlideFeatures {
                index,
                ..Default::default()
            })
            .collect();
        DocumentFeatures::Presentation(PresentationFeatures {
            slide_count: slides.len(),
            slides,
            ..Default::default()
        })
    }

    fn two_criteria() -> Rubric {
        rubric(vec![
            criterion(
                "a",
                "slide_count",
                5.0,
                vec![level("top", 5.0, Some(3.0)), level("zero", 0.0, None)],
            ),
            criterion(
                "b",
                "animations",
                5.0,
                vec![level("top", 5.0, Some(1.0)), level("zero", 0.0, None)],
            ),
        ])
    }

    #[test]
    fn half_marks_give_fifty_percent() {
        let engine = RuleEngine::new();
        let result = engine.evaluate(
            FileIdentity::new("f"),
            &deck(4),
            &two_criteria(),
            &EvaluationOptions::default(),
        );
        assert_eq!(result.total_points, 5.0);
        assert_eq!(result.max_possible_points, 10.0);
        assert_eq!(result.percentage, 50.0);
        assert_eq!(result.criteria["a"].level, "top");
        assert!(result.criteria["a"].passed);
        assert_eq!(result.criteria["b"].level, "zero");
        assert!(!result.criteria["b"].passed);
        assert_eq!(result.file_type, doc_parser::FileKind::Presentation);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let engine = RuleEngine::new();
        let r = crate::presets::preset(crate::presets::PRESENTATION_BASIC).unwrap();
        let features = deck(6);
        let opts = EvaluationOptions::default();
        let mut first = engine.evaluate(FileIdentity::new("x"), &features, &r, &opts);
        let mut second = engine.evaluate(FileIdentity::new("x"), &features, &r, &opts);
        second.graded_at = first.graded_at;
        second.processing_time_ms = 0;
        first.processing_time_ms = 0;
        assert_eq!(first, second);
    }

    #[test]
    fn max_possible_is_sum_and_points_stay_in_bounds() {
        let engine = RuleEngine::new();
        for (name, features) in [
            (crate::presets::PRESENTATION_BASIC, deck(9)),
            (crate::presets::WORD_BASIC, DocumentFeatures::WordProcessor(WordFeatures::default())),
        ] {
            let r = crate::presets::preset(name).unwrap();
            let result = engine.evaluate(FileIdentity::new(name), &features, &r, &EvaluationOptions::default());
            assert_eq!(result.max_possible_points, r.computed_total());
            for c in &r.criteria {
                let points = result.criteria[&c.id].points;
                assert!((0.0..=c.max_points).contains(&points), "{}: {points}", c.id);
            }
        }
    }

    #[test]
    fn unresolved_detector_degrades_only_its_criterion() {
        let mut r = two_criteria();
        r.criteria[1].detector_key = "no_such_detector".into();
        let result = RuleEngine::new().evaluate(
            FileIdentity::new("f"),
            &deck(3),
            &r,
            &EvaluationOptions::default(),
        );
        let bad = &result.criteria["b"];
        assert_eq!(bad.level, "error");
        assert_eq!(bad.reason, "unresolved detector");
        assert_eq!(bad.points, 0.0);
        assert!(!bad.passed);
        assert_eq!(bad.details.as_ref().unwrap()["detector"], "no_such_detector");
        assert_eq!(result.criteria["a"].points, 5.0);
        assert_eq!(result.max_possible_points, 10.0);
    }

    #[test]
    fn wrong_kind_and_failing_detectors_are_errors() {
        let mut registry = DetectorRegistry::with_builtin();
        registry.register(Failing);
        let engine = RuleEngine::with_registry(registry);
        let r = rubric(vec![
            criterion("h", "headings", 2.0, vec![level("ok", 2.0, Some(1.0)), level("none", 0.0, None)]),
            criterion("f", "failing", 1.0, vec![level("none", 0.0, None)]),
        ]);
        let result = engine.evaluate(FileIdentity::new("f"), &deck(2), &r, &EvaluationOptions::default());
        assert!(result.criteria["h"].is_error());
        assert!(result.criteria["h"].reason.contains("expects a word-processor"));
        assert!(result.criteria["f"].is_error());
        assert!(result.criteria["f"].reason.contains("boom"));
        assert_eq!(result.total_points, 0.0);
    }

    #[test]
    fn only_criteria_limits_scope() {
        let opts = EvaluationOptions {
            only_criteria: Some(vec!["a".into(), "missing".into()]),
            include_details: false,
        };
        let result = RuleEngine::new().evaluate(FileIdentity::new("f"), &deck(3), &two_criteria(), &opts);
        assert_eq!(result.criteria.len(), 1);
        assert_eq!(result.max_possible_points, 5.0);
        assert_eq!(result.percentage, 100.0);
        assert!(result.criteria["a"].details.is_none());
    }

    #[test]
    fn unvalidated_rubrics_are_clamped_or_unmatched() {
        let r = rubric(vec![
            criterion("over", "slide_count", 2.0, vec![level("huge", 9.0, Some(1.0))]),
            criterion("gap", "slide_count", 2.0, vec![level("big", 2.0, Some(50.0))]),
        ]);
        let result = RuleEngine::new().evaluate(FileIdentity::new("f"), &deck(3), &r, &EvaluationOptions::default());
        assert_eq!(result.criteria["over"].points, 2.0);
        assert_eq!(result.criteria["gap"].level, "unmatched");
        assert_eq!(result.criteria["gap"].points, 0.0);
        assert!(result.criteria["gap"].reason.contains("measured value 3"));
    }

    #[test]
    fn validated_rubric_falls_back_to_its_zero_level() {
        let mut none = level("none", 0.0, None);
        none.requirement = Some(Requirement {
            min: None,
            max: Some(0.0),
        });
        let r = rubric(vec![criterion(
            "slides",
            "slide_count",
            2.0,
            vec![level("full", 2.0, Some(5.0)), none],
        )]);
        assert!(r.validate().unwrap().is_empty());

        let result = RuleEngine::new().evaluate(FileIdentity::new("f"), &deck(3), &r, &EvaluationOptions::default());
        let slides = &result.criteria["slides"];
        assert_eq!(slides.level, "none");
        assert_eq!(slides.points, 0.0);
        assert!(!slides.passed);
        assert!(slides.reason.contains("measured 3"));
    }

    #[test]
    fn total_is_rounded_to_quarter() {
        let r = rubric(vec![
            criterion("a", "slide_count", 1.0, vec![level("x", 0.125, Some(1.0)), level("z", 0.0, None)]),
            criterion("b", "slide_count", 7.0, vec![level("y", 7.0, Some(1.0)), level("z", 0.0, None)]),
        ]);
        let result = RuleEngine::new().evaluate(FileIdentity::new("f"), &deck(1), &r, &EvaluationOptions::default());
        assert_eq!(result.total_points, 7.25);
        assert_eq!(result.percentage, 90.625);
    }
}
