//! # Rubric Model
//!
//! Passive rubric definitions as authored by the external rubric editor. The
//! JSON form uses camelCase keys:
//!
//! ```json
//! {
//!   "title": "Presentation basics",
//!   "version": "1.0",
//!   "locale": "en",
//!   "totalPoints": 2,
//!   "scoring": { "method": "sum", "rounding": "half-up-to-0.25" },
//!   "criteria": [
//!     {
//!       "id": "slides",
//!       "name": "Enough slides",
//!       "detectorKey": "slide_count",
//!       "maxPoints": 2,
//!       "levels": [
//!         { "code": "full", "name": "Eight or more", "points": 2, "requirement": { "min": 8 } },
//!         { "code": "none", "name": "Too few", "points": 0 }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Validation rejects structural mistakes (duplicate ids, missing zero level,
//! level points above the criterion maximum) and only warns when the declared
//! `totalPoints` disagrees with the criteria.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use doc_parser::FileKind;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MarkerError;

const POINTS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Sum,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingMode {
    /// Half-up rounding to the nearest quarter point.
    #[default]
    #[serde(rename = "half-up-to-0.25")]
    HalfUpQuarter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub method: ScoringMethod,
    #[serde(default)]
    pub rounding: RoundingMode,
}

/// Inclusive bounds on a detector's measured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Requirement {
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub fn matches(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<Requirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub detector_key: String,
    pub max_points: f64,
    pub levels: Vec<Level>,
}

impl Criterion {
    /// Levels ordered by points, highest first. Equal points keep their
    /// declaration order.
    pub fn levels_by_points(&self) -> Vec<&Level> {
        let mut levels: Vec<&Level> = self.levels.iter().collect();
        levels.sort_by(|a, b| b.points.total_cmp(&a.points));
        levels
    }

    fn validate(&self) -> Result<(), MarkerError> {
        let invalid = |msg: String| Err(MarkerError::InvalidRubric(format!("criterion '{}': {msg}", self.id)));

        if self.id.trim().is_empty() {
            return Err(MarkerError::InvalidRubric("criterion with empty id".into()));
        }
        if self.detector_key.trim().is_empty() {
            return invalid("empty detectorKey".into());
        }
        if !self.max_points.is_finite() || self.max_points <= 0.0 {
            return invalid(format!("maxPoints must be > 0, got {}", self.max_points));
        }
        if self.levels.is_empty() {
            return invalid("no levels".into());
        }

        let mut codes = HashSet::new();
        for level in &self.levels {
            if !codes.insert(level.code.as_str()) {
                return invalid(format!("duplicate level code '{}'", level.code));
            }
            if !level.points.is_finite() || level.points < 0.0 {
                return invalid(format!("level '{}' has negative points", level.code));
            }
            if level.points > self.max_points + POINTS_EPSILON {
                return invalid(format!(
                    "level '{}' awards {} points, above maxPoints {}",
                    level.code, level.points, self.max_points
                ));
            }
        }
        if !self.levels.iter().any(|l| l.points == 0.0) {
            return invalid("no zero-point level".into());
        }
        Ok(())
    }
}

/// Non-fatal findings from [`Rubric::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum RubricWarning {
    TotalPointsMismatch { declared: f64, computed: f64 },
}

impl fmt::Display for RubricWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RubricWarning::TotalPointsMismatch { declared, computed } => write!(
                f,
                "totalPoints is {declared} but criteria add up to {computed}"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    pub title: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Document kind the rubric was written for, if it is kind specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_kind: Option<FileKind>,
    pub total_points: f64,
    #[serde(default)]
    pub scoring: ScoringConfig,
    pub criteria: Vec<Criterion>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

impl Rubric {
    /// Parses a rubric without validating it.
    pub fn from_json_str(json: &str) -> Result<Self, MarkerError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads, parses and validates a rubric file. Warnings are logged.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MarkerError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MarkerError::Io(format!("{}: {e}", path.display())))?;
        let rubric = Self::from_json_str(&text)?;
        for warning in rubric.validate()? {
            warn!(rubric = %rubric.title, path = %path.display(), "{warning}");
        }
        Ok(rubric)
    }

    pub fn validate(&self) -> Result<Vec<RubricWarning>, MarkerError> {
        if self.criteria.is_empty() {
            return Err(MarkerError::InvalidRubric("rubric has no criteria".into()));
        }

        let mut ids = HashSet::new();
        for criterion in &self.criteria {
            if !ids.insert(criterion.id.as_str()) {
                return Err(MarkerError::InvalidRubric(format!(
                    "duplicate criterion id '{}'",
                    criterion.id
                )));
            }
            criterion.validate()?;
        }

        let computed = self.computed_total();
        let mut warnings = Vec::new();
        if (computed - self.total_points).abs() > POINTS_EPSILON {
            warnings.push(RubricWarning::TotalPointsMismatch {
                declared: self.total_points,
                computed,
            });
        }
        Ok(warnings)
    }

    /// Sum of every criterion's `maxPoints`.
    pub fn computed_total(&self) -> f64 {
        self.criteria.iter().map(|c| c.max_points).sum()
    }

    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String, MarkerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
