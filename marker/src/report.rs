//! # Grade Report Module
//!
//! Serializable grading output: one [`CriterionEvalResult`] per evaluated
//! criterion, rolled up into a [`GradeResult`] for the file.
//!
//! ## JSON Output Example
//!
//! ```json
//! {
//!   "file": { "id": "3", "name": "deck.pptx" },
//!   "fileType": "presentation",
//!   "rubricTitle": "Presentation basics",
//!   "totalPoints": 7.25,
//!   "maxPossiblePoints": 10.0,
//!   "percentage": 72.5,
//!   "criteria": {
//!     "slides": { "passed": true, "points": 2.0, "level": "full", "reason": "..." },
//!     "theme": { "passed": false, "points": 0.0, "level": "error", "reason": "unresolved detector" }
//!   },
//!   "gradedAt": "2025-01-01T12:00:00Z",
//!   "processingTimeMs": 42
//! }
//! ```
//!
//! ## Design Notes
//!
//! - `criteria` is keyed by criterion id and serialized in id order so two
//!   gradings of the same input produce identical documents apart from
//!   `gradedAt` and `processingTimeMs`.
//! - `details` is omitted unless the caller asked for it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use doc_parser::FileKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Level code used when a criterion could not be measured.
pub const ERROR_LEVEL: &str = "error";
/// Level code used when no level accepted the measurement.
pub const UNMATCHED_LEVEL: &str = "unmatched";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionEvalResult {
    pub passed: bool,
    pub points: f64,
    /// Code of the selected level, or `error` / `unmatched`.
    pub level: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl CriterionEvalResult {
    pub fn error(reason: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            passed: false,
            points: 0.0,
            level: ERROR_LEVEL.to_string(),
            reason: reason.into(),
            details,
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == ERROR_LEVEL
    }
}

/// Identifies the graded file in a result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdentity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Entry path of the graded document inside a submitted container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_entry: Option<String>,
}

impl FileIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResult {
    pub file: FileIdentity,
    pub file_type: FileKind,
    pub rubric_title: String,
    pub total_points: f64,
    pub max_possible_points: f64,
    pub percentage: f64,
    pub criteria: BTreeMap<String, CriterionEvalResult>,
    /// Set when feature extraction stopped at a processing ceiling.
    #[serde(default)]
    pub truncated: bool,
    pub graded_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl GradeResult {
    pub fn passed_count(&self) -> usize {
        self.criteria.values().filter(|c| c.passed).count()
    }

    pub fn error_count(&self) -> usize {
        self.criteria.values().filter(|c| c.is_error()).count()
    }
}
