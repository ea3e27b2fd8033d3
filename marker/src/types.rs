use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw result of running a detector against a feature record.
///
/// `value` is the quantity a level requirement is compared against (a count,
/// or 0/1 for yes/no checks). `fraction` is the same measurement normalised to
/// `0..=1` and is used by levels that carry no explicit requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub fraction: f64,
    #[serde(default)]
    pub evidence: Value,
}

impl Measurement {
    pub fn new(value: f64, fraction: f64) -> Self {
        Self {
            value,
            fraction: fraction.clamp(0.0, 1.0),
            evidence: Value::Null,
        }
    }

    pub fn flag(present: bool) -> Self {
        let v = if present { 1.0 } else { 0.0 };
        Self::new(v, v)
    }

    /// A count measured against the amount that earns full credit.
    pub fn count(value: usize, target: usize) -> Self {
        let fraction = if target == 0 {
            1.0
        } else {
            value as f64 / target as f64
        };
        Self::new(value as f64, fraction)
    }

    /// `part` items out of `whole`, where the value is the raw count.
    pub fn share(part: usize, whole: usize) -> Self {
        let fraction = if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64
        };
        Self::new(part as f64, fraction)
    }

    pub fn with_evidence(mut self, evidence: Value) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Per-call grading options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Restrict evaluation to these criterion ids.
    #[serde(default)]
    pub only_criteria: Option<Vec<String>>,
    #[serde(default = "default_include_details")]
    pub include_details: bool,
}

fn default_include_details() -> bool {
    true
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            only_criteria: None,
            include_details: default_include_details(),
        }
    }
}

impl EvaluationOptions {
    pub fn includes(&self, criterion_id: &str) -> bool {
        match &self.only_criteria {
            Some(ids) => ids.iter().any(|id| id == criterion_id),
            None => true,
        }
    }
}
