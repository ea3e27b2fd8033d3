//! Detector registry and built-in detectors.
//!
//! A rubric refers to detectors by string key. The registry is built once and
//! shared read-only by every evaluation; an unknown key surfaces as
//! [`DetectorError::Unresolved`] rather than a dispatch failure.

pub mod common;
pub mod presentation;
pub mod word;

use std::collections::HashMap;

use doc_parser::{DocumentFeatures, FileKind};
use tracing::warn;

use crate::error::DetectorError;
use crate::traits::detector::Detector;
use crate::types::Measurement;

pub struct DetectorRegistry {
    detectors: HashMap<String, Box<dyn Detector>>,
}

impl DetectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            detectors: HashMap::new(),
        }
    }

    /// A registry holding every built-in detector.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for d in presentation::builtin() {
            registry.register(d);
        }
        for d in word::builtin() {
            registry.register(d);
        }
        registry.register(common::ImagesDetector);
        registry.register(common::MetadataTitleDetector);
        registry
    }

    /// Adds a detector, replacing any previous one with the same key.
    pub fn register<D: Detector + 'static>(&mut self, detector: D) {
        let key = detector.key().to_string();
        if self.detectors.insert(key.clone(), Box::new(detector)).is_some() {
            warn!(detector = %key, "detector replaced in registry");
        }
    }

    pub fn get(&self, key: &str) -> Option<&dyn Detector> {
        self.detectors.get(key).map(|d| d.as_ref())
    }

    pub fn resolve(&self, key: &str) -> Result<&dyn Detector, DetectorError> {
        self.get(key)
            .ok_or_else(|| DetectorError::Unresolved(key.to_string()))
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.detectors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

fn wrong_kind(key: &str, expected: FileKind, features: &DocumentFeatures) -> DetectorError {
    DetectorError::WrongDocumentKind {
        key: key.to_string(),
        expected,
        found: features.kind(),
    }
}

/// Measurement function behind a kind-specific detector.
pub type Measure<T> = fn(&T) -> Measurement;
