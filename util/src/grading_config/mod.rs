use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::archive_guard::ExtractionOptions;

/// Limits applied when a document's own package (the OOXML zip) is opened.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PackageLimits {
    #[serde(default = "default_max_parts")]
    pub max_parts: usize,

    #[serde(default = "default_max_package_size")]
    pub max_total_size: u64,

    #[serde(default = "default_max_package_depth")]
    pub max_depth: usize,
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self {
            max_parts: default_max_parts(),
            max_total_size: default_max_package_size(),
            max_depth: default_max_package_depth(),
        }
    }
}

impl PackageLimits {
    pub fn to_extraction_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            max_files: self.max_parts,
            max_total_size: self.max_total_size,
            max_depth: self.max_depth,
            allowed_extensions: None,
        }
    }
}

/// Processing ceilings embedded in the feature extraction loops.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ParseLimits {
    #[serde(default = "default_max_slides")]
    pub max_slides: usize,

    #[serde(default = "default_max_shapes_per_slide")]
    pub max_shapes_per_slide: usize,

    #[serde(default = "default_max_paragraphs")]
    pub max_paragraphs: usize,

    /// Upper bound on nodes in a single XML part.
    #[serde(default = "default_max_xml_nodes")]
    pub max_xml_nodes: u32,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_slides: default_max_slides(),
            max_shapes_per_slide: default_max_shapes_per_slide(),
            max_paragraphs: default_max_paragraphs(),
            max_xml_nodes: default_max_xml_nodes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BatchSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_include_details")]
    pub include_details: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            include_details: default_include_details(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct GradingConfig {
    #[serde(default)]
    pub archive: ExtractionOptions,

    #[serde(default)]
    pub package: PackageLimits,

    #[serde(default)]
    pub parsing: ParseLimits,

    #[serde(default)]
    pub batch: BatchSettings,
}

impl GradingConfig {
    pub fn default_config() -> Self {
        GradingConfig::default()
    }

    /// Clamp values that would make the pipeline unusable.
    pub fn sanitize(mut self) -> Self {
        if self.batch.concurrency == 0 {
            self.batch.concurrency = 1;
        }
        if self.parsing.max_slides == 0 {
            self.parsing.max_slides = default_max_slides();
        }
        if self.parsing.max_paragraphs == 0 {
            self.parsing.max_paragraphs = default_max_paragraphs();
        }
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let cfg: GradingConfig =
            serde_json::from_str(raw).map_err(|e| format!("Invalid grading config JSON: {e}"))?;
        Ok(cfg.sanitize())
    }

    pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path_ref = path.as_ref();
        if !path_ref.is_file() {
            return Err(format!(
                "Config file {:?} does not exist or is not a valid file",
                path_ref
            ));
        }

        let content = fs::read_to_string(path_ref)
            .map_err(|e| format!("Failed to read config file {:?}: {}", path_ref, e))?;
        Self::from_json_str(&content)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config to JSON: {e}"))?;
        fs::write(path.as_ref(), json)
            .map_err(|e| format!("Failed to write config file to disk: {e:?}"))
    }
}

//Default Functions

fn default_max_parts() -> usize {
    5_000
}

fn default_max_package_size() -> u64 {
    200 * 1024 * 1024
}

fn default_max_package_depth() -> usize {
    16
}

fn default_max_slides() -> usize {
    1_000
}

fn default_max_shapes_per_slide() -> usize {
    5_000
}

fn default_max_paragraphs() -> usize {
    100_000
}

fn default_max_xml_nodes() -> u32 {
    2_000_000
}

fn default_concurrency() -> usize {
    5
}

fn default_include_details() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let cfg = GradingConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, GradingConfig::default());
        assert_eq!(cfg.batch.concurrency, 5);
        assert_eq!(cfg.archive.max_files, 1_000);
        assert!(cfg.archive.allowed_extensions.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = GradingConfig::from_json_str(
            r#"{ "archive": { "max_files": 3, "allowed_extensions": ["docx"] },
                 "batch": { "concurrency": 0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.archive.max_files, 3);
        assert_eq!(cfg.archive.max_depth, 10);
        assert_eq!(
            cfg.archive.allowed_extensions,
            Some(vec!["docx".to_string()])
        );
        // zero concurrency is clamped
        assert_eq!(cfg.batch.concurrency, 1);
        assert_eq!(cfg.parsing, ParseLimits::default());
    }

    #[test]
    fn invalid_json_is_reported() {
        let err = GradingConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.contains("Invalid grading config JSON"));
    }

    #[test]
    fn save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grading.json");
        let mut cfg = GradingConfig::default();
        cfg.parsing.max_slides = 12;
        cfg.save(&path).unwrap();

        let loaded = GradingConfig::load_from_json(&path).unwrap();
        assert_eq!(loaded.parsing.max_slides, 12);

        let missing = GradingConfig::load_from_json(dir.path().join("nope.json"));
        assert!(missing.is_err());
    }

    #[test]
    fn package_limits_map_to_extraction_options() {
        let opts = PackageLimits::default().to_extraction_options();
        assert_eq!(opts.max_files, 5_000);
        assert_eq!(opts.max_depth, 16);
        assert!(opts.allowed_extensions.is_none());
    }
}
