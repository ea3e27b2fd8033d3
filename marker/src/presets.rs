//! Built-in rubrics compiled into the binary.

use doc_parser::FileKind;

use crate::error::MarkerError;
use crate::rubric::Rubric;

pub const PRESENTATION_BASIC: &str = "presentation-basic";
pub const WORD_BASIC: &str = "word-basic";

const PRESETS: &[(&str, &str)] = &[
    (PRESENTATION_BASIC, include_str!("../presets/presentation-basic.json")),
    (WORD_BASIC, include_str!("../presets/word-basic.json")),
];

pub fn names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Parses and validates the named preset.
pub fn preset(name: &str) -> Result<Rubric, MarkerError> {
    let (_, json) = PRESETS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| MarkerError::UnknownPreset(name.to_string()))?;
    let rubric = Rubric::from_json_str(json)?;
    rubric.validate()?;
    Ok(rubric)
}

/// Name of the preset used when no rubric is chosen for a document kind.
pub fn default_for(kind: FileKind) -> Option<&'static str> {
    match kind {
        FileKind::Presentation => Some(PRESENTATION_BASIC),
        FileKind::WordProcessor => Some(WORD_BASIC),
        FileKind::ArchiveContainer => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorRegistry;

    #[test]
    fn every_preset_is_valid_and_resolvable() {
        let registry = DetectorRegistry::with_builtin();
        for name in names() {
            let rubric = preset(name).unwrap();
            assert!(rubric.validate().unwrap().is_empty(), "{name} totals disagree");
            for c in &rubric.criteria {
                assert!(registry.get(&c.detector_key).is_some(), "{name}: {}", c.detector_key);
            }
        }
    }

    #[test]
    fn defaults_match_kind() {
        let deck = preset(default_for(FileKind::Presentation).unwrap()).unwrap();
        assert_eq!(deck.document_kind, Some(FileKind::Presentation));
        let doc = preset(default_for(FileKind::WordProcessor).unwrap()).unwrap();
        assert_eq!(doc.document_kind, Some(FileKind::WordProcessor));
        assert_eq!(default_for(FileKind::ArchiveContainer), None);
        assert_eq!(preset("nope"), Err(MarkerError::UnknownPreset("nope".into())));
    }
}
