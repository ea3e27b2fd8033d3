use doc_parser::fixtures::{DocxBuilder, HfVariant, PptxBuilder, SlideSpec};
use doc_parser::{extract_features, load};
use marker::RuleEngine;
use marker::presets::{self, PRESENTATION_BASIC, WORD_BASIC};
use marker::report::FileIdentity;
use marker::types::EvaluationOptions;
use util::grading_config::GradingConfig;

fn grade(bytes: &[u8], preset: &str) -> marker::report::GradeResult {
    let config = GradingConfig::default();
    let doc = load(bytes, None, &config).unwrap();
    let features = extract_features(&doc, &config.parsing).unwrap();
    let rubric = presets::preset(preset).unwrap();
    RuleEngine::new().evaluate(
        FileIdentity::new("1").with_name("submission"),
        &features,
        &rubric,
        &EvaluationOptions::default(),
    )
}

#[test]
fn grades_a_presentation_against_the_basic_preset() {
    let mut deck = PptxBuilder::new().theme("Ion", "Ion", "Century Gothic");
    for i in 1..=8 {
        let mut slide = SlideSpec::titled(&format!("Slide {i}")).transition("fade");
        match i {
            1 => slide = slide.animated(),
            2 => slide = slide.notes("Remember to introduce the team"),
            3 => slide = slide.picture(),
            _ => {}
        }
        deck = deck.slide(slide);
    }

    let result = grade(&deck.build(), PRESENTATION_BASIC);
    let level = |id: &str| result.criteria[id].level.as_str();

    assert_eq!(level("slides"), "full");
    assert_eq!(level("transitions"), "all");
    assert_eq!(level("animations"), "present");
    assert_eq!(level("theme"), "custom");
    assert_eq!(level("notes"), "present");
    assert_eq!(level("images"), "present");
    assert_eq!(level("title-slide"), "layout");
    // every fixture slide shares one layout
    assert_eq!(level("layouts"), "none");

    assert_eq!(result.total_points, 9.0);
    assert_eq!(result.max_possible_points, 10.0);
    assert_eq!(result.percentage, 90.0);
    assert_eq!(result.error_count(), 0);
}

#[test]
fn grades_a_word_document_against_the_basic_preset() {
    let doc = DocxBuilder::new()
        .title("Quarterly report")
        .toc_field(&[(1, "Intro"), (2, "Findings")])
        .heading(1, "Intro")
        .paragraph("Some opening words.")
        .heading(2, "Findings")
        .table(2, 3)
        .header(HfVariant::Default)
        .footer(HfVariant::Default, true)
        .build();

    let result = grade(&doc, WORD_BASIC);
    let level = |id: &str| result.criteria[id].level.as_str();

    assert_eq!(level("toc"), "field");
    assert_eq!(level("headings"), "partial");
    assert_eq!(level("header-footer"), "both");
    assert_eq!(level("page-numbers"), "present");
    assert_eq!(level("tables"), "present");
    assert_eq!(level("images"), "none");
    assert_eq!(level("title"), "set");

    assert_eq!(result.total_points, 8.0);
    assert_eq!(result.percentage, 80.0);
}

#[test]
fn wrong_preset_for_document_kind_scores_zero_without_failing() {
    let deck = PptxBuilder::new().slide(SlideSpec::titled("Only")).build();
    let result = grade(&deck, WORD_BASIC);

    // images and metadata_title read both kinds; the rest are word-only
    assert_eq!(result.error_count(), 5);
    assert!(result.criteria["toc"].reason.contains("word-processor"));
    assert_eq!(result.max_possible_points, 10.0);
}
