#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Classification feeding targeted updates, end to end.

use serde_json::json;
use teamflow_agent::Toolbox;
use teamflow_core::{fields, Artifact};
use teamflow_feedback::{ChangeType, FeedbackRouter, ScoringWeights, TargetedUpdater, UpdateOutcome};

fn article() -> Artifact {
    Artifact::new()
        .with_field(fields::TITLE, json!("Madinah Travel Guide"))
        .with_field(fields::INTRODUCTION, json!("Fourteen days in the city of the Prophet."))
        .with_field(fields::CONCLUSION, json!("Leave room for quiet evenings."))
        .with_field(fields::META_DESCRIPTION, json!("A two week Madinah itinerary."))
        .with_field(fields::KEYWORDS, json!(["madinah", "itinerary"]))
        .with_field(
            fields::FEATURE_IMAGE,
            json!({"url": "https://img/skyline.png", "alt": "Madinah skyline"}),
        )
        .with_field(
            fields::CONTENT,
            json!(concat!(
                "<article>\n",
                "<meta name=\"description\" content=\"A two week Madinah itinerary.\">\n",
                "<h1>Madinah Travel Guide</h1>\n",
                "<img class=\"feature-image\" src=\"https://img/skyline.png\" alt=\"Madinah skyline\">\n",
                "<p class=\"introduction\">Fourteen days in the city of the Prophet.</p>\n",
                "<p class=\"conclusion\">Leave room for quiet evenings.</p>\n",
                "</article>"
            )),
        )
}

#[tokio::test]
async fn test_title_feedback_end_to_end() {
    let router = FeedbackRouter::new(ScoringWeights::default()).unwrap();
    let request = router.classify("change the title to: Top 10 Hidden Gems");
    assert_eq!(request.change_type, ChangeType::TitleOnly);
    assert!(request.confidence >= 0.3);

    let before = article();
    let outcome = TargetedUpdater::new(Toolbox::unconfigured())
        .apply(&request, &before)
        .await;

    let UpdateOutcome::Updated {
        artifact,
        fields_changed,
        replacements,
        message,
        ..
    } = outcome
    else {
        panic!("title update should succeed");
    };
    assert_eq!(fields_changed, vec!["title"]);
    assert_eq!(replacements, 1);
    assert!(message.contains("Top 10 Hidden Gems"));
    assert_eq!(artifact.get_str(fields::TITLE), Some("Top 10 Hidden Gems"));
    assert!(artifact.rendered_contains("<h1>Top 10 Hidden Gems</h1>"));

    for name in before.field_names().filter(|n| *n != fields::TITLE && *n != fields::CONTENT) {
        assert_eq!(artifact.get(name), before.get(name), "field {name} changed");
    }
}

#[tokio::test]
async fn test_generation_failure_keeps_artifact() {
    let router = FeedbackRouter::new(ScoringWeights::default()).unwrap();
    let request = router.classify("Use a different feature image showing Mount Uhud");
    assert_eq!(request.change_type, ChangeType::FeatureImage);

    let before = article();
    let outcome = TargetedUpdater::new(Toolbox::unconfigured())
        .apply(&request, &before)
        .await;
    assert!(!outcome.is_success());
    assert_eq!(outcome.into_artifact(), before);
}

#[test]
fn test_classification_corpus() {
    let router = FeedbackRouter::new(ScoringWeights::default()).unwrap();
    let corpus = [
        ("change the title to: Top 10 Hidden Gems", ChangeType::TitleOnly),
        ("Make the tone more casual and friendly", ChangeType::ToneAdjustment),
        ("The introduction is too long, please shorten it", ChangeType::Introduction),
        ("Please add keywords: halal food, Madinah hotels", ChangeType::SeoKeywords),
        ("Rewrite the whole article from scratch", ChangeType::FullRewrite),
    ];
    for (text, expected) in corpus {
        let first = router.classify(text);
        assert_eq!(first.change_type, expected, "{text}");
        assert_eq!(first, router.classify(text), "{text} is not deterministic");
    }
}

#[test]
fn test_unclear_feedback_requests_full_rewrite() {
    let router = FeedbackRouter::new(ScoringWeights::default()).unwrap();
    let request = router.classify("meh");
    assert!(request.low_confidence);
    assert!(request.needs_full_rewrite());
    assert_eq!(request.change_type, ChangeType::FullRewrite);
}
