use serde::{Deserialize, Serialize};

/// The kind of change a piece of feedback asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    TitleOnly,
    FeatureImage,
    SupportingImages,
    Introduction,
    Conclusion,
    MetaDescription,
    ToneAdjustment,
    SeoKeywords,
    FullRewrite,
}

impl ChangeType {
    /// Detector evaluation order. Earlier entries win score ties.
    pub const ORDER: [ChangeType; 9] = [
        ChangeType::TitleOnly,
        ChangeType::FeatureImage,
        ChangeType::SupportingImages,
        ChangeType::Introduction,
        ChangeType::Conclusion,
        ChangeType::MetaDescription,
        ChangeType::ToneAdjustment,
        ChangeType::SeoKeywords,
        ChangeType::FullRewrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::TitleOnly => "title_only",
            ChangeType::FeatureImage => "feature_image",
            ChangeType::SupportingImages => "supporting_images",
            ChangeType::Introduction => "introduction",
            ChangeType::Conclusion => "conclusion",
            ChangeType::MetaDescription => "meta_description",
            ChangeType::ToneAdjustment => "tone_adjustment",
            ChangeType::SeoKeywords => "seo_keywords",
            ChangeType::FullRewrite => "full_rewrite",
        }
    }

    /// Human-readable name of what gets changed.
    pub fn target(self) -> &'static str {
        match self {
            ChangeType::TitleOnly => "article title",
            ChangeType::FeatureImage => "feature image",
            ChangeType::SupportingImages => "supporting images",
            ChangeType::Introduction => "introduction paragraph",
            ChangeType::Conclusion => "conclusion paragraph",
            ChangeType::MetaDescription => "meta description",
            ChangeType::ToneAdjustment => "writing tone",
            ChangeType::SeoKeywords => "SEO keywords",
            ChangeType::FullRewrite => "entire article",
        }
    }

    /// The minimal regeneration steps for this change.
    pub fn required_steps(self) -> &'static [&'static str] {
        match self {
            ChangeType::TitleOnly => &["title_generation"],
            ChangeType::FeatureImage => &["feature_image_generation"],
            ChangeType::SupportingImages => &["supporting_image_generation"],
            ChangeType::Introduction => &["introduction_rewrite"],
            ChangeType::Conclusion => &["conclusion_rewrite"],
            ChangeType::MetaDescription => &["meta_description_generation"],
            ChangeType::ToneAdjustment => &["introduction_rewrite", "conclusion_rewrite"],
            ChangeType::SeoKeywords => &["keyword_generation"],
            ChangeType::FullRewrite => &[
                "research",
                "outline",
                "content_writing",
                "image_generation",
                "final_compilation",
            ],
        }
    }

    pub fn estimated_secs(self) -> u64 {
        match self {
            ChangeType::TitleOnly => 15,
            ChangeType::FeatureImage => 30,
            ChangeType::SupportingImages => 60,
            ChangeType::Introduction | ChangeType::Conclusion => 20,
            ChangeType::MetaDescription => 10,
            ChangeType::ToneAdjustment => 40,
            ChangeType::SeoKeywords => 15,
            ChangeType::FullRewrite => 180,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified feedback submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub change_type: ChangeType,
    /// Human-readable name of what changes.
    pub target: String,
    /// A literal new value spelled out in the feedback, e.g. the new title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explicit_value: Option<String>,
    /// The original feedback text.
    pub feedback: String,
    /// Regeneration steps the change needs.
    pub required_steps: Vec<String>,
    pub estimated_secs: u64,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Set when no detector was confident and the request fell back to a full rewrite.
    pub low_confidence: bool,
}

impl ChangeRequest {
    pub fn new(change_type: ChangeType, feedback: impl Into<String>, confidence: f64) -> Self {
        Self {
            change_type,
            target: change_type.target().to_string(),
            explicit_value: None,
            feedback: feedback.into(),
            required_steps: change_type
                .required_steps()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            estimated_secs: change_type.estimated_secs(),
            confidence: confidence.clamp(0.0, 1.0),
            low_confidence: false,
        }
    }

    pub fn with_explicit_value(mut self, value: Option<String>) -> Self {
        self.explicit_value = value;
        self
    }

    /// Whether this request needs the whole pipeline rather than a targeted update.
    pub fn needs_full_rewrite(&self) -> bool {
        self.low_confidence || self.change_type == ChangeType::FullRewrite
    }
}
