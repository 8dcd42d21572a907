use crate::change::{ChangeRequest, ChangeType};
use serde::Serialize;
use std::time::Instant;
use teamflow_agent::Toolbox;
use teamflow_core::{
    clean_title, extract_title, fields, html_escape, Artifact, TeamflowError, TeamflowResult,
};
use tracing::{info, warn};

/// Longest meta description kept after generation.
pub const META_DESCRIPTION_MAX: usize = 160;

/// Result of a targeted update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpdateOutcome {
    Updated {
        artifact: Artifact,
        change_type: ChangeType,
        message: String,
        elapsed_ms: u64,
        fields_changed: Vec<String>,
        /// Occurrences rewritten inside the rendered content.
        replacements: usize,
    },
    /// Nothing was committed; `artifact` is the original, untouched.
    Failed {
        artifact: Artifact,
        change_type: ChangeType,
        error: String,
        elapsed_ms: u64,
    },
}

impl UpdateOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateOutcome::Updated { .. })
    }

    pub fn artifact(&self) -> &Artifact {
        match self {
            UpdateOutcome::Updated { artifact, .. } | UpdateOutcome::Failed { artifact, .. } => {
                artifact
            }
        }
    }

    pub fn into_artifact(self) -> Artifact {
        match self {
            UpdateOutcome::Updated { artifact, .. } | UpdateOutcome::Failed { artifact, .. } => {
                artifact
            }
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        match self {
            UpdateOutcome::Updated { elapsed_ms, .. } | UpdateOutcome::Failed { elapsed_ms, .. } => {
                *elapsed_ms
            }
        }
    }
}

struct Applied {
    message: String,
    fields_changed: Vec<String>,
    replacements: usize,
}

/// Regenerates only the artifact fields a [`ChangeRequest`] names.
///
/// Every handler works on a copy of the artifact. Each changed field's old
/// value is replaced wherever it appears in the rendered content. The copy
/// is returned only if every step succeeded; otherwise the caller gets the
/// original back.
pub struct TargetedUpdater {
    toolbox: Toolbox,
}

impl TargetedUpdater {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }

    pub async fn apply(&self, request: &ChangeRequest, artifact: &Artifact) -> UpdateOutcome {
        let start = Instant::now();
        let mut draft = artifact.clone();

        let result = match request.change_type {
            ChangeType::TitleOnly => self.update_title(request, &mut draft).await,
            ChangeType::FeatureImage => self.update_feature_image(request, &mut draft).await,
            ChangeType::SupportingImages => {
                self.update_supporting_images(request, &mut draft).await
            }
            ChangeType::Introduction => {
                self.rewrite_paragraph(request, &mut draft, fields::INTRODUCTION, &request.feedback)
                    .await
            }
            ChangeType::Conclusion => {
                self.rewrite_paragraph(request, &mut draft, fields::CONCLUSION, &request.feedback)
                    .await
            }
            ChangeType::MetaDescription => self.update_meta_description(request, &mut draft).await,
            ChangeType::ToneAdjustment => self.adjust_tone(request, &mut draft).await,
            ChangeType::SeoKeywords => self.update_keywords(request, &mut draft).await,
            ChangeType::FullRewrite => Err(TeamflowError::TargetedUpdate(
                "a full rewrite cannot be applied as a targeted update".to_string(),
            )),
        };
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(applied) => {
                info!(
                    change_type = %request.change_type,
                    fields = ?applied.fields_changed,
                    replacements = applied.replacements,
                    elapsed_ms,
                    "Targeted update applied"
                );
                UpdateOutcome::Updated {
                    artifact: draft,
                    change_type: request.change_type,
                    message: applied.message,
                    elapsed_ms,
                    fields_changed: applied.fields_changed,
                    replacements: applied.replacements,
                }
            }
            Err(e) => {
                warn!(change_type = %request.change_type, error = %e, elapsed_ms, "Targeted update failed");
                UpdateOutcome::Failed {
                    artifact: artifact.clone(),
                    change_type: request.change_type,
                    error: e.to_string(),
                    elapsed_ms,
                }
            }
        }
    }

    async fn update_title(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let old = required_str(draft, fields::TITLE)?;
        let new = match &request.explicit_value {
            Some(value) => clean_title(value),
            None => {
                let prompt = format!(
                    "Write a new title for this article.\nCurrent title: {old}\nFeedback: {}\nIntroduction: {}\nReply with the title only.",
                    request.feedback,
                    draft.get_str(fields::INTRODUCTION).unwrap_or_default(),
                );
                let text = self
                    .toolbox
                    .complete(Some("You write concise, compelling article titles."), &prompt)
                    .await?;
                extract_title(&text).unwrap_or_else(|| {
                    clean_title(text.lines().find(|l| !l.trim().is_empty()).unwrap_or_default())
                })
            }
        };
        if new.is_empty() {
            return Err(TeamflowError::TargetedUpdate("generated title is empty".to_string()));
        }

        draft.set(fields::TITLE, serde_json::json!(new));
        let replacements = draft.replace_in_rendered(&old, &new);
        Ok(Applied {
            message: format!("Title updated from '{old}' to '{new}'"),
            fields_changed: vec![fields::TITLE.to_string()],
            replacements,
        })
    }

    async fn update_feature_image(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let title = draft.get_str(fields::TITLE).unwrap_or_default().to_string();
        let subject = request
            .explicit_value
            .clone()
            .unwrap_or_else(|| format!("{}. Article: {title}", request.feedback));
        let image = self
            .toolbox
            .generate_image(&format!("Feature image: {subject}"))
            .await?;

        let old = draft.get(fields::FEATURE_IMAGE).cloned().unwrap_or_default();
        let new = serde_json::json!({ "url": image.url, "alt": image.alt });
        draft.set(fields::FEATURE_IMAGE, new);

        let replacements = match old["url"].as_str() {
            Some(_) => swap_image_tag(draft, FEATURE_IMAGE_CLASS, &old, &image.url, &image.alt),
            None => insert_feature_image(draft, &image.url, &image.alt),
        };
        Ok(Applied {
            message: format!("Feature image regenerated: {}", image.alt),
            fields_changed: vec![fields::FEATURE_IMAGE.to_string()],
            replacements,
        })
    }

    async fn update_supporting_images(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let old_images = draft
            .get(fields::SUPPORTING_IMAGES)
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        if old_images.is_empty() {
            return Err(TeamflowError::TargetedUpdate(
                "artifact has no supporting images".to_string(),
            ));
        }
        let title = draft.get_str(fields::TITLE).unwrap_or_default().to_string();
        let subject = request
            .explicit_value
            .clone()
            .unwrap_or_else(|| request.feedback.clone());

        let mut generated = Vec::with_capacity(old_images.len());
        for i in 0..old_images.len() {
            let prompt = format!("Supporting illustration {} for '{title}': {subject}", i + 1);
            generated.push(self.toolbox.generate_image(&prompt).await?);
        }

        let mut replacements = 0;
        for (old, new) in old_images.iter().zip(&generated) {
            replacements += swap_image_tag(draft, SUPPORTING_IMAGE_CLASS, old, &new.url, &new.alt);
        }
        draft.set(fields::SUPPORTING_IMAGES, serde_json::json!(generated));
        Ok(Applied {
            message: format!("Regenerated {} supporting images", generated.len()),
            fields_changed: vec![fields::SUPPORTING_IMAGES.to_string()],
            replacements,
        })
    }

    async fn rewrite_paragraph(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
        field: &str,
        instruction: &str,
    ) -> TeamflowResult<Applied> {
        let old = required_str(draft, field)?;
        let title = draft.get_str(fields::TITLE).unwrap_or_default();
        let prompt = format!(
            "Rewrite the {field} of the article '{title}' according to this feedback: {instruction}\n\nCurrent {field}:\n{old}\n\nReply with the new paragraph only."
        );
        let new = self
            .toolbox
            .complete(Some("You are a careful editor."), &prompt)
            .await?
            .trim()
            .to_string();
        if new.is_empty() {
            return Err(TeamflowError::TargetedUpdate(format!(
                "generated {field} is empty"
            )));
        }

        draft.set(field, serde_json::json!(new));
        let replacements = replace_tagged(
            draft,
            &format!("<p class=\"{field}\">"),
            "</p>",
            &old,
            &new,
        );
        Ok(Applied {
            message: format!("{} rewritten ({})", capitalize(field), request.change_type),
            fields_changed: vec![field.to_string()],
            replacements,
        })
    }

    async fn update_meta_description(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let old = draft
            .get_str(fields::META_DESCRIPTION)
            .unwrap_or_default()
            .to_string();
        let raw = match &request.explicit_value {
            Some(value) => value.clone(),
            None => {
                let prompt = format!(
                    "Write a meta description of at most {META_DESCRIPTION_MAX} characters for the article '{}'.\nFeedback: {}\nIntroduction: {}\nReply with the description only.",
                    draft.get_str(fields::TITLE).unwrap_or_default(),
                    request.feedback,
                    draft.get_str(fields::INTRODUCTION).unwrap_or_default(),
                );
                self.toolbox
                    .complete(Some("You write search-friendly meta descriptions."), &prompt)
                    .await?
            }
        };
        let new = truncate_words(
            raw.trim().trim_matches(|c: char| c == '"' || c == '\''),
            META_DESCRIPTION_MAX,
        );
        if new.is_empty() {
            return Err(TeamflowError::TargetedUpdate(
                "generated meta description is empty".to_string(),
            ));
        }

        draft.set(fields::META_DESCRIPTION, serde_json::json!(new));
        let replacements = replace_tagged(
            draft,
            "<meta name=\"description\" content=\"",
            "\">",
            &old,
            &new,
        );
        Ok(Applied {
            message: format!("Meta description updated ({} characters)", new.chars().count()),
            fields_changed: vec![fields::META_DESCRIPTION.to_string()],
            replacements,
        })
    }

    async fn adjust_tone(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let tone = request
            .explicit_value
            .clone()
            .unwrap_or_else(|| request.feedback.clone());
        let instruction = format!("adjust the tone: {tone}");

        let mut fields_changed = Vec::new();
        let mut replacements = 0;
        for field in [fields::INTRODUCTION, fields::CONCLUSION] {
            if draft.get_str(field).unwrap_or_default().is_empty() {
                continue;
            }
            let applied = self
                .rewrite_paragraph(request, draft, field, &instruction)
                .await?;
            fields_changed.extend(applied.fields_changed);
            replacements += applied.replacements;
        }
        if fields_changed.is_empty() {
            return Err(TeamflowError::TargetedUpdate(
                "artifact has no paragraphs to adjust".to_string(),
            ));
        }
        draft.set(fields::TONE, serde_json::json!(tone));
        fields_changed.push(fields::TONE.to_string());
        Ok(Applied {
            message: format!("Tone adjusted: {tone}"),
            fields_changed,
            replacements,
        })
    }

    async fn update_keywords(
        &self,
        request: &ChangeRequest,
        draft: &mut Artifact,
    ) -> TeamflowResult<Applied> {
        let old: Vec<String> = draft
            .get(fields::KEYWORDS)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|k| k.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let requested = match &request.explicit_value {
            Some(value) => split_keywords(value),
            None => {
                let prompt = format!(
                    "Suggest 5 SEO keywords for the article '{}'.\nFeedback: {}\nReply with a comma-separated list only.",
                    draft.get_str(fields::TITLE).unwrap_or_default(),
                    request.feedback,
                );
                let text = self
                    .toolbox
                    .complete(Some("You are an SEO specialist."), &prompt)
                    .await?;
                split_keywords(&text)
            }
        };
        if requested.is_empty() {
            return Err(TeamflowError::TargetedUpdate(
                "no keywords could be derived from the feedback".to_string(),
            ));
        }

        let additive = {
            let lower = request.feedback.to_lowercase();
            lower.contains("add") || lower.contains("include")
        };
        let new = if additive {
            let mut merged = old.clone();
            for k in requested {
                if !merged.iter().any(|m| m.eq_ignore_ascii_case(&k)) {
                    merged.push(k);
                }
            }
            merged
        } else {
            requested
        };

        draft.set(fields::KEYWORDS, serde_json::json!(new));
        let replacements = replace_tagged(
            draft,
            "<meta name=\"keywords\" content=\"",
            "\">",
            &old.join(", "),
            &new.join(", "),
        );
        Ok(Applied {
            message: format!("SEO keywords set to: {}", new.join(", ")),
            fields_changed: vec![fields::KEYWORDS.to_string()],
            replacements,
        })
    }
}

fn required_str(artifact: &Artifact, field: &str) -> TeamflowResult<String> {
    match artifact.get_str(field) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(TeamflowError::TargetedUpdate(format!(
            "artifact has no {field}"
        ))),
    }
}

/// Replace `old` inside its rendered wrapper (`open` + escaped text + `close`)
/// first; fall back to bare verbatim replacement when the wrapper is absent.
fn replace_tagged(draft: &mut Artifact, open: &str, close: &str, old: &str, new: &str) -> usize {
    let tagged_old = format!("{open}{}{close}", html_escape(old));
    let tagged_new = format!("{open}{}{close}", html_escape(new));
    match draft.replace_in_rendered(&tagged_old, &tagged_new) {
        0 => draft.replace_in_rendered(old, new),
        n => n,
    }
}

const FEATURE_IMAGE_CLASS: &str = "feature-image";
const SUPPORTING_IMAGE_CLASS: &str = "supporting-image";

fn image_tag(class: &str, url: &str, alt: &str) -> String {
    format!(
        "<img class=\"{class}\" src=\"{}\" alt=\"{}\">",
        html_escape(url),
        html_escape(alt)
    )
}

/// Swap the first rendered `<img>` tag of `old` for one showing the new
/// image. Alts are never replaced as free text, as generated alts often
/// share a prefix. Without a matching tag only the old URL is swapped.
fn swap_image_tag(
    draft: &mut Artifact,
    class: &str,
    old: &serde_json::Value,
    url: &str,
    alt: &str,
) -> usize {
    let Some(old_url) = old["url"].as_str() else {
        return 0;
    };
    let old_alt = old["alt"].as_str().unwrap_or_default();
    let tagged_old = image_tag(class, old_url, old_alt);
    let tagged_new = image_tag(class, url, alt);
    match draft.replace_first_in_rendered(&tagged_old, &tagged_new) {
        0 => draft.replace_first_in_rendered(&html_escape(old_url), &html_escape(url)),
        n => n,
    }
}

fn insert_feature_image(draft: &mut Artifact, url: &str, alt: &str) -> usize {
    let Some(content) = draft.get_str(fields::CONTENT) else {
        return 0;
    };
    let Some(at) = content.find("</h1>").map(|i| i + "</h1>".len()) else {
        return 0;
    };
    let mut updated = content.to_string();
    updated.insert_str(at, &format!("\n{}", image_tag(FEATURE_IMAGE_CLASS, url, alt)));
    draft.set(fields::CONTENT, serde_json::json!(updated));
    1
}

fn split_keywords(text: &str) -> Vec<String> {
    text.replace(" and ", ",")
        .split([',', ';', '\n'])
        .map(|k| {
            k.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c.is_ascii_digit() || c == '.')
                .trim()
                .to_string()
        })
        .filter(|k| !k.is_empty())
        .collect()
}

fn truncate_words(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        if out.chars().count() + word.chars().count() + 1 > max {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use teamflow_agent::{GeneratedImage, ImageGenerator, TextGenerator, Unconfigured};

    struct Reply(&'static str);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn complete(&self, _s: Option<&str>, _p: &str) -> TeamflowResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct Painter;

    #[async_trait]
    impl ImageGenerator for Painter {
        async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
            if prompt.contains("illustration 2") {
                return Err(TeamflowError::Http("quota exceeded".into()));
            }
            Ok(GeneratedImage {
                url: "https://img/new.png".into(),
                alt: "New view".into(),
            })
        }
    }

    fn toolbox(text: &'static str) -> Toolbox {
        Toolbox::new(
            Arc::new(Reply(text)),
            Arc::new(Painter),
            Arc::new(Unconfigured("search")),
        )
    }

    fn guide() -> Artifact {
        Artifact::new()
            .with_field(fields::TITLE, json!("Madinah Travel Guide"))
            .with_field(fields::INTRODUCTION, json!("Madinah rewards slow travel."))
            .with_field(fields::CONCLUSION, json!("Come back often."))
            .with_field(fields::META_DESCRIPTION, json!("Madinah rewards slow travel."))
            .with_field(fields::KEYWORDS, json!(["madinah", "travel"]))
            .with_field(
                fields::FEATURE_IMAGE,
                json!({"url": "https://img/old.png", "alt": "Old view"}),
            )
            .with_field(fields::SUPPORTING_IMAGES, json!([]))
            .with_field(
                fields::CONTENT,
                json!(concat!(
                    "<meta name=\"description\" content=\"Madinah rewards slow travel.\">\n",
                    "<meta name=\"keywords\" content=\"madinah, travel\">\n",
                    "<h1>Madinah Travel Guide</h1>\n",
                    "<img class=\"feature-image\" src=\"https://img/old.png\" alt=\"Old view\">\n",
                    "<p class=\"introduction\">Madinah rewards slow travel.</p>\n",
                    "<p class=\"conclusion\">Come back often.</p>"
                )),
            )
    }

    #[tokio::test]
    async fn test_explicit_title_needs_no_llm() {
        let updater = TargetedUpdater::new(Toolbox::unconfigured());
        let req = ChangeRequest::new(ChangeType::TitleOnly, "change the title to: Top 10 Hidden Gems", 0.6)
            .with_explicit_value(Some("Top 10 Hidden Gems".into()));
        let original = guide();
        let outcome = updater.apply(&req, &original).await;

        assert!(outcome.is_success());
        let updated = outcome.artifact();
        assert_eq!(updated.get_str(fields::TITLE), Some("Top 10 Hidden Gems"));
        assert!(updated.rendered_contains("<h1>Top 10 Hidden Gems</h1>"));
        assert!(!updated.rendered_contains("Madinah Travel Guide"));
        for field in [
            fields::INTRODUCTION,
            fields::CONCLUSION,
            fields::META_DESCRIPTION,
            fields::KEYWORDS,
            fields::FEATURE_IMAGE,
        ] {
            assert_eq!(updated.get(field), original.get(field), "{field} changed");
        }
    }

    #[tokio::test]
    async fn test_generated_title_is_cleaned() {
        let updater = TargetedUpdater::new(toolbox("Title: \"Quiet Corners of Madinah\""));
        let req = ChangeRequest::new(ChangeType::TitleOnly, "make the title catchier", 0.4);
        let outcome = updater.apply(&req, &guide()).await;
        assert_eq!(
            outcome.artifact().get_str(fields::TITLE),
            Some("Quiet Corners of Madinah")
        );
    }

    #[tokio::test]
    async fn test_failure_returns_original() {
        let updater = TargetedUpdater::new(Toolbox::unconfigured());
        let req = ChangeRequest::new(ChangeType::Introduction, "shorter intro", 0.5);
        let original = guide();
        let outcome = updater.apply(&req, &original).await;

        match &outcome {
            UpdateOutcome::Failed { artifact, error, .. } => {
                assert_eq!(artifact, &original);
                assert!(error.contains("not configured"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_feature_image_mirrored() {
        let updater = TargetedUpdater::new(toolbox(""));
        let req = ChangeRequest::new(ChangeType::FeatureImage, "new hero image", 0.5);
        let outcome = updater.apply(&req, &guide()).await;
        let a = outcome.artifact();
        assert_eq!(a.get(fields::FEATURE_IMAGE).unwrap()["url"], "https://img/new.png");
        assert!(a.rendered_contains("src=\"https://img/new.png\" alt=\"New view\""));
        assert!(!a.rendered_contains("old.png"));
    }

    struct PromptPainter;

    #[async_trait]
    impl ImageGenerator for PromptPainter {
        async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
            Ok(GeneratedImage {
                url: format!("https://img/{}.png", prompt.len()),
                alt: prompt.to_string(),
            })
        }
    }

    fn illustrated() -> Artifact {
        let base = "Editorial illustration for a blog post about dates";
        let supporting = format!("{base} (supporting illustration 1)");
        guide()
            .with_field(fields::FEATURE_IMAGE, json!({"url": "https://img/f.png", "alt": base}))
            .with_field(
                fields::SUPPORTING_IMAGES,
                json!([{"url": "https://img/s1.png", "alt": supporting}]),
            )
            .with_field(
                fields::CONTENT,
                json!(format!(
                    "<h1>Madinah Travel Guide</h1>\n\
                     <img class=\"feature-image\" src=\"https://img/f.png\" alt=\"{base}\">\n\
                     <p>Body</p>\n\
                     <img class=\"supporting-image\" src=\"https://img/s1.png\" alt=\"{supporting}\">\n"
                )),
            )
    }

    fn rendered_img(artifact: &Artifact, field: &str, class: &str) -> String {
        let value = artifact.get(field).unwrap();
        let image = value.as_array().map_or(value, |all| &all[0]);
        image_tag(
            class,
            image["url"].as_str().unwrap(),
            image["alt"].as_str().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_feature_image_leaves_prefixed_supporting_alt() {
        let updater = TargetedUpdater::new(Toolbox::new(
            Arc::new(Reply("")),
            Arc::new(PromptPainter),
            Arc::new(Unconfigured("search")),
        ));
        let original = illustrated();
        let req = ChangeRequest::new(ChangeType::FeatureImage, "new hero image", 0.5);
        let outcome = updater.apply(&req, &original).await;
        assert!(outcome.is_success());
        let a = outcome.artifact();

        assert_eq!(a.get(fields::SUPPORTING_IMAGES), original.get(fields::SUPPORTING_IMAGES));
        assert!(a.rendered_contains(&rendered_img(a, fields::SUPPORTING_IMAGES, "supporting-image")));
        assert!(a.rendered_contains(&rendered_img(a, fields::FEATURE_IMAGE, "feature-image")));
        assert!(!a.rendered_contains("https://img/f.png"));

        // the supporting tag still matches its field, so a later swap finds it
        let req = ChangeRequest::new(ChangeType::SupportingImages, "other images", 0.5);
        let outcome = updater.apply(&req, a).await;
        let b = outcome.artifact();
        assert!(!b.rendered_contains("https://img/s1.png"));
        assert!(b.rendered_contains(&rendered_img(b, fields::SUPPORTING_IMAGES, "supporting-image")));
        assert!(b.rendered_contains(&rendered_img(b, fields::FEATURE_IMAGE, "feature-image")));
    }

    #[tokio::test]
    async fn test_supporting_images_all_or_nothing() {
        let updater = TargetedUpdater::new(toolbox(""));
        let req = ChangeRequest::new(ChangeType::SupportingImages, "other images", 0.5);

        let empty = updater.apply(&req, &guide()).await;
        assert!(!empty.is_success());

        let mut two = guide();
        two.set(
            fields::SUPPORTING_IMAGES,
            json!([{"url": "https://img/a.png", "alt": "A"}, {"url": "https://img/b.png", "alt": "B"}]),
        );
        // the second generation fails, so nothing is committed
        let outcome = updater.apply(&req, &two).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.artifact(), &two);
    }

    #[tokio::test]
    async fn test_intro_rewrite_leaves_meta_alone() {
        let updater = TargetedUpdater::new(toolbox("Slow down and Madinah opens up."));
        let req = ChangeRequest::new(ChangeType::Introduction, "rewrite the intro", 0.5);
        let outcome = updater.apply(&req, &guide()).await;
        let a = outcome.artifact();

        assert_eq!(a.get_str(fields::INTRODUCTION), Some("Slow down and Madinah opens up."));
        assert!(a.rendered_contains("<p class=\"introduction\">Slow down and Madinah opens up.</p>"));
        assert!(a.rendered_contains("content=\"Madinah rewards slow travel.\""));
        assert_eq!(a.get_str(fields::META_DESCRIPTION), Some("Madinah rewards slow travel."));
    }

    #[tokio::test]
    async fn test_meta_description_truncated_and_mirrored() {
        let long = "word ".repeat(60);
        let updater = TargetedUpdater::new(Toolbox::unconfigured());
        let req = ChangeRequest::new(ChangeType::MetaDescription, "new meta description", 0.5)
            .with_explicit_value(Some(long));
        let outcome = updater.apply(&req, &guide()).await;
        let a = outcome.artifact();
        let meta = a.get_str(fields::META_DESCRIPTION).unwrap();
        assert!(meta.chars().count() <= META_DESCRIPTION_MAX);
        assert!(a.rendered_contains(&format!("<meta name=\"description\" content=\"{meta}\">")));
        assert!(a.rendered_contains("<p class=\"introduction\">Madinah rewards slow travel.</p>"));
    }

    #[tokio::test]
    async fn test_tone_rewrites_both_paragraphs() {
        let updater = TargetedUpdater::new(toolbox("Hey friend, welcome!"));
        let req = ChangeRequest::new(ChangeType::ToneAdjustment, "more casual", 0.5)
            .with_explicit_value(Some("more casual".into()));
        let outcome = updater.apply(&req, &guide()).await;
        match outcome {
            UpdateOutcome::Updated { artifact, fields_changed, .. } => {
                assert_eq!(fields_changed, vec!["introduction", "conclusion", "tone"]);
                assert_eq!(artifact.get_str(fields::TONE), Some("more casual"));
                assert_eq!(artifact.get_str(fields::CONCLUSION), Some("Hey friend, welcome!"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keywords_added() {
        let updater = TargetedUpdater::new(Toolbox::unconfigured());
        let req = ChangeRequest::new(ChangeType::SeoKeywords, "add keywords: halal food, Travel", 0.5)
            .with_explicit_value(Some("halal food, Travel".into()));
        let outcome = updater.apply(&req, &guide()).await;
        let a = outcome.artifact();
        assert_eq!(a.get(fields::KEYWORDS).unwrap(), &json!(["madinah", "travel", "halal food"]));
        assert!(a.rendered_contains("content=\"madinah, travel, halal food\""));
    }

    #[tokio::test]
    async fn test_full_rewrite_is_not_targeted() {
        let updater = TargetedUpdater::new(Toolbox::unconfigured());
        let req = ChangeRequest::new(ChangeType::FullRewrite, "start over", 0.6);
        assert!(!updater.apply(&req, &guide()).await.is_success());
    }

    #[test]
    fn test_split_keywords() {
        assert_eq!(
            split_keywords("1. halal food\n2. hotels and dates"),
            vec!["halal food", "hotels", "dates"]
        );
    }
}
