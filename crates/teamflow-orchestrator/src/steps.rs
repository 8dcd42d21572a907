//! Generic step kinds that team pipelines are assembled from.

use crate::pipeline::{AgentStep, StepContext};
use async_trait::async_trait;
use serde_json::json;
use teamflow_agent::Toolbox;
use teamflow_core::{extract_title, fields, html_escape, Artifact, TeamflowError, TeamflowResult};
use tracing::debug;

/// Sends a rendered prompt to the text generator. Payload: `{"text": ...}`.
pub struct PromptStep {
    system: Option<String>,
    template: String,
    toolbox: Toolbox,
}

impl PromptStep {
    pub fn new(toolbox: Toolbox, system: Option<&str>, template: impl Into<String>) -> Self {
        Self {
            system: system.map(str::to_string),
            template: template.into(),
            toolbox,
        }
    }
}

#[async_trait]
impl AgentStep for PromptStep {
    async fn run(&self, ctx: &StepContext) -> TeamflowResult<serde_json::Value> {
        let prompt = ctx.render(&self.template);
        let text = self
            .toolbox
            .complete(self.system.as_deref(), &prompt)
            .await?;
        Ok(json!({ "text": text }))
    }
}

/// Runs a web search. Payload: `{"query", "results", "summary"}`.
pub struct SearchStep {
    query_template: String,
    toolbox: Toolbox,
}

impl SearchStep {
    pub fn new(toolbox: Toolbox, query_template: impl Into<String>) -> Self {
        Self {
            query_template: query_template.into(),
            toolbox,
        }
    }
}

#[async_trait]
impl AgentStep for SearchStep {
    async fn run(&self, ctx: &StepContext) -> TeamflowResult<serde_json::Value> {
        let query = ctx.render(&self.query_template);
        let hits = self.toolbox.search(&query).await?;
        if hits.is_empty() {
            return Err(TeamflowError::Http(format!("no search results for '{query}'")));
        }
        let summary = hits
            .iter()
            .map(|h| format!("- {}: {}", h.title, h.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(json!({ "query": query, "results": hits, "summary": summary }))
    }
}

/// Generates `count` images. Payload: `{"images": [{"url", "alt"}, ...]}`.
///
/// All-or-nothing: one failed generation fails the step.
pub struct ImageStep {
    prompt_template: String,
    count: usize,
    toolbox: Toolbox,
}

impl ImageStep {
    pub fn new(toolbox: Toolbox, prompt_template: impl Into<String>, count: usize) -> Self {
        Self {
            prompt_template: prompt_template.into(),
            count: count.max(1),
            toolbox,
        }
    }
}

#[async_trait]
impl AgentStep for ImageStep {
    async fn run(&self, ctx: &StepContext) -> TeamflowResult<serde_json::Value> {
        let base = ctx.render(&self.prompt_template);
        let mut images = Vec::with_capacity(self.count);
        for i in 0..self.count {
            let prompt = if i == 0 {
                base.clone()
            } else {
                format!("{base} (supporting illustration {i})")
            };
            images.push(self.toolbox.generate_image(&prompt).await?);
        }
        Ok(json!({ "images": images }))
    }
}

/// Assembles the final [`Artifact`] from earlier payloads.
///
/// The body comes from `body_from` (or from an LLM polish pass over it when
/// `polish` is set), images from `images_from`, sources from `research_from`.
pub struct CompileStep {
    body_from: String,
    images_from: Option<String>,
    research_from: Option<String>,
    polish: Option<(String, String)>,
    toolbox: Toolbox,
}

impl CompileStep {
    pub fn new(toolbox: Toolbox, body_from: impl Into<String>) -> Self {
        Self {
            body_from: body_from.into(),
            images_from: None,
            research_from: None,
            polish: None,
            toolbox,
        }
    }

    pub fn images_from(mut self, step: impl Into<String>) -> Self {
        self.images_from = Some(step.into());
        self
    }

    pub fn research_from(mut self, step: impl Into<String>) -> Self {
        self.research_from = Some(step.into());
        self
    }

    pub fn polish(mut self, system: impl Into<String>, template: impl Into<String>) -> Self {
        self.polish = Some((system.into(), template.into()));
        self
    }
}

#[async_trait]
impl AgentStep for CompileStep {
    async fn run(&self, ctx: &StepContext) -> TeamflowResult<serde_json::Value> {
        let body = match &self.polish {
            Some((system, template)) => {
                self.toolbox
                    .complete(Some(system.as_str()), &ctx.render(template))
                    .await?
            }
            None => ctx.output_text(&self.body_from).ok_or_else(|| {
                TeamflowError::step("final_compilation", format!("no output from '{}'", self.body_from))
            })?,
        };

        let images = self
            .images_from
            .as_deref()
            .and_then(|step| ctx.output(step))
            .and_then(|payload| payload["images"].as_array().cloned())
            .unwrap_or_default();
        let sources = self
            .research_from
            .as_deref()
            .and_then(|step| ctx.output(step))
            .and_then(|payload| payload["results"].as_array().cloned())
            .unwrap_or_default()
            .into_iter()
            .map(|hit| json!({ "title": hit["title"], "url": hit["url"] }))
            .collect::<Vec<_>>();

        debug!(task_id = %ctx.task_id, images = images.len(), sources = sources.len(), "Compiling artifact");
        Ok(compile_artifact(&ctx.request, &body, &images, sources).to_value())
    }
}

/// Build an artifact (structured fields plus rendered HTML) from body text.
pub fn compile_artifact(
    request: &str,
    body: &str,
    images: &[serde_json::Value],
    sources: Vec<serde_json::Value>,
) -> Artifact {
    let title = extract_title(body).unwrap_or_else(|| title_from_request(request));
    let paragraphs = paragraphs(body, &title);

    let introduction = paragraphs.first().cloned().unwrap_or_default();
    let conclusion = if paragraphs.len() > 1 {
        paragraphs.last().cloned().unwrap_or_default()
    } else {
        String::new()
    };
    let middle: &[String] = if paragraphs.len() > 2 {
        &paragraphs[1..paragraphs.len() - 1]
    } else {
        &[]
    };

    let meta_description = summarize(&introduction, 155);
    let keywords = keywords(&format!("{title} {request}"), 5);
    let feature_image = images.first().cloned().unwrap_or(serde_json::Value::Null);
    let supporting: Vec<serde_json::Value> = images.iter().skip(1).cloned().collect();

    let mut html = String::from("<article>\n");
    html.push_str(&format!(
        "<meta name=\"description\" content=\"{}\">\n",
        html_escape(&meta_description)
    ));
    html.push_str(&format!(
        "<meta name=\"keywords\" content=\"{}\">\n",
        html_escape(&keywords.join(", "))
    ));
    html.push_str(&format!("<h1>{}</h1>\n", html_escape(&title)));
    if let Some(img) = img_tag(&feature_image, "feature-image") {
        html.push_str(&img);
    }
    if !introduction.is_empty() {
        html.push_str(&format!(
            "<p class=\"introduction\">{}</p>\n",
            html_escape(&introduction)
        ));
    }
    let mut supporting_iter = supporting.iter();
    for paragraph in middle {
        html.push_str(&render_block(paragraph));
        if let Some(img) = supporting_iter.next().and_then(|i| img_tag(i, "supporting-image")) {
            html.push_str(&img);
        }
    }
    for img in supporting_iter.filter_map(|i| img_tag(i, "supporting-image")) {
        html.push_str(&img);
    }
    if !conclusion.is_empty() {
        html.push_str(&format!(
            "<p class=\"conclusion\">{}</p>\n",
            html_escape(&conclusion)
        ));
    }
    html.push_str("</article>");

    Artifact::new()
        .with_field(fields::TITLE, json!(title))
        .with_field(fields::INTRODUCTION, json!(introduction))
        .with_field(fields::CONCLUSION, json!(conclusion))
        .with_field(fields::META_DESCRIPTION, json!(meta_description))
        .with_field(fields::KEYWORDS, json!(keywords))
        .with_field(fields::FEATURE_IMAGE, feature_image)
        .with_field(fields::SUPPORTING_IMAGES, json!(supporting))
        .with_field(fields::TONE, json!("neutral"))
        .with_field("sources", json!(sources))
        .with_field(fields::CONTENT, json!(html))
}

fn title_from_request(request: &str) -> String {
    let words: Vec<&str> = request.split_whitespace().take(10).collect();
    let mut title = words.join(" ");
    if let Some(first) = title.get(..1) {
        title = first.to_uppercase() + &title[1..];
    }
    title
}

/// Paragraph blocks of `body`, minus the title line itself.
fn paragraphs(body: &str, title: &str) -> Vec<String> {
    body.split("\n\n")
        .map(|block| {
            block
                .lines()
                .map(str::trim)
                .filter(|line| {
                    let bare = line.trim_start_matches('#').trim();
                    !line.is_empty()
                        && !(line.starts_with('#') && bare == title)
                        && extract_title(line).as_deref() != Some(title)
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect()
}

fn render_block(block: &str) -> String {
    if block.starts_with('#') {
        format!(
            "<h2>{}</h2>\n",
            html_escape(block.trim_start_matches('#').trim())
        )
    } else {
        format!("<p>{}</p>\n", html_escape(block))
    }
}

fn img_tag(image: &serde_json::Value, class: &str) -> Option<String> {
    let url = image["url"].as_str()?;
    let alt = image["alt"].as_str().unwrap_or_default();
    Some(format!(
        "<img class=\"{class}\" src=\"{}\" alt=\"{}\">\n",
        html_escape(url),
        html_escape(alt)
    ))
}

/// Cut `text` to at most `max` characters on a word boundary.
pub fn summarize(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        if out.chars().count() + word.chars().count() + 4 > max {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str("...");
    out
}

const STOPWORDS: &[&str] = &[
    "about", "after", "and", "for", "from", "into", "that", "the", "this", "with", "your", "what",
    "when", "where", "which", "will", "plan", "write", "create", "make", "days", "please",
];

fn keywords(text: &str, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() < 4 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !out.contains(&word) {
            out.push(word);
        }
        if out.len() == limit {
            break;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teamflow_agent::{GeneratedImage, ImageGenerator, SearchHit, SearchProvider, Unconfigured};

    const BODY: &str = "# Madinah Travel Guide\n\nMadinah rewards slow travel.\n\n## Day 1\n\nVisit the Prophet's Mosque.\n\nLeave time for dates & coffee.";

    #[test]
    fn test_compile_artifact_fields_and_html() {
        let images = vec![
            json!({"url": "https://img/feature.png", "alt": "Madinah skyline"}),
            json!({"url": "https://img/quba.png", "alt": "Quba"}),
        ];
        let a = compile_artifact("plan a trip to Madinah", BODY, &images, vec![]);

        assert_eq!(a.get_str(fields::TITLE), Some("Madinah Travel Guide"));
        assert_eq!(a.get_str(fields::INTRODUCTION), Some("Madinah rewards slow travel."));
        assert_eq!(a.get_str(fields::CONCLUSION), Some("Leave time for dates & coffee."));
        assert_eq!(a.get(fields::FEATURE_IMAGE).unwrap()["url"], "https://img/feature.png");
        assert_eq!(a.get(fields::SUPPORTING_IMAGES).unwrap().as_array().unwrap().len(), 1);

        let html = a.get_str(fields::CONTENT).unwrap();
        assert!(html.contains("<h1>Madinah Travel Guide</h1>"));
        assert!(html.contains("<h2>Day 1</h2>"));
        assert!(html.contains("src=\"https://img/feature.png\""));
        assert!(html.contains("src=\"https://img/quba.png\""));
        assert!(html.contains("dates &amp; coffee"));
        assert!(html.contains("<meta name=\"description\" content=\"Madinah rewards slow travel.\">"));
    }

    #[test]
    fn test_title_falls_back_to_request() {
        let a = compile_artifact("plan a trip to Madinah", "Just one paragraph.", &[], vec![]);
        assert_eq!(a.get_str(fields::TITLE), Some("Plan a trip to Madinah"));
        assert_eq!(a.get_str(fields::CONCLUSION), Some(""));
        assert!(a.get(fields::FEATURE_IMAGE).unwrap().is_null());
    }

    #[test]
    fn test_summarize_and_keywords() {
        let long = "word ".repeat(100);
        let s = summarize(long.trim(), 20);
        assert!(s.chars().count() <= 20);
        assert!(s.ends_with("..."));
        assert_eq!(summarize("short", 20), "short");
        assert_eq!(
            keywords("Plan a trip to Madinah for 14 days with the family", 3),
            vec!["trip", "madinah", "family"]
        );
    }

    struct FixedSearch;

    #[async_trait]
    impl SearchProvider for FixedSearch {
        async fn search(&self, _query: &str) -> TeamflowResult<Vec<SearchHit>> {
            Ok(vec![SearchHit {
                title: "Uhud".into(),
                url: "https://uhud".into(),
                snippet: "Historic mountain".into(),
            }])
        }
    }

    struct CountingImages;

    #[async_trait]
    impl ImageGenerator for CountingImages {
        async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
            Ok(GeneratedImage {
                url: format!("https://img/{}.png", prompt.len()),
                alt: prompt.to_string(),
            })
        }
    }

    fn ctx() -> StepContext {
        StepContext {
            task_id: "t".into(),
            user_id: "u".into(),
            request: "Madinah".into(),
            team: "travel_planning".into(),
            outputs: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_search_and_image_steps() {
        let toolbox = Toolbox::new(
            Arc::new(Unconfigured("text")),
            Arc::new(CountingImages),
            Arc::new(FixedSearch),
        );
        let search = SearchStep::new(toolbox.clone(), "things to do in {{request}}");
        let payload = search.run(&ctx()).await.unwrap();
        assert_eq!(payload["query"], "things to do in Madinah");
        assert_eq!(payload["summary"], "- Uhud: Historic mountain");

        let images = ImageStep::new(toolbox, "{{request}} skyline", 3);
        let payload = images.run(&ctx()).await.unwrap();
        assert_eq!(payload["images"].as_array().unwrap().len(), 3);
        assert_eq!(payload["images"][0]["alt"], "Madinah skyline");
    }

    #[tokio::test]
    async fn test_prompt_step_propagates_failure() {
        let step = PromptStep::new(Toolbox::unconfigured(), None, "{{request}}");
        let err = step.run(&ctx()).await.unwrap_err();
        assert!(matches!(err, TeamflowError::Config(_)));
    }

    #[tokio::test]
    async fn test_compile_step_requires_body() {
        let step = CompileStep::new(Toolbox::unconfigured(), "content_writing");
        assert!(step.run(&ctx()).await.is_err());

        let mut ctx = ctx();
        ctx.outputs
            .insert("content_writing".into(), json!({"text": BODY}));
        let artifact = step.run(&ctx).await.unwrap();
        assert_eq!(artifact["title"], "Madinah Travel Guide");
    }
}
