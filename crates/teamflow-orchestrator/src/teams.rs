use crate::pipeline::{Pipeline, PipelineStep};
use crate::steps::{CompileStep, ImageStep, PromptStep, SearchStep};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use teamflow_agent::Toolbox;
use tracing::debug;

pub const TRAVEL_PLANNING: &str = "travel_planning";
pub const BLOG_WRITING: &str = "blog_writing";
pub const WEB_DESIGN: &str = "web_design";

/// A named team: its routing keywords and the pipeline it runs.
#[derive(Clone)]
pub struct TeamDefinition {
    /// Identifier used in submissions, e.g. `travel_planning`.
    pub name: String,
    pub display_name: String,
    pub description: String,
    /// Lowercase words matched against the request when no team is named.
    pub keywords: Vec<String>,
    /// Drives `estimated_completion` on submission.
    pub estimated_duration: Duration,
    pub pipeline: Pipeline,
}

/// Serializable description of a team for listings.
#[derive(Debug, Clone, Serialize)]
pub struct TeamSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub estimated_secs: u64,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub name: String,
    pub description: String,
    /// `abort` or `continue with default`.
    pub on_failure: String,
    /// True when a failure substitutes a default payload.
    pub continues_on_failure: bool,
    pub timeout_secs: u64,
}

impl TeamDefinition {
    pub fn summary(&self) -> TeamSummary {
        TeamSummary {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            estimated_secs: self.estimated_duration.as_secs(),
            steps: self
                .pipeline
                .steps()
                .iter()
                .map(|s| StepSummary {
                    name: s.name.clone(),
                    description: s.description.clone(),
                    on_failure: s.policy.to_string(),
                    continues_on_failure: s.continues_on_failure(),
                    timeout_secs: s.timeout.as_secs(),
                })
                .collect(),
        }
    }

    fn score(&self, request: &str) -> usize {
        let words: Vec<String> = request
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let normalized = format!(" {} ", words.join(" "));
        self.keywords
            .iter()
            .filter(|k| normalized.contains(&format!(" {k} ")))
            .count()
    }
}

/// Picks a team for requests that do not name one.
pub struct TeamRouter {
    teams: Vec<TeamDefinition>,
    default_team: String,
}

impl TeamRouter {
    pub fn new(teams: Vec<TeamDefinition>, default_team: impl Into<String>) -> Self {
        Self {
            teams,
            default_team: default_team.into(),
        }
    }

    /// The travel, blog and web design teams wired to `toolbox`.
    pub fn builtin(toolbox: Toolbox) -> Self {
        Self::new(
            vec![
                travel_planning(&toolbox),
                blog_writing(&toolbox),
                web_design(&toolbox),
            ],
            BLOG_WRITING,
        )
    }

    pub fn get(&self, name: &str) -> Option<&TeamDefinition> {
        self.teams.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.teams.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn teams(&self) -> &[TeamDefinition] {
        &self.teams
    }

    pub fn default_team(&self) -> &str {
        &self.default_team
    }

    /// Keyword routing. Highest score wins, earlier teams win ties, and no
    /// match at all means the default team.
    pub fn route(&self, request: &str) -> &str {
        let mut best: Option<(&TeamDefinition, usize)> = None;
        for team in &self.teams {
            let score = team.score(request);
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((team, score));
            }
        }
        let chosen = best.map_or(self.default_team.as_str(), |(t, _)| t.name.as_str());
        debug!(team = %chosen, "Routed request");
        chosen
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

fn travel_planning(toolbox: &Toolbox) -> TeamDefinition {
    let planner = "You are an experienced travel planner. Produce practical day-by-day itineraries.";
    let pipeline = Pipeline::new()
        .step(
            PipelineStep::new(
                "initial_planning",
                Arc::new(PromptStep::new(
                    toolbox.clone(),
                    Some(planner),
                    "Draft a trip outline for this request: {{request}}",
                )),
            )
            .describe("Outline destinations, duration and pacing")
            .timeout(toolbox.text_timeout),
        )
        .step(
            PipelineStep::new(
                "destination_research",
                Arc::new(SearchStep::new(
                    toolbox.clone(),
                    "top attractions and travel tips {{request}}",
                )),
            )
            .describe("Research attractions and practical tips")
            .continue_with(json!({"summary": "research unavailable", "results": []}))
            .timeout(toolbox.search_timeout),
        )
        .step(
            PipelineStep::new(
                "real_time_search",
                Arc::new(SearchStep::new(
                    toolbox.clone(),
                    "current events weather and opening hours {{request}}",
                )),
            )
            .describe("Look up current conditions")
            .continue_with(json!({"summary": "real-time information unavailable", "results": []}))
            .timeout(toolbox.search_timeout),
        )
        .step(
            PipelineStep::new(
                "final_compilation",
                Arc::new(
                    CompileStep::new(toolbox.clone(), "initial_planning")
                        .research_from("destination_research")
                        .polish(
                            planner,
                            "Write the final travel guide in markdown with a '# ' title.\n\
                             Request: {{request}}\nOutline: {{initial_planning}}\n\
                             Research: {{destination_research}}\nCurrent info: {{real_time_search}}",
                        ),
                ),
            )
            .describe("Compile the itinerary into a travel guide")
            .timeout(toolbox.text_timeout),
        );

    TeamDefinition {
        name: TRAVEL_PLANNING.to_string(),
        display_name: "Travel Planning".to_string(),
        description: "Itineraries with researched destinations and current conditions".to_string(),
        keywords: words(&[
            "trip", "travel", "itinerary", "vacation", "holiday", "flight", "hotel", "visit",
            "tour", "destination",
        ]),
        estimated_duration: Duration::from_secs(120),
        pipeline,
    }
}

fn blog_writing(toolbox: &Toolbox) -> TeamDefinition {
    let writer = "You are a professional blog writer. Write clear, engaging, well-structured articles.";
    let pipeline = Pipeline::new()
        .step(
            PipelineStep::new(
                "research",
                Arc::new(SearchStep::new(toolbox.clone(), "{{request}}")),
            )
            .describe("Gather background sources")
            .continue_with(json!({"summary": "research unavailable", "results": []}))
            .timeout(toolbox.search_timeout),
        )
        .step(
            PipelineStep::new(
                "outline",
                Arc::new(PromptStep::new(
                    toolbox.clone(),
                    Some(writer),
                    "Create a blog outline for: {{request}}\nBackground: {{research}}",
                )),
            )
            .describe("Structure the article")
            .timeout(toolbox.text_timeout),
        )
        .step(
            PipelineStep::new(
                "content_writing",
                Arc::new(PromptStep::new(
                    toolbox.clone(),
                    Some(writer),
                    "Write the full article in markdown with a '# ' title, following this outline:\n{{outline}}",
                )),
            )
            .describe("Write the article body")
            .timeout(toolbox.text_timeout),
        )
        .step(
            PipelineStep::new(
                "image_generation",
                Arc::new(ImageStep::new(
                    toolbox.clone(),
                    "Editorial illustration for a blog post about {{request}}",
                    3,
                )),
            )
            .describe("Generate feature and supporting images")
            .continue_with(json!({"images": []}))
            .timeout(toolbox.image_timeout.saturating_mul(3)),
        )
        .step(
            PipelineStep::new(
                "final_compilation",
                Arc::new(
                    CompileStep::new(toolbox.clone(), "content_writing")
                        .images_from("image_generation")
                        .research_from("research"),
                ),
            )
            .describe("Assemble the publishable article"),
        );

    TeamDefinition {
        name: BLOG_WRITING.to_string(),
        display_name: "Blog Writing".to_string(),
        description: "Researched, illustrated blog articles with SEO metadata".to_string(),
        keywords: words(&[
            "blog", "article", "post", "write", "content", "seo", "story", "essay", "newsletter",
        ]),
        estimated_duration: Duration::from_secs(180),
        pipeline,
    }
}

fn web_design(toolbox: &Toolbox) -> TeamDefinition {
    let designer = "You are a senior web designer. Be concrete about layout, typography and color.";
    let pipeline = Pipeline::new()
        .step(
            PipelineStep::new(
                "requirements_analysis",
                Arc::new(PromptStep::new(
                    toolbox.clone(),
                    Some(designer),
                    "List the functional and visual requirements for: {{request}}",
                )),
            )
            .describe("Extract requirements")
            .timeout(toolbox.text_timeout),
        )
        .step(
            PipelineStep::new(
                "layout_design",
                Arc::new(PromptStep::new(
                    toolbox.clone(),
                    Some(designer),
                    "Propose a page layout in markdown with a '# ' title for these requirements:\n{{requirements_analysis}}",
                )),
            )
            .describe("Design the page layout")
            .timeout(toolbox.text_timeout),
        )
        .step(
            PipelineStep::new(
                "asset_generation",
                Arc::new(ImageStep::new(
                    toolbox.clone(),
                    "Hero image for a website: {{request}}",
                    2,
                )),
            )
            .describe("Generate hero and section imagery")
            .continue_with(json!({"images": []}))
            .timeout(toolbox.image_timeout.saturating_mul(2)),
        )
        .step(
            PipelineStep::new(
                "final_compilation",
                Arc::new(
                    CompileStep::new(toolbox.clone(), "layout_design")
                        .images_from("asset_generation"),
                ),
            )
            .describe("Assemble the design document"),
        );

    TeamDefinition {
        name: WEB_DESIGN.to_string(),
        display_name: "Web Design".to_string(),
        description: "Page layouts with requirements and generated assets".to_string(),
        keywords: words(&[
            "website", "web", "landing", "page", "design", "layout", "homepage", "ui", "site",
        ]),
        estimated_duration: Duration::from_secs(150),
        pipeline,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn router() -> TeamRouter {
        TeamRouter::builtin(Toolbox::unconfigured())
    }

    #[test]
    fn test_builtin_step_order() {
        let r = router();
        assert_eq!(
            r.get(TRAVEL_PLANNING).unwrap().pipeline.step_names(),
            vec![
                "initial_planning",
                "destination_research",
                "real_time_search",
                "final_compilation"
            ]
        );
        assert_eq!(r.get(BLOG_WRITING).unwrap().pipeline.len(), 5);
        assert_eq!(r.names(), vec![TRAVEL_PLANNING, BLOG_WRITING, WEB_DESIGN]);
    }

    #[test]
    fn test_policies() {
        let r = router();
        let travel = r.get(TRAVEL_PLANNING).unwrap();
        let policies: Vec<bool> = travel
            .pipeline
            .steps()
            .iter()
            .map(PipelineStep::continues_on_failure)
            .collect();
        assert_eq!(policies, vec![false, true, true, false]);
    }

    #[test]
    fn test_builtin_pipelines_are_valid() {
        for team in router().teams() {
            team.pipeline.validate().unwrap();
        }
    }

    #[test]
    fn test_huge_image_timeout_saturates() {
        let mut toolbox = Toolbox::unconfigured();
        toolbox.image_timeout = Duration::MAX;
        let r = TeamRouter::builtin(toolbox);
        let blog = r.get(BLOG_WRITING).unwrap();
        let images = &blog.pipeline.steps()[3];
        assert_eq!(images.name, "image_generation");
        assert_eq!(images.timeout, Duration::MAX);
    }

    #[test]
    fn test_route() {
        let r = router();
        assert_eq!(r.route("Plan a trip to Madinah for 14 days"), TRAVEL_PLANNING);
        assert_eq!(r.route("Write a blog post about dates"), BLOG_WRITING);
        assert_eq!(r.route("Design a landing page for my bakery"), WEB_DESIGN);
        assert_eq!(r.route("hello there"), BLOG_WRITING);
    }

    #[test]
    fn test_route_tie_goes_to_first_team() {
        // one travel keyword, one blog keyword
        assert_eq!(router().route("travel blog"), TRAVEL_PLANNING);
    }

    #[test]
    fn test_summary() {
        let s = router().get(TRAVEL_PLANNING).unwrap().summary();
        assert_eq!(s.steps.len(), 4);
        assert_eq!(s.steps[1].on_failure, "continue with default");
        assert!(s.steps[1].continues_on_failure);
        assert!(!s.steps[0].continues_on_failure);
        assert_eq!(s.estimated_secs, 120);
    }
}
