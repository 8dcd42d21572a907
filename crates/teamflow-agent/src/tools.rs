use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use teamflow_core::{TeamflowError, TeamflowResult};

/// LLM text completion.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> TeamflowResult<String>;
}

/// A generated (or found) image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub url: String,
    pub alt: String,
}

/// Image generation.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage>;
}

/// One web search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> TeamflowResult<Vec<SearchHit>>;
}

/// Stand-in for a collaborator that has no credentials configured.
///
/// Every call fails immediately, so steps fall back to their failure policy.
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl TextGenerator for Unconfigured {
    async fn complete(&self, _system_prompt: Option<&str>, _prompt: &str) -> TeamflowResult<String> {
        Err(TeamflowError::Config(format!("{} is not configured", self.0)))
    }
}

#[async_trait]
impl ImageGenerator for Unconfigured {
    async fn generate(&self, _prompt: &str) -> TeamflowResult<GeneratedImage> {
        Err(TeamflowError::Config(format!("{} is not configured", self.0)))
    }
}

#[async_trait]
impl SearchProvider for Unconfigured {
    async fn search(&self, _query: &str) -> TeamflowResult<Vec<SearchHit>> {
        Err(TeamflowError::Config(format!("{} is not configured", self.0)))
    }
}

/// The external collaborators available to agent steps, each with its own time budget.
#[derive(Clone)]
pub struct Toolbox {
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub search: Arc<dyn SearchProvider>,
    pub text_timeout: Duration,
    pub image_timeout: Duration,
    pub search_timeout: Duration,
}

impl Toolbox {
    pub fn new(
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        search: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            text,
            images,
            search,
            text_timeout: Duration::from_secs(60),
            image_timeout: Duration::from_secs(90),
            search_timeout: Duration::from_secs(20),
        }
    }

    /// A toolbox where every collaborator is [`Unconfigured`].
    pub fn unconfigured() -> Self {
        Self::new(
            Arc::new(Unconfigured("text generation")),
            Arc::new(Unconfigured("image generation")),
            Arc::new(Unconfigured("web search")),
        )
    }

    pub fn with_timeouts(mut self, text: Duration, image: Duration, search: Duration) -> Self {
        self.text_timeout = text;
        self.image_timeout = image;
        self.search_timeout = search;
        self
    }

    pub async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> TeamflowResult<String> {
        with_timeout(
            "text generation",
            self.text_timeout,
            self.text.complete(system_prompt, prompt),
        )
        .await
    }

    pub async fn generate_image(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
        with_timeout(
            "image generation",
            self.image_timeout,
            self.images.generate(prompt),
        )
        .await
    }

    pub async fn search(&self, query: &str) -> TeamflowResult<Vec<SearchHit>> {
        with_timeout("web search", self.search_timeout, self.search.search(query)).await
    }
}

/// Await `fut`, converting an elapsed budget into [`TeamflowError::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, budget: Duration, fut: F) -> TeamflowResult<T>
where
    F: Future<Output = TeamflowResult<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(TeamflowError::Timeout {
            operation: operation.to_string(),
            after_ms: budget.as_millis() as u64,
        }),
    }
}
