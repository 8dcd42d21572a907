use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
    /// Local Ollama server exposing the OpenAI-compatible endpoints.
    Ollama,
}

/// Text (and image) model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    /// Overridden by `TEAMFLOW_API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Defaults to the provider's public endpoint.
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Bound on every completion call.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_llm_timeout() -> u64 {
    60
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
                LlmProvider::Ollama => "http://localhost:11434",
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Whether calls can be made at all (local providers need no key).
    pub fn is_configured(&self) -> bool {
        matches!(self.provider, LlmProvider::Ollama) || !self.api_key.is_empty()
    }
}

/// Image generation settings. Uses the same provider credentials as the text model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub model_id: String,
    /// e.g. `1024x1024`.
    #[serde(default = "default_image_size")]
    pub size: String,
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_image_size() -> String {
    "1024x1024".to_string()
}

fn default_image_timeout() -> u64 {
    90
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model_id: default_image_model(),
            size: default_image_size(),
            timeout_secs: default_image_timeout(),
        }
    }
}

/// Web search API settings (Serper-compatible JSON API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Serper-compatible search URL.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    /// Overridden by `TEAMFLOW_SEARCH_API_KEY`; empty disables search.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_search_endpoint() -> String {
    "https://google.serper.dev/search".to_string()
}

fn default_search_timeout() -> u64 {
    20
}

fn default_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key: String::new(),
            timeout_secs: default_search_timeout(),
            max_results: default_max_results(),
        }
    }
}

impl SearchConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
