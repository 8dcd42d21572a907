use super::map_reqwest_error;
use crate::config::{ImageConfig, LlmProvider, ModelConfig};
use crate::tools::{GeneratedImage, ImageGenerator, TextGenerator};
use async_trait::async_trait;
use teamflow_core::{TeamflowError, TeamflowResult};
use tracing::debug;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API. Image generation uses
/// the `/v1/images/generations` endpoint of the same provider.
pub struct OpenAiBackend {
    config: ModelConfig,
    images: ImageConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig, images: ImageConfig) -> TeamflowResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout().max(std::time::Duration::from_secs(images.timeout_secs)))
            .build()
            .map_err(|e| TeamflowError::Http(e.to_string()))?;
        Ok(Self {
            config,
            images,
            http,
        })
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "Teamflow")
        } else {
            request
        }
    }

    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
        operation: &str,
        budget_secs: u64,
    ) -> TeamflowResult<serde_json::Value> {
        let url = format!("{}{}", self.config.base_url(), path);
        let resp = self
            .add_provider_headers(self.http.post(&url))
            .timeout(std::time::Duration::from_secs(budget_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| map_reqwest_error(operation, budget_secs * 1000, e))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TeamflowError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TeamflowError::Http(format!(
                "{operation} API error {status}: {resp_body}"
            )));
        }
        Ok(resp_body)
    }
}

#[async_trait]
impl TextGenerator for OpenAiBackend {
    async fn complete(&self, system_prompt: Option<&str>, prompt: &str) -> TeamflowResult<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": messages,
        });

        debug!(model = %self.config.model_id, prompt_len = prompt.len(), "Chat completion");
        let resp = self
            .post_json(
                "/v1/chat/completions",
                &body,
                "chat completion",
                self.config.timeout_secs,
            )
            .await?;
        parse_completion(&resp)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiBackend {
    async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
        let body = serde_json::json!({
            "model": self.images.model_id,
            "prompt": prompt,
            "n": 1,
            "size": self.images.size,
        });

        debug!(model = %self.images.model_id, "Image generation");
        let resp = self
            .post_json(
                "/v1/images/generations",
                &body,
                "image generation",
                self.images.timeout_secs,
            )
            .await?;
        parse_image(&resp, prompt)
    }
}

/// Extract the assistant text from a chat completions response.
pub fn parse_completion(body: &serde_json::Value) -> TeamflowResult<String> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();
    if content.is_empty() {
        return Err(TeamflowError::Http(
            "chat completion returned no content".to_string(),
        ));
    }
    Ok(content.to_string())
}

/// Extract the first image from an images API response.
pub fn parse_image(body: &serde_json::Value, prompt: &str) -> TeamflowResult<GeneratedImage> {
    let first = &body["data"][0];
    let url = first["url"].as_str().unwrap_or_default();
    if url.is_empty() {
        return Err(TeamflowError::Http(
            "image generation returned no url".to_string(),
        ));
    }
    let alt = first["revised_prompt"].as_str().unwrap_or(prompt);
    Ok(GeneratedImage {
        url: url.to_string(),
        alt: alt.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  Day 1: arrive  "}}]
        });
        assert_eq!(parse_completion(&body).unwrap(), "Day 1: arrive");
    }

    #[test]
    fn test_parse_completion_empty() {
        let body = serde_json::json!({"choices": []});
        assert!(parse_completion(&body).is_err());
    }

    #[test]
    fn test_parse_image_falls_back_to_prompt_for_alt() {
        let body = serde_json::json!({"data": [{"url": "https://img/1.png"}]});
        let img = parse_image(&body, "a mosque at dusk").unwrap();
        assert_eq!(img.url, "https://img/1.png");
        assert_eq!(img.alt, "a mosque at dusk");
    }
}
