use super::map_reqwest_error;
use crate::config::SearchConfig;
use crate::tools::{SearchHit, SearchProvider};
use async_trait::async_trait;
use teamflow_core::{TeamflowError, TeamflowResult};
use tracing::debug;

/// Serper-compatible web search backend.
///
/// Sends `POST {endpoint}` with `{"q": query, "num": max_results}` and reads
/// the `organic` result list.
pub struct WebSearchBackend {
    config: SearchConfig,
    http: reqwest::Client,
}

impl WebSearchBackend {
    pub fn new(config: SearchConfig) -> TeamflowResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TeamflowError::Http(e.to_string()))?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl SearchProvider for WebSearchBackend {
    async fn search(&self, query: &str) -> TeamflowResult<Vec<SearchHit>> {
        debug!(query = %query, "Web search");
        let resp = self
            .http
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.config.api_key)
            .json(&serde_json::json!({"q": query, "num": self.config.max_results}))
            .send()
            .await
            .map_err(|e| map_reqwest_error("web search", self.config.timeout_secs * 1000, e))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TeamflowError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TeamflowError::Http(format!(
                "search API error {status}: {body}"
            )));
        }

        Ok(parse_hits(&body, self.config.max_results))
    }
}

/// Pull up to `limit` hits out of a search response; malformed entries are skipped.
pub fn parse_hits(body: &serde_json::Value, limit: usize) -> Vec<SearchHit> {
    body["organic"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(SearchHit {
                        title: item["title"].as_str()?.to_string(),
                        url: item["link"].as_str()?.to_string(),
                        snippet: item["snippet"].as_str().unwrap_or_default().to_string(),
                    })
                })
                .take(limit)
                .collect()
        })
        .unwrap_or_default()
}
