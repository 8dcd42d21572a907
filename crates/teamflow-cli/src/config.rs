use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use teamflow_agent::{
    ImageConfig, ImageGenerator, ModelConfig, OpenAiBackend, SearchConfig, SearchProvider,
    TextGenerator, Toolbox, Unconfigured, WebSearchBackend,
};
use teamflow_core::{TeamflowError, TeamflowResult};
use teamflow_feedback::ScoringWeights;
use teamflow_orchestrator::{OrchestratorConfig, RegistryConfig};
use tracing::{info, warn};

/// Contents of `teamflow.toml`. Every section is optional.
#[derive(Debug, Deserialize, Default)]
pub struct TeamflowConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Without a model section every LLM and image step fails fast.
    #[serde(default)]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub feedback: ScoringWeights,
    #[serde(default)]
    pub progress_log: ProgressLogSection,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SecurityConfig {
    /// Token refill rate per client bucket.
    #[serde(default = "default_rps")]
    pub max_requests_per_second: f64,
    /// Bucket size, i.e. the burst a client may send at once.
    #[serde(default = "default_burst")]
    pub max_burst: f64,
    /// Longest accepted request or feedback text, in characters.
    #[serde(default = "default_max_msg_len")]
    pub max_message_length: usize,
    /// Accepted API keys. Empty disables auth.
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Rate limit buckets idle this long are dropped.
    #[serde(default = "default_bucket_idle")]
    pub bucket_idle_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: default_rps(),
            max_burst: default_burst(),
            max_message_length: default_max_msg_len(),
            api_keys: vec![],
            bucket_idle_secs: default_bucket_idle(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegistrySection {
    /// Finished tasks older than this are swept.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
    /// Cap on stored tasks; the oldest finished ones go first.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
    /// Period of the maintenance sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            max_tasks: default_max_tasks(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DedupSection {
    /// How long an identical submission counts as a duplicate.
    #[serde(default = "default_dedup_ttl")]
    pub ttl_secs: u64,
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_dedup_ttl(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ProgressLogSection {
    /// JSONL file receiving step results; unset disables the log.
    pub path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_rps() -> f64 {
    10.0
}
fn default_burst() -> f64 {
    50.0
}
fn default_max_msg_len() -> usize {
    100_000
}
fn default_bucket_idle() -> u64 {
    600
}
fn default_retention() -> u64 {
    3600
}
fn default_max_tasks() -> usize {
    10_000
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_dedup_ttl() -> u64 {
    300
}

impl TeamflowConfig {
    pub fn parse(text: &str) -> TeamflowResult<Self> {
        toml::from_str(text).map_err(|e| TeamflowError::Config(e.to_string()))
    }

    /// Read `path`; a missing file means all defaults.
    pub async fn load(path: &Path) -> TeamflowResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(TeamflowError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))),
        }
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("TEAMFLOW_API_KEY").filter(|k| !k.is_empty()) {
            match self.model.as_mut() {
                Some(model) => model.api_key = key,
                None => warn!("TEAMFLOW_API_KEY is set but there is no [model] section"),
            }
        }
        if let Some(key) = lookup("TEAMFLOW_SEARCH_API_KEY").filter(|k| !k.is_empty()) {
            self.search.api_key = key;
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            registry: RegistryConfig {
                retention: Duration::from_secs(self.registry.retention_secs),
                max_tasks: self.registry.max_tasks,
            },
            dedup_ttl: Duration::from_secs(self.dedup.ttl_secs),
            scoring: self.feedback,
        }
    }

    /// Collaborators for agent steps. Anything without credentials is
    /// [`Unconfigured`], so its steps fail fast into their failure policy.
    pub fn toolbox(&self) -> TeamflowResult<Toolbox> {
        let (text, images): (Arc<dyn TextGenerator>, Arc<dyn ImageGenerator>) =
            match self.model.as_ref().filter(|m| m.is_configured()) {
                Some(model) => {
                    info!(model = %model.model_id, "Text and image generation enabled");
                    let backend = Arc::new(OpenAiBackend::new(model.clone(), self.images.clone())?);
                    let text: Arc<dyn TextGenerator> = backend.clone();
                    let images: Arc<dyn ImageGenerator> = backend;
                    (text, images)
                }
                None => {
                    warn!("No model credentials configured; LLM and image steps will fail");
                    let text: Arc<dyn TextGenerator> = Arc::new(Unconfigured("text generation"));
                    let images: Arc<dyn ImageGenerator> =
                        Arc::new(Unconfigured("image generation"));
                    (text, images)
                }
            };
        let search: Arc<dyn SearchProvider> = if self.search.is_configured() {
            Arc::new(WebSearchBackend::new(self.search.clone())?)
        } else {
            warn!("No search API key configured; search steps will use their defaults");
            Arc::new(Unconfigured("web search"))
        };

        let text_timeout = self
            .model
            .as_ref()
            .map_or(Duration::from_secs(60), ModelConfig::timeout);
        Ok(Toolbox::new(text, images, search).with_timeouts(
            text_timeout,
            Duration::from_secs(self.images.timeout_secs),
            Duration::from_secs(self.search.timeout_secs),
        ))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.registry.sweep_interval_secs.max(1))
    }

    pub fn bucket_idle(&self) -> Duration {
        Duration::from_secs(self.security.bucket_idle_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_all_defaults() {
        let config = TeamflowConfig::parse("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8000);
        assert!(config.security.api_keys.is_empty());
        assert_eq!(config.security.max_message_length, 100_000);
        assert_eq!(config.bucket_idle(), Duration::from_secs(600));
        assert!(config.model.is_none());
        assert_eq!(config.search.timeout_secs, 20);
        assert_eq!(config.images.timeout_secs, 90);
        assert_eq!(config.registry.max_tasks, 10_000);
        assert_eq!(config.dedup.ttl_secs, 300);
        assert_eq!(config.feedback, ScoringWeights::default());
        assert!(config.progress_log.path.is_none());
    }

    #[test]
    fn test_sections_parse() {
        let config = TeamflowConfig::parse(
            r#"
            [server]
            port = 9000

            [security]
            api_keys = ["k1"]
            max_burst = 5.0

            [model]
            provider = "openai"
            model_id = "gpt-4o-mini"
            timeout_secs = 30

            [registry]
            retention_secs = 120

            [dedup]
            ttl_secs = 10

            [feedback]
            min_confidence = 0.4

            [progress_log]
            path = "data/progress.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.security.api_keys, vec!["k1"]);
        assert_eq!(config.security.max_burst, 5.0);
        assert_eq!(config.model.as_ref().unwrap().timeout_secs, 30);
        assert_eq!(config.feedback.min_confidence, 0.4);
        assert_eq!(config.feedback.keyword_weight, 0.5);

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.registry.retention, Duration::from_secs(120));
        assert_eq!(orchestrator.dedup_ttl, Duration::from_secs(10));
        assert_eq!(
            config.progress_log.path.as_deref(),
            Some(Path::new("data/progress.jsonl"))
        );
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = TeamflowConfig::parse("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, TeamflowError::Config(_)));
    }

    #[test]
    fn test_env_overrides_secrets() {
        let mut config =
            TeamflowConfig::parse("[model]\nprovider = \"groq\"\nmodel_id = \"m\"\napi_key = \"file\"")
                .unwrap();
        config.apply_env(|name| match name {
            "TEAMFLOW_API_KEY" => Some("env-key".to_string()),
            "TEAMFLOW_SEARCH_API_KEY" => Some("search-key".to_string()),
            _ => None,
        });
        assert_eq!(config.model.unwrap().api_key, "env-key");
        assert_eq!(config.search.api_key, "search-key");
    }

    #[test]
    fn test_toolbox_without_credentials() {
        let toolbox = TeamflowConfig::default().toolbox().unwrap();
        assert_eq!(toolbox.search_timeout, Duration::from_secs(20));
        assert_eq!(toolbox.text_timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TeamflowConfig::load(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(config.server.port, 8000);
    }
}
