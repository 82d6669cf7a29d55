use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OpscoutError, Result};

/// Top-level opscout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Retries are off unless this section is present.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Neo4j connection used by the knowledge query gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Base HTTP URL of the Neo4j server. Default: http://localhost:7474
    #[serde(default = "default_knowledge_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            url: default_knowledge_url(),
            database: default_database(),
            user: None,
            password: None,
        }
    }
}

fn default_knowledge_url() -> String { "http://localhost:7474".to_string() }
fn default_database() -> String { "neo4j".to_string() }

/// Embedding model configuration for patent recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Any OpenAI-compatible embeddings endpoint (without the `/embeddings` suffix).
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
}

fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dims() -> usize { 1536 }

/// Local vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default = "default_vector_path")]
    pub path: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            path: default_vector_path(),
            top_k: default_top_k(),
        }
    }
}

fn default_vector_path() -> String { "~/.opscout/vectors.db".to_string() }
fn default_top_k() -> usize { 15 }

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Per-node timeout in seconds.
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Number of ranked problems reported by the technology gap analysis.
    #[serde(default = "default_max_findings")]
    pub max_gap_findings: usize,
    /// Number of associated technologies reported by the association analysis.
    #[serde(default = "default_max_findings")]
    pub max_associations: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout(),
            max_gap_findings: default_max_findings(),
            max_associations: default_max_findings(),
        }
    }
}

fn default_node_timeout() -> u64 { 300 }
fn default_max_findings() -> usize { 10 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| OpscoutError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| OpscoutError::Config(e.to_string()))
    }

    /// Resolve the vector index path (expand ~).
    pub fn vector_path(&self) -> PathBuf {
        expand_home(&self.vector.path)
    }

    /// Copy of this config with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.model.api_key.is_some() {
            config.model.api_key = Some("***".to_string());
        }
        if config.knowledge.password.is_some() {
            config.knowledge.password = Some("***".to_string());
        }
        if let Some(ref mut embedding) = config.embedding {
            if embedding.api_key.is_some() {
                embedding.api_key = Some("***".to_string());
            }
        }
        config
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
