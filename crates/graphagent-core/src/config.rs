use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GraphAgentError, Result};

/// Upper bound accepted for `agent.max_steps`.
pub const MAX_STEPS_LIMIT: usize = 256;

/// Step budget used when `agent.max_steps` is not set.
pub const DEFAULT_MAX_STEPS: usize = 24;

/// Top-level GraphAgent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// API base, e.g. `http://127.0.0.1:1234/v1`. `/chat/completions` is appended.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// System preamble sent with every call (None = built-in preamble).
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            system_prompt: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "qwen/qwen2.5-vl-7b".to_string() }
fn default_max_tokens() -> u32 { 800 }
fn default_temperature() -> f32 { 0.2 }
fn default_request_timeout() -> u64 { 120 }

/// Workflow runner and node tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Step budget per run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Scratch lines the router sees.
    #[serde(default = "default_route_context_lines")]
    pub route_context_lines: usize,
    /// Scratch lines the writer sees.
    #[serde(default = "default_write_context_lines")]
    pub write_context_lines: usize,
    /// Search queries generated per research pass.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    /// Snippets requested per retrieval call.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
    /// Also search for the raw task text.
    #[serde(default = "default_baseline_query")]
    pub baseline_query: bool,
    /// Evidence lines appended per research pass.
    #[serde(default = "default_max_evidence")]
    pub max_evidence: usize,
    /// Evidence lines summarized into the scratch trace.
    #[serde(default = "default_evidence_summary_lines")]
    pub evidence_summary_lines: usize,
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
    /// Evidence lines offered to the writer for citation.
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    #[serde(default = "default_write_temperature")]
    pub write_temperature: f32,
    /// Critic replies at or below this length never replace the answer.
    #[serde(default = "default_critic_min_chars")]
    pub critic_min_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            route_context_lines: default_route_context_lines(),
            write_context_lines: default_write_context_lines(),
            max_queries: default_max_queries(),
            retrieval_limit: default_retrieval_limit(),
            baseline_query: default_baseline_query(),
            max_evidence: default_max_evidence(),
            evidence_summary_lines: default_evidence_summary_lines(),
            snippet_max_chars: default_snippet_max_chars(),
            max_citations: default_max_citations(),
            write_temperature: default_write_temperature(),
            critic_min_chars: default_critic_min_chars(),
        }
    }
}

fn default_max_steps() -> usize { DEFAULT_MAX_STEPS }
fn default_route_context_lines() -> usize { 3 }
fn default_write_context_lines() -> usize { 5 }
fn default_max_queries() -> usize { 3 }
fn default_retrieval_limit() -> usize { 3 }
fn default_baseline_query() -> bool { true }
fn default_max_evidence() -> usize { 12 }
fn default_evidence_summary_lines() -> usize { 6 }
fn default_snippet_max_chars() -> usize { 240 }
fn default_max_citations() -> usize { 8 }
fn default_write_temperature() -> f32 { 0.3 }
fn default_critic_min_chars() -> usize { 20 }

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackend {
    /// No backend; every search yields the error sentinel.
    #[default]
    None,
    /// Remote RAG service over HTTP.
    Http,
    /// In-memory keyword scoring over a JSON corpus.
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub backend: RetrievalBackend,
    /// Search endpoint for the `http` backend.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Corpus file for the `keyword` backend.
    #[serde(default)]
    pub corpus: Option<String>,
    /// Collection profile forwarded to the RAG service.
    #[serde(default)]
    pub profile: String,
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,
    #[serde(default = "default_rerank_k")]
    pub rerank_k: usize,
    #[serde(default = "default_context_k")]
    pub context_k: usize,
    #[serde(default = "default_rerank")]
    pub rerank: bool,
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: RetrievalBackend::None,
            endpoint: None,
            api_key: None,
            corpus: None,
            profile: String::new(),
            recall_k: default_recall_k(),
            rerank_k: default_rerank_k(),
            context_k: default_context_k(),
            rerank: default_rerank(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

fn default_recall_k() -> usize { 40 }
fn default_rerank_k() -> usize { 12 }
fn default_context_k() -> usize { 8 }
fn default_rerank() -> bool { true }
fn default_retrieval_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Directory holding `<name>.toml` pipeline definitions.
    #[serde(default = "default_pipelines_dir")]
    pub pipelines_dir: String,
    #[serde(default = "default_pipeline")]
    pub default_pipeline: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            pipelines_dir: default_pipelines_dir(),
            default_pipeline: default_pipeline(),
        }
    }
}

fn default_pipelines_dir() -> String { "pipelines".to_string() }
fn default_pipeline() -> String { "default".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GraphAgentError::ConfigNotFound(path.display().to_string()))?;

        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text, expanding `${ENV_VAR}` references.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| GraphAgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 || self.agent.max_steps > MAX_STEPS_LIMIT {
            return Err(GraphAgentError::Config(format!(
                "agent.max_steps must be between 1 and {}, got {}",
                MAX_STEPS_LIMIT, self.agent.max_steps
            )));
        }
        if !(0.0..=2.0).contains(&self.agent.write_temperature)
            || !(0.0..=2.0).contains(&self.model.temperature)
        {
            return Err(GraphAgentError::Config(
                "temperatures must be between 0.0 and 2.0".into(),
            ));
        }
        match self.retrieval.backend {
            RetrievalBackend::Http if self.retrieval.endpoint.is_none() => Err(
                GraphAgentError::Config("retrieval.endpoint is required for the http backend".into()),
            ),
            RetrievalBackend::Keyword if self.retrieval.corpus.is_none() => Err(
                GraphAgentError::Config("retrieval.corpus is required for the keyword backend".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Resolve the pipelines directory relative to `base` (the config file's
    /// directory) unless it is absolute.
    pub fn pipelines_dir(&self, base: Option<&Path>) -> PathBuf {
        let dir = PathBuf::from(&self.workflow.pipelines_dir);
        match base {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir,
        }
    }

    /// A copy safe to print: secrets replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.model.api_key.is_some() {
            copy.model.api_key = Some("<redacted>".into());
        }
        if copy.retrieval.api_key.is_some() {
            copy.retrieval.api_key = Some("<redacted>".into());
        }
        copy
    }
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
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
