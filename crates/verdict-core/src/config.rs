use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VerdictError};
use crate::types::{GenerationParams, LabelSet};

/// Top-level Verdict configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Label vocabulary; the last entry is the fallback label.
    #[serde(default)]
    pub labels: LabelSet,
    /// Backend for debaters and classifiers.
    pub model: ModelConfig,
    /// Backend for judges. Defaults to `model` when absent.
    #[serde(default)]
    pub explainer: Option<ModelConfig>,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
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
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "openai".to_string() }
fn default_request_timeout() -> u64 { 120 }

/// Sampling defaults applied to every generating node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            do_sample: default_do_sample(),
        }
    }
}

impl GenerationConfig {
    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            do_sample: self.do_sample,
        }
    }
}

fn default_max_new_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.7 }
fn default_do_sample() -> bool { true }

/// Retry configuration for generation requests.
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

/// Evidence search client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Snippets attached to a prompt.
    #[serde(default = "default_snippets")]
    pub snippets: usize,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_region")]
    pub region: String,
    /// Total attempts per search, including the first.
    #[serde(default = "default_search_attempts")]
    pub max_retries: u32,
    #[serde(default = "default_search_backoff")]
    pub initial_backoff_ms: u64,
    /// Upper bound of the random jitter added to each backoff sleep.
    #[serde(default = "default_search_jitter")]
    pub jitter_ms: u64,
    /// Politeness delay window after every successful search.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            snippets: default_snippets(),
            endpoint: default_search_endpoint(),
            region: default_search_region(),
            max_retries: default_search_attempts(),
            initial_backoff_ms: default_search_backoff(),
            jitter_ms: default_search_jitter(),
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_snippets() -> usize { 3 }
fn default_search_endpoint() -> String { "https://html.duckduckgo.com/html/".to_string() }
fn default_search_region() -> String { "us-en".to_string() }
fn default_search_attempts() -> u32 { 5 }
fn default_search_backoff() -> u64 { 1000 }
fn default_search_jitter() -> u64 { 500 }
fn default_min_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 2000 }
fn default_search_timeout() -> u64 { 10 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Invoke the children of a node concurrently.
    #[serde(default = "default_parallel_children")]
    pub parallel_children: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_children: default_parallel_children(),
        }
    }
}

fn default_parallel_children() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// JSON Lines file of `{"claim": ..., "label": ...}` records.
    #[serde(default)]
    pub dataset: Option<String>,
    /// Number of examples evaluated.
    #[serde(default = "default_subset")]
    pub subset: usize,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Drop repeated claims from the subset once it has been taken.
    #[serde(default = "default_dedupe")]
    pub dedupe: bool,
    /// Per-example prediction log (JSONL).
    #[serde(default = "default_log_path")]
    pub log_path: String,
    /// Pipelines to run (empty = all).
    #[serde(default)]
    pub pipelines: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            subset: default_subset(),
            shuffle: false,
            seed: default_seed(),
            dedupe: default_dedupe(),
            log_path: default_log_path(),
            pipelines: vec![],
        }
    }
}

fn default_subset() -> usize { 30 }
fn default_seed() -> u64 { 42 }
fn default_dedupe() -> bool { true }
fn default_log_path() -> String { "benchmark.jsonl".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| VerdictError::ConfigNotFound(path.display().to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| VerdictError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(VerdictError::Config("model.model_id must not be empty".into()));
        }
        if self.search.min_delay_ms > self.search.max_delay_ms {
            return Err(VerdictError::Config(format!(
                "search.min_delay_ms ({}) exceeds search.max_delay_ms ({})",
                self.search.min_delay_ms, self.search.max_delay_ms
            )));
        }
        if self.search.max_retries == 0 {
            return Err(VerdictError::Config("search.max_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Backend used by judge nodes.
    pub fn explainer(&self) -> &ModelConfig {
        self.explainer.as_ref().unwrap_or(&self.model)
    }

    /// Resolve the prediction log path (expand ~).
    pub fn log_path(&self) -> PathBuf {
        let raw = &self.evaluation.log_path;
        if let Some(rest) = raw.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(raw)
    }
}

/// Expand `${ENV_VAR}` patterns in a string. Unset variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
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
