//! Configuration for the retrieval engine and evaluation harness.
//!
//! Supports both environment variables and a YAML config file.
//! Environment variables take precedence over config file values.
//! Every tunable named here is overridable without code changes.

use crate::error::{RankfuseError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Retrieval weights and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Weight applied to the dense/semantic score during fusion.
    pub semantic_weight: f32,

    /// Weight applied to the sparse/lexical score during fusion.
    pub lexical_weight: f32,

    /// Number of fused results to return per query.
    pub match_count: usize,

    /// Minimum cosine similarity for vector candidates. Hits at or below
    /// this value are discarded before fusion.
    pub match_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            match_count: 10,
            match_threshold: 0.2,
        }
    }
}

/// Judge service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Base URL for the judge service.
    pub api_base: String,

    /// API key for the judge's backing LLM.
    pub api_key: String,

    /// Judge model identifier.
    pub model: String,

    /// Deadline for a single judge call, in seconds.
    #[serde(default = "default_judge_timeout")]
    pub timeout_secs: u64,
}

fn default_judge_timeout() -> u64 {
    60
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: String::new(),
            timeout_secs: default_judge_timeout(),
        }
    }
}

/// LLM configuration for the answer-generation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Base URL for the embedding API.
    pub api_base: String,

    /// API key for authentication.
    pub api_key: String,

    /// Embedding model identifier.
    pub model: String,

    /// Maximum cached query embeddings.
    pub cache_capacity: u64,

    /// Cache entry time-to-live, in seconds.
    pub cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            cache_capacity: 512,
            cache_ttl_secs: 600,
        }
    }
}

/// Harness scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Queries processed concurrently within a batch.
    pub concurrency: usize,

    /// Courtesy pause between batches, in milliseconds. Zero disables it.
    pub batch_pause_ms: u64,

    /// Fraction of benchmark queries to evaluate (deterministic stride).
    pub sample_rate: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            batch_pause_ms: 0,
            sample_rate: 1.0,
        }
    }
}

/// Target and alert thresholds for the judged-quality metrics, plus optional
/// alert floors for the aggregate IR metrics.
///
/// A record passes only when every judged score meets its *target*. The lower
/// *alert* values gate the run-level verdict: an aggregate average dropping
/// below an alert threshold fails the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub faithfulness_target: f64,
    pub faithfulness_alert: f64,
    pub answer_relevancy_target: f64,
    pub answer_relevancy_alert: f64,
    pub context_precision_target: f64,
    pub context_precision_alert: f64,

    /// Optional alert floor for mean MRR. None disables the check.
    pub mrr_alert: Option<f64>,
    /// Optional alert floor for mean NDCG@K.
    pub ndcg_alert: Option<f64>,
    /// Optional alert floor for mean Precision@K.
    pub precision_alert: Option<f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            faithfulness_target: 0.85,
            faithfulness_alert: 0.70,
            answer_relevancy_target: 0.80,
            answer_relevancy_alert: 0.65,
            context_precision_target: 0.75,
            context_precision_alert: 0.60,
            mrr_alert: None,
            ndcg_alert: None,
            precision_alert: None,
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Retrieval weights and limits.
    pub retrieval: RetrievalConfig,
    /// Judge service settings.
    pub judge: JudgeConfig,
    /// Answer-generation LLM settings.
    pub llm: LlmConfig,
    /// Embedding service settings.
    pub embedding: EmbeddingConfig,
    /// Harness scheduling settings.
    pub eval: EvalConfig,
    /// Per-metric target and alert thresholds.
    pub thresholds: ThresholdConfig,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (~/.config/rankfuse/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RankfuseError::io(path, e))?;

        serde_yaml::from_str(&content)
            .map_err(|e| RankfuseError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Override fields from environment variables.
    fn apply_env(&mut self) {
        if let Ok(v) = env::var("JUDGE_API_BASE") {
            self.judge.api_base = v;
        }
        if let Ok(v) = env::var("JUDGE_API_KEY") {
            self.judge.api_key = v;
        }
        if let Ok(v) = env::var("JUDGE_MODEL") {
            self.judge.model = v;
        }
        if let Ok(v) = env::var("JUDGE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.judge.timeout_secs = secs;
            }
        }

        if let Ok(v) = env::var("LLM_API_BASE") {
            self.llm.api_base = v;
        }
        if let Ok(v) = env::var("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = env::var("LLM_MODEL") {
            self.llm.model = v;
        }

        if let Ok(v) = env::var("EMBEDDING_API_BASE") {
            self.embedding.api_base = v;
        }
        if let Ok(v) = env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = v;
        }
        if let Ok(v) = env::var("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }

        if let Ok(v) = env::var("RETRIEVAL_SEMANTIC_WEIGHT") {
            if let Ok(w) = v.parse() {
                self.retrieval.semantic_weight = w;
            }
        }
        if let Ok(v) = env::var("RETRIEVAL_LEXICAL_WEIGHT") {
            if let Ok(w) = v.parse() {
                self.retrieval.lexical_weight = w;
            }
        }
        if let Ok(v) = env::var("RETRIEVAL_MATCH_COUNT") {
            if let Ok(n) = v.parse() {
                self.retrieval.match_count = n;
            }
        }
        if let Ok(v) = env::var("RETRIEVAL_MATCH_THRESHOLD") {
            if let Ok(t) = v.parse() {
                self.retrieval.match_threshold = t;
            }
        }

        if let Ok(v) = env::var("EVAL_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.eval.concurrency = n;
            }
        }
        if let Ok(v) = env::var("EVAL_BATCH_PAUSE_MS") {
            if let Ok(ms) = v.parse() {
                self.eval.batch_pause_ms = ms;
            }
        }
        if let Ok(v) = env::var("EVAL_SAMPLE_RATE") {
            if let Ok(r) = v.parse() {
                self.eval.sample_rate = r;
            }
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rankfuse")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate the settings every run needs.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.match_count == 0 {
            return Err(RankfuseError::Config(
                "retrieval.match_count must be at least 1".to_string(),
            ));
        }

        if self.retrieval.semantic_weight < 0.0 || self.retrieval.lexical_weight < 0.0 {
            return Err(RankfuseError::Config(
                "Retrieval weights must be non-negative".to_string(),
            ));
        }

        if self.retrieval.semantic_weight + self.retrieval.lexical_weight <= 0.0 {
            return Err(RankfuseError::Config(
                "At least one retrieval weight must be positive".to_string(),
            ));
        }

        if self.eval.concurrency == 0 {
            return Err(RankfuseError::Config(
                "eval.concurrency must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.eval.sample_rate) {
            return Err(RankfuseError::Config(
                "eval.sample_rate must be within [0, 1]".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate the settings a judged run additionally needs.
    ///
    /// Missing judge credentials must fail fast here, before any query runs.
    pub fn validate_judged(&self) -> Result<()> {
        if self.judge.api_base.is_empty() {
            return Err(RankfuseError::Config(
                "Judge API base URL is required for judged evaluation. Set JUDGE_API_BASE or add judge.api_base to the config file.".to_string()
            ));
        }

        if self.judge.api_key.is_empty() {
            return Err(RankfuseError::Config(
                "Judge API key is required for judged evaluation. Set JUDGE_API_KEY or add judge.api_key to the config file.".to_string()
            ));
        }

        if self.llm.api_base.is_empty() || self.llm.api_key.is_empty() {
            return Err(RankfuseError::Config(
                "Answer generation requires LLM credentials. Set LLM_API_BASE and LLM_API_KEY or add them to the config file.".to_string()
            ));
        }

        Ok(())
    }

    /// Validate the settings a live (non-dry) retrieval run needs.
    pub fn validate_embedding(&self) -> Result<()> {
        if self.embedding.api_base.is_empty() || self.embedding.api_key.is_empty() {
            return Err(RankfuseError::Config(
                "Query embedding requires credentials. Set EMBEDDING_API_BASE and EMBEDDING_API_KEY or add them to the config file.".to_string()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.retrieval.semantic_weight - 0.7).abs() < f32::EPSILON);
        assert!((config.retrieval.lexical_weight - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.match_count, 10);
        assert_eq!(config.judge.timeout_secs, 60);
        assert_eq!(config.eval.concurrency, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_thresholds() {
        let t = ThresholdConfig::default();
        assert!((t.faithfulness_target - 0.85).abs() < f64::EPSILON);
        assert!((t.faithfulness_alert - 0.70).abs() < f64::EPSILON);
        assert!((t.answer_relevancy_target - 0.80).abs() < f64::EPSILON);
        assert!((t.context_precision_alert - 0.60).abs() < f64::EPSILON);
        assert!(t.mrr_alert.is_none());
    }

    #[test]
    fn test_validate_judged_fails_without_credentials() {
        let config = Config::default();
        assert!(config.validate_judged().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_weights() {
        let mut config = Config::default();
        config.retrieval.semantic_weight = 0.0;
        config.retrieval.lexical_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_sample_rate() {
        let mut config = Config::default();
        config.eval.sample_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
retrieval:
  match_count: 5
judge:
  timeout_secs: 30
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.retrieval.match_count, 5);
        assert!((config.retrieval.semantic_weight - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.judge.timeout_secs, 30);
        assert_eq!(config.eval.concurrency, 3);
    }
}
