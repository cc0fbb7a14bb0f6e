//! Configuration types for Quill

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{QuillError, Result};
use crate::llm::RetryConfig;

/// Main configuration for the content pipeline
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuillConfig {
    /// Text-generation service
    pub llm: LLMProviderConfig,

    /// Step function tuning
    pub generation: GenerationConfig,

    /// Regeneration policy bounds
    pub policy: PolicyConfig,

    /// Transport retry for the text-generation service
    pub retry: RetryConfig,

    /// Job store backend
    pub store: StoreConfig,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMProviderConfig {
    /// Provider type
    pub provider: LLMProvider,

    /// Default model name
    pub model: String,

    /// API key (prefer `OPENAI_API_KEY`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for compatible endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for LLMProviderConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            model: "gpt-4o".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
}

/// Tuning for the generation step functions and QC agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of concepts requested per topic
    pub concept_count: usize,
    /// Number of subtopics requested per approved concept
    pub subtopic_count: usize,
    /// Temperature for concept and subtopic ideation
    pub ideation_temperature: f32,
    /// Temperature for article drafting
    pub draft_temperature: f32,
    /// Temperature for QC reviews
    pub review_temperature: f32,
    /// Token cap for article drafts
    pub draft_max_tokens: usize,
    /// Token cap for QC reviews
    pub review_max_tokens: usize,
    /// Character budget for any injected context block
    pub max_context_chars: usize,
    /// Longest accepted topic
    pub max_topic_chars: usize,
    /// Model override for QC reviews; the provider default otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_model: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            concept_count: 5,
            subtopic_count: 5,
            ideation_temperature: 0.8,
            draft_temperature: 0.7,
            review_temperature: 0.2,
            draft_max_tokens: 2500,
            review_max_tokens: 600,
            max_context_chars: 4000,
            max_topic_chars: 500,
            review_model: None,
        }
    }
}

/// Regeneration policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Regenerations allowed before forcing human review
    pub max_regenerations: u32,
    /// Minimum passing brand/fact score, inclusive
    pub score_threshold: f64,
    /// Route passing drafts through the final review gate too
    pub require_final_approval: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_regenerations: 3,
            score_threshold: 70.0,
            require_final_approval: false,
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,
    /// One JSON document per request under `dir`
    File {
        /// Directory holding workflow documents
        dir: PathBuf,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            dir: default_store_dir(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("jobs")
}

impl QuillConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `quill.toml` in the working directory
    /// 3. The file named by `QUILL_CONFIG_PATH`
    /// 4. `QUILL_`-prefixed environment variables, nested with `__`
    ///    (e.g. `QUILL_POLICY__SCORE_THRESHOLD=75`)
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Toml},
        };

        let mut figment = Figment::new().merge(Toml::file("quill.toml"));

        if let Ok(path) = std::env::var("QUILL_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: QuillConfig = figment
            .merge(Env::prefixed("QUILL_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| QuillError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Toml},
        };

        let config: QuillConfig = Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                QuillError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.policy.score_threshold) {
            return Err(QuillError::Configuration(format!(
                "policy.score_threshold must be within [0, 100], got {}",
                self.policy.score_threshold
            )));
        }
        if self.generation.concept_count == 0 || self.generation.subtopic_count == 0 {
            return Err(QuillError::Configuration(
                "generation.concept_count and generation.subtopic_count must be positive"
                    .to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(QuillError::Configuration("llm.model must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(QuillError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
