//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::DEFAULT_KNOWN_ENTITIES;
use crate::error::AgentError;

/// Default model for classification, planning, and evaluation calls.
const DEFAULT_FAST_MODEL: &str = "gpt-4o-mini";
/// Default model for user-facing answers.
const DEFAULT_ANSWER_MODEL: &str = "gpt-4o";
/// Default model for answers that need fresh public information.
const DEFAULT_SEARCH_MODEL: &str = "gpt-4o-search-preview";
/// Default classifier max tokens.
const DEFAULT_CLASSIFIER_MAX_TOKENS: u32 = 300;
/// Default planner max tokens.
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
/// Default synthesizer max tokens.
const DEFAULT_SYNTHESIZER_MAX_TOKENS: u32 = 2048;
/// Default evaluator max tokens.
const DEFAULT_EVALUATOR_MAX_TOKENS: u32 = 400;
/// Default completion timeout in seconds.
const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 60;
/// Default per-tool-call timeout in seconds.
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
/// Default tool discovery timeout in seconds.
const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 15;
/// Tier-1 confidence below which the classifier consults the model.
const DEFAULT_CLASSIFICATION_THRESHOLD: f32 = 0.7;
/// Quality score below which the evaluator asks for a better approach.
const DEFAULT_QUALITY_THRESHOLD: f32 = 0.6;
/// Number of recent turns the context analyzer inspects.
const DEFAULT_CONTEXT_WINDOW: usize = 6;

/// Configuration for the orchestration engine.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// LLM provider name (e.g., "openai").
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Model for Tier-2 classification.
    pub classifier_model: String,
    /// Model for tool planning.
    pub planner_model: String,
    /// Model for synthesizing answers from tool output or context.
    pub synthesizer_model: String,
    /// Model for direct answers from model knowledge.
    pub completion_model: String,
    /// Model for answers that need current public information.
    pub search_model: String,
    /// Model for outcome evaluation.
    pub evaluator_model: String,
    /// Maximum tokens for classifier responses.
    pub classifier_max_tokens: u32,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for synthesized and direct answers.
    pub synthesizer_max_tokens: u32,
    /// Maximum tokens for evaluator responses.
    pub evaluator_max_tokens: u32,
    /// Bound on every completion call.
    pub completion_timeout: Duration,
    /// Bound on every tool call.
    pub tool_timeout: Duration,
    /// Bound on enumerating the tool catalogue.
    pub discovery_timeout: Duration,
    /// Tier-1 confidence below which Tier 2 runs. Must lie in `[0, 1]`.
    pub classification_threshold: f32,
    /// Quality score below which an improvement suggestion is requested.
    /// Must lie in `[0, 1]`.
    pub quality_threshold: f32,
    /// Number of recent conversation turns inspected for reusable context.
    pub context_window: usize,
    /// Closed set of proper nouns recognised by search-query extraction.
    pub known_entities: Vec<String>,
    /// Directory containing prompt template files.
    ///
    /// When set, the agent system loads system prompts from markdown files
    /// in this directory, falling back to compiled-in defaults for any
    /// missing files.
    pub prompt_dir: Option<PathBuf>,
    /// Whether to run the asynchronous evaluation after each request.
    pub evaluate: bool,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    classifier_model: Option<String>,
    planner_model: Option<String>,
    synthesizer_model: Option<String>,
    completion_model: Option<String>,
    search_model: Option<String>,
    evaluator_model: Option<String>,
    classifier_max_tokens: Option<u32>,
    planner_max_tokens: Option<u32>,
    synthesizer_max_tokens: Option<u32>,
    evaluator_max_tokens: Option<u32>,
    completion_timeout: Option<Duration>,
    tool_timeout: Option<Duration>,
    discovery_timeout: Option<Duration>,
    classification_threshold: Option<f32>,
    quality_threshold: Option<f32>,
    context_window: Option<usize>,
    known_entities: Option<Vec<String>>,
    prompt_dir: Option<PathBuf>,
    evaluate: Option<bool>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("ASSIST_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("OPENAI_API_KEY")
                .or_else(|_| std::env::var("ASSIST_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("OPENAI_BASE_URL")
                .or_else(|_| std::env::var("ASSIST_BASE_URL"))
                .ok();
        }
        if self.classifier_model.is_none() {
            self.classifier_model = std::env::var("ASSIST_CLASSIFIER_MODEL").ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("ASSIST_PLANNER_MODEL").ok();
        }
        if self.synthesizer_model.is_none() {
            self.synthesizer_model = std::env::var("ASSIST_SYNTHESIZER_MODEL").ok();
        }
        if self.completion_model.is_none() {
            self.completion_model = std::env::var("ASSIST_COMPLETION_MODEL").ok();
        }
        if self.search_model.is_none() {
            self.search_model = std::env::var("ASSIST_SEARCH_MODEL").ok();
        }
        if self.evaluator_model.is_none() {
            self.evaluator_model = std::env::var("ASSIST_EVALUATOR_MODEL").ok();
        }
        if self.classification_threshold.is_none() {
            self.classification_threshold = std::env::var("ASSIST_CLASSIFICATION_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.quality_threshold.is_none() {
            self.quality_threshold = std::env::var("ASSIST_QUALITY_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok());
        }
        if self.known_entities.is_none() {
            self.known_entities = std::env::var("ASSIST_KNOWN_ENTITIES")
                .ok()
                .map(|v| parse_entity_list(&v));
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("ASSIST_PROMPT_DIR").ok().map(PathBuf::from);
        }
        if self.evaluate.is_none() {
            self.evaluate = std::env::var("ASSIST_EVALUATE")
                .ok()
                .and_then(|v| parse_bool(&v));
        }
        self
    }

    /// Sets the LLM provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the classifier model.
    #[must_use]
    pub fn classifier_model(mut self, model: impl Into<String>) -> Self {
        self.classifier_model = Some(model.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the synthesizer model.
    #[must_use]
    pub fn synthesizer_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer_model = Some(model.into());
        self
    }

    /// Sets the direct-answer model.
    #[must_use]
    pub fn completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = Some(model.into());
        self
    }

    /// Sets the current-information model.
    #[must_use]
    pub fn search_model(mut self, model: impl Into<String>) -> Self {
        self.search_model = Some(model.into());
        self
    }

    /// Sets the evaluator model.
    #[must_use]
    pub fn evaluator_model(mut self, model: impl Into<String>) -> Self {
        self.evaluator_model = Some(model.into());
        self
    }

    /// Sets the planner max tokens.
    #[must_use]
    pub const fn planner_max_tokens(mut self, n: u32) -> Self {
        self.planner_max_tokens = Some(n);
        self
    }

    /// Sets the synthesizer max tokens.
    #[must_use]
    pub const fn synthesizer_max_tokens(mut self, n: u32) -> Self {
        self.synthesizer_max_tokens = Some(n);
        self
    }

    /// Sets the completion timeout.
    #[must_use]
    pub const fn completion_timeout(mut self, duration: Duration) -> Self {
        self.completion_timeout = Some(duration);
        self
    }

    /// Sets the per-tool-call timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, duration: Duration) -> Self {
        self.tool_timeout = Some(duration);
        self
    }

    /// Sets the tool discovery timeout.
    #[must_use]
    pub const fn discovery_timeout(mut self, duration: Duration) -> Self {
        self.discovery_timeout = Some(duration);
        self
    }

    /// Sets the Tier-2 classification threshold.
    #[must_use]
    pub const fn classification_threshold(mut self, threshold: f32) -> Self {
        self.classification_threshold = Some(threshold);
        self
    }

    /// Sets the evaluation quality threshold.
    #[must_use]
    pub const fn quality_threshold(mut self, threshold: f32) -> Self {
        self.quality_threshold = Some(threshold);
        self
    }

    /// Sets the number of turns the context analyzer inspects.
    #[must_use]
    pub const fn context_window(mut self, turns: usize) -> Self {
        self.context_window = Some(turns);
        self
    }

    /// Sets the known proper nouns for search-query extraction.
    #[must_use]
    pub fn known_entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Enables or disables the asynchronous evaluation step.
    #[must_use]
    pub const fn evaluate(mut self, enabled: bool) -> Self {
        self.evaluate = Some(enabled);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set, or
    /// [`AgentError::Config`] if a threshold lies outside `[0, 1]`.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self.api_key.ok_or(AgentError::ApiKeyMissing)?;

        let classification_threshold = unit_interval(
            "classification_threshold",
            self.classification_threshold
                .unwrap_or(DEFAULT_CLASSIFICATION_THRESHOLD),
        )?;
        let quality_threshold = unit_interval(
            "quality_threshold",
            self.quality_threshold.unwrap_or(DEFAULT_QUALITY_THRESHOLD),
        )?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            classifier_model: self
                .classifier_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            planner_model: self
                .planner_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            synthesizer_model: self
                .synthesizer_model
                .unwrap_or_else(|| DEFAULT_ANSWER_MODEL.to_string()),
            completion_model: self
                .completion_model
                .unwrap_or_else(|| DEFAULT_ANSWER_MODEL.to_string()),
            search_model: self
                .search_model
                .unwrap_or_else(|| DEFAULT_SEARCH_MODEL.to_string()),
            evaluator_model: self
                .evaluator_model
                .unwrap_or_else(|| DEFAULT_FAST_MODEL.to_string()),
            classifier_max_tokens: self
                .classifier_max_tokens
                .unwrap_or(DEFAULT_CLASSIFIER_MAX_TOKENS),
            planner_max_tokens: self
                .planner_max_tokens
                .unwrap_or(DEFAULT_PLANNER_MAX_TOKENS),
            synthesizer_max_tokens: self
                .synthesizer_max_tokens
                .unwrap_or(DEFAULT_SYNTHESIZER_MAX_TOKENS),
            evaluator_max_tokens: self
                .evaluator_max_tokens
                .unwrap_or(DEFAULT_EVALUATOR_MAX_TOKENS),
            completion_timeout: self
                .completion_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS)),
            tool_timeout: self
                .tool_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS)),
            discovery_timeout: self
                .discovery_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS)),
            classification_threshold,
            quality_threshold,
            context_window: self.context_window.unwrap_or(DEFAULT_CONTEXT_WINDOW),
            known_entities: self.known_entities.unwrap_or_else(|| {
                DEFAULT_KNOWN_ENTITIES
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect()
            }),
            prompt_dir: self.prompt_dir,
            evaluate: self.evaluate.unwrap_or(true),
        })
    }
}

fn unit_interval(name: &str, value: f32) -> Result<f32, AgentError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AgentError::Config {
            message: format!("{name} must be within [0, 1], got {value}"),
        })
    }
}

fn parse_entity_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
