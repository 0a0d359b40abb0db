//! Error types for assist-router.
//!
//! [`AgentError`] covers every failure the orchestration engine can observe
//! at a capability boundary (completion calls, tool calls, settings and
//! analytics stores). Most of them are absorbed by the router and turned
//! into a recorded degradation; only unexpected ones reach the caller as a
//! failed request result.
//!
//! [`CommandError`] is the CLI layer's error type.

use thiserror::Error;

/// Errors raised by agents, capabilities, and the router.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No API key was configured for the completion provider.
    #[error("API key missing: set OPENAI_API_KEY or ASSIST_API_KEY")]
    ApiKeyMissing,

    /// The configured completion provider is not known.
    #[error("unsupported provider: {name} (available: {})", crate::agent::client::AVAILABLE_PROVIDERS.join(", "))]
    UnsupportedProvider {
        /// Provider name from configuration.
        name: String,
    },

    /// A completion request failed at the provider.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status code, when known.
        status: Option<u16>,
    },

    /// A completion, tool, or discovery call exceeded its time budget.
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        /// The operation that timed out (e.g. `"classifier completion"`).
        operation: String,
        /// Timeout budget in seconds.
        seconds: u64,
    },

    /// A model response could not be parsed into the expected structure.
    #[error("response parse error: {message}")]
    ResponseParse {
        /// Parse failure description.
        message: String,
        /// Raw response content.
        content: String,
    },

    /// A tool invocation failed.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// The tool provider could not enumerate its tools.
    #[error("tool discovery failed: {message}")]
    ToolDiscovery {
        /// Failure description.
        message: String,
    },

    /// The settings store could not supply user preferences.
    #[error("settings unavailable: {message}")]
    Settings {
        /// Failure description.
        message: String,
    },

    /// The analytics sink rejected an event.
    #[error("analytics sink error: {message}")]
    Analytics {
        /// Failure description.
        message: String,
    },

    /// The router could not complete a request.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// Failure description.
        message: String,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config {
        /// Failure description.
        message: String,
    },

    /// Filesystem error while loading fixtures or prompts.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Command failed while executing.
    #[error("{0}")]
    ExecutionFailed(String),

    /// An input file could not be read or parsed.
    #[error("invalid input '{path}': {message}")]
    InvalidInput {
        /// Path of the offending file.
        path: String,
        /// Failure description.
        message: String,
    },

    /// Error bubbled up from the orchestration engine.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Result alias for CLI commands.
pub type Result<T> = std::result::Result<T, CommandError>;
