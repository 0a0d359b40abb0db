//! Agent trait definition.
//!
//! All LLM-backed roles (classifier, planner, synthesizer, answerer,
//! evaluator) implement this trait, which provides a uniform, time-bounded
//! way for the router to call the completion capability.

use std::time::Duration;

use async_trait::async_trait;

use super::message::{ChatMessage, ChatRequest, ChatResponse, system_message, user_message};
use super::provider::LlmProvider;
use crate::error::AgentError;

/// Default bound on a single completion call.
const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// The agent's text output.
    pub content: String,
    /// Token usage for this call.
    pub usage: super::message::TokenUsage,
    /// Why the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Trait implemented by all agents in the system.
///
/// Agents encapsulate a specific role (classification, planning,
/// synthesis, evaluation) with a fixed system prompt and model
/// configuration. The router calls [`Agent::execute`] or
/// [`Agent::execute_with_history`] to run the agent against a provider.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Whether to request JSON-formatted output.
    fn json_mode(&self) -> bool {
        false
    }

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        1024
    }

    /// Upper bound on a single completion call.
    fn timeout(&self) -> Duration {
        DEFAULT_COMPLETION_TIMEOUT
    }

    /// Executes the agent with the given user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] when the provider does not answer
    /// within [`Agent::timeout`], or the provider's own error.
    async fn execute(
        &self,
        provider: &dyn LlmProvider,
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        self.execute_with_history(provider, &[], user_msg).await
    }

    /// Executes the agent with prior conversation turns placed between the
    /// system prompt and the user message.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Timeout`] when the provider does not answer
    /// within [`Agent::timeout`], or the provider's own error.
    async fn execute_with_history(
        &self,
        provider: &dyn LlmProvider,
        history: &[ChatMessage],
        user_msg: &str,
    ) -> Result<AgentResponse, AgentError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system_message(self.system_prompt()));
        messages.extend(history.iter().cloned());
        messages.push(user_message(user_msg));

        let request = ChatRequest {
            model: self.model().to_string(),
            messages,
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            json_mode: self.json_mode(),
        };

        let limit = self.timeout();
        let response: ChatResponse = tokio::time::timeout(limit, provider.chat(&request))
            .await
            .map_err(|_| AgentError::Timeout {
                operation: format!("{} completion", self.name()),
                seconds: limit.as_secs(),
            })??;

        Ok(AgentResponse {
            content: response.content,
            usage: response.usage,
            finish_reason: response.finish_reason,
        })
    }
}

/// Strips a surrounding markdown code fence from a model response.
///
/// Structured-output agents share this so a fenced JSON answer parses the
/// same as a bare one.
#[must_use]
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    }
}
