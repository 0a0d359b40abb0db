//! Direct and search-backed completions.

use std::time::Duration;

use async_trait::async_trait;

use super::config::AgentConfig;
use super::message::ChatMessage;
use super::provider::LlmProvider;
use super::traits::Agent;
use crate::error::AgentError;

/// Agent answering from model knowledge, optionally with a search-capable model.
pub struct AnswerAgent {
    name: &'static str,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl AnswerAgent {
    /// Answers with the completion model.
    #[must_use]
    pub fn direct(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            name: "direct",
            model: config.completion_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }

    /// Answers with the search model.
    #[must_use]
    pub fn search(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            name: "search",
            model: config.search_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }

    /// Answers `message` in the light of `history`.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, [`AgentError::Timeout`], or
    /// [`AgentError::ResponseParse`] for an empty answer.
    pub async fn answer(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String, AgentError> {
        let response = self.execute_with_history(provider, history, message).await?;
        let answer = response.content.trim();
        if answer.is_empty() {
            return Err(AgentError::ResponseParse {
                message: format!("{} completion returned no text", self.name),
                content: response.content,
            });
        }
        Ok(answer.to_string())
    }
}

#[async_trait]
impl Agent for AnswerAgent {
    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.3
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
