//! Response synthesis from tool results or conversation context.
//!
//! Synthesis never fails. With no successful tool results the fixed
//! [`NO_SUCCESSFUL_TOOLS_MESSAGE`] is returned without a model call; when
//! the model call fails, successful payloads are concatenated verbatim.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::executor::ToolExecutionRecord;
use super::message::ChatMessage;
use super::prompt::{PromptSet, build_context_prompt, build_synthesizer_prompt, truncate_chars};
use super::provider::LlmProvider;
use super::traits::{Agent, strip_code_fence};

/// Returned when no tool step produced data.
pub const NO_SUCCESSFUL_TOOLS_MESSAGE: &str = "I'm sorry, I couldn't retrieve any data for your request. None of the tools I tried returned results. Please try again in a moment or rephrase your question.";

/// Prefixed to answers built on data that is out of date for the question.
pub const STALE_DATA_CAVEAT: &str = "Note: the most recent data I found may be out of date for what you asked about, so please double-check before relying on it.";

/// Longest payload quoted per tool in the raw-data fallback.
const FALLBACK_PAYLOAD_CHARS: usize = 1500;

/// A synthesized answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Final answer text (caveat included when stale).
    pub answer: String,
    /// Model-reported confidence, if any.
    pub confidence: Option<f32>,
    /// Model-reported key points.
    pub key_points: Vec<String>,
    /// Whether the data was judged stale.
    pub stale: bool,
    /// Whether the deterministic fallback produced the answer.
    pub fallback: bool,
}

impl Synthesis {
    fn deterministic(answer: String) -> Self {
        Self {
            answer,
            confidence: None,
            key_points: Vec::new(),
            stale: false,
            fallback: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSynthesis {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    date_validation: Option<DateValidation>,
    #[serde(default)]
    is_stale: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct DateValidation {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    is_stale: Option<bool>,
}

impl RawSynthesis {
    fn stale(&self) -> bool {
        let flagged = self.date_validation.as_ref().is_some_and(|dv| {
            dv.is_stale == Some(true)
                || dv
                    .status
                    .as_deref()
                    .is_some_and(|s| s.trim().eq_ignore_ascii_case("stale"))
        });
        flagged || self.is_stale == Some(true)
    }
}

/// Agent that turns tool results into a JSON answer.
pub struct SynthesizerAgent {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl SynthesizerAgent {
    /// Creates a new synthesizer agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for SynthesizerAgent {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn json_mode(&self) -> bool {
        true
    }

    fn temperature(&self) -> f32 {
        0.1
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Agent that answers follow-ups from the conversation itself.
pub struct ContextAgent {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl ContextAgent {
    /// Creates a new context agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.synthesizer_model.clone(),
            max_tokens: config.synthesizer_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }
}

#[async_trait]
impl Agent for ContextAgent {
    fn name(&self) -> &'static str {
        "context"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        0.2
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Turns tool results or context into the final answer.
pub struct ResponseSynthesizer {
    tools: SynthesizerAgent,
    context: ContextAgent,
    history_turns: usize,
}

impl ResponseSynthesizer {
    /// Creates a synthesizer from configuration and the loaded prompts.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet) -> Self {
        Self {
            tools: SynthesizerAgent::new(config, prompts.synthesizer.clone()),
            context: ContextAgent::new(config, prompts.context.clone()),
            history_turns: config.context_window,
        }
    }

    fn recent<'a>(&self, history: &'a [ChatMessage]) -> &'a [ChatMessage] {
        &history[history.len().saturating_sub(self.history_turns)..]
    }

    /// Synthesizes an answer from the successful `records`.
    pub async fn synthesize(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
        records: &[ToolExecutionRecord],
        history: &[ChatMessage],
    ) -> Synthesis {
        let successful: Vec<&ToolExecutionRecord> = records.iter().filter(|r| r.success).collect();
        if successful.is_empty() {
            debug!(records = records.len(), "no successful tool results to synthesize");
            return Synthesis::deterministic(NO_SUCCESSFUL_TOOLS_MESSAGE.to_string());
        }

        let prompt = build_synthesizer_prompt(question, &successful);
        let response = match self
            .tools
            .execute_with_history(provider, self.recent(history), &prompt)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "synthesis failed; returning raw tool data");
                return Synthesis::deterministic(fallback_answer(&successful));
            }
        };

        let content = response.content.trim();
        match serde_json::from_str::<RawSynthesis>(strip_code_fence(content)) {
            Ok(raw) if !raw.answer.trim().is_empty() => {
                let stale = raw.stale();
                let answer = if stale {
                    format!("{STALE_DATA_CAVEAT}\n\n{}", raw.answer.trim())
                } else {
                    raw.answer.trim().to_string()
                };
                Synthesis {
                    answer,
                    confidence: raw.confidence.map(|c| c.clamp(0.0, 1.0)),
                    key_points: raw.key_points,
                    stale,
                    fallback: false,
                }
            }
            _ if !content.is_empty() && !content.starts_with('{') => Synthesis {
                answer: content.to_string(),
                confidence: None,
                key_points: Vec::new(),
                stale: false,
                fallback: false,
            },
            _ => {
                warn!("synthesis returned no usable answer; returning raw tool data");
                Synthesis::deterministic(fallback_answer(&successful))
            }
        }
    }

    /// Answers from the conversation and its context summary.
    pub async fn synthesize_from_context(
        &self,
        provider: &dyn LlmProvider,
        question: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Synthesis {
        let prompt = build_context_prompt(question, context);
        match self
            .context
            .execute_with_history(provider, self.recent(history), &prompt)
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => Synthesis {
                answer: response.content.trim().to_string(),
                confidence: None,
                key_points: Vec::new(),
                stale: false,
                fallback: false,
            },
            Ok(_) => {
                warn!("context answer was empty; quoting context");
                Synthesis::deterministic(context_fallback(context))
            }
            Err(e) => {
                warn!(error = %e, "context answer failed; quoting context");
                Synthesis::deterministic(context_fallback(context))
            }
        }
    }
}

/// Concatenates successful payloads, labelled by tool.
#[must_use]
pub fn fallback_answer(successful: &[&ToolExecutionRecord]) -> String {
    let mut answer = String::from("Here is the data I found:\n");
    for record in successful {
        let _ = write!(
            answer,
            "\n**{}**\n{}\n",
            record.tool,
            truncate_chars(record.result_text().trim(), FALLBACK_PAYLOAD_CHARS)
        );
    }
    answer
}

fn context_fallback(context: &str) -> String {
    format!("Here is what our conversation already shows:\n\n{context}")
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::error::AgentError;

    struct ScriptedProvider {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .map(|content| ChatResponse {
                    content,
                    usage: TokenUsage::default(),
                    finish_reason: None,
                })
                .ok_or(AgentError::Timeout {
                    operation: "synthesizer completion".to_string(),
                    seconds: 60,
                })
        }
    }

    fn synthesizer() -> ResponseSynthesizer {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        ResponseSynthesizer::new(&config, &PromptSet::defaults())
    }

    fn record(tool: &str, success: bool, payload: &str) -> ToolExecutionRecord {
        ToolExecutionRecord {
            tool: tool.to_string(),
            params_used: serde_json::json!({}),
            success,
            result: Some(serde_json::json!(payload)),
            error: (!success).then(|| "failed".to_string()),
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_all_failed_skips_model() {
        let provider = ScriptedProvider::new(Some(r#"{"answer": "should not be used"}"#));
        let synthesis = synthesizer()
            .synthesize(
                &provider,
                "any news?",
                &[record("gmail_search", false, ""), record("drive_search", false, "")],
                &[],
            )
            .await;
        assert_eq!(synthesis.answer, NO_SUCCESSFUL_TOOLS_MESSAGE);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stale_answer_gets_caveat() {
        let provider = ScriptedProvider::new(Some(
            r#"{"answer": "The latest match report is from March.", "confidence": 0.7, "key_points": ["March report"], "date_validation": {"status": "stale", "note": "old"}}"#,
        ));
        let synthesis = synthesizer()
            .synthesize(
                &provider,
                "latest Jubilo match report?",
                &[record("gmail_search", true, "Subject: Match report (March)")],
                &[],
            )
            .await;
        assert!(synthesis.stale);
        assert!(synthesis.answer.starts_with(STALE_DATA_CAVEAT));
        assert!(synthesis.answer.ends_with("The latest match report is from March."));
        assert_eq!(synthesis.key_points, vec!["March report".to_string()]);
    }

    #[tokio::test]
    async fn test_model_failure_returns_labelled_payloads() {
        let provider = ScriptedProvider::new(None);
        let synthesis = synthesizer()
            .synthesize(
                &provider,
                "deadline?",
                &[
                    record("gmail_search", true, "Subject: Deadline moved to Friday"),
                    record("drive_search", false, "secret error text"),
                ],
                &[],
            )
            .await;
        assert!(synthesis.fallback);
        assert!(synthesis.answer.contains("**gmail_search**"));
        assert!(synthesis.answer.contains("Deadline moved to Friday"));
        assert!(!synthesis.answer.contains("drive_search"));
    }

    #[tokio::test]
    async fn test_plain_text_reply_is_used_as_answer() {
        let provider = ScriptedProvider::new(Some("You have one email about the deadline."));
        let synthesis = synthesizer()
            .synthesize(&provider, "deadline?", &[record("gmail_search", true, "x")], &[])
            .await;
        assert!(!synthesis.fallback);
        assert_eq!(synthesis.answer, "You have one email about the deadline.");
    }

    #[tokio::test]
    async fn test_context_failure_quotes_context() {
        let provider = ScriptedProvider::new(None);
        let synthesis = synthesizer()
            .synthesize_from_context(&provider, "what about Jubilo?", "[email data]\n[reference] Jubilo", &[])
            .await;
        assert!(synthesis.fallback);
        assert!(synthesis.answer.contains("[reference] Jubilo"));
    }
}
