//! Asynchronous outcome evaluation and analytics logging.
//!
//! Runs after the result has been handed back. Every failure is logged
//! and swallowed; nothing here can affect the primary response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::classifier::Classification;
use super::config::AgentConfig;
use super::outcome::serialize_millis;
use super::prompt::{PromptSet, build_evaluation_prompt, build_improvement_prompt};
use super::provider::LlmProvider;
use super::traits::{Agent, strip_code_fence};
use crate::error::AgentError;

/// Tracing target of [`TracingAnalyticsSink`] events.
pub const ANALYTICS_TARGET: &str = "assist_router::analytics";

/// What the evaluator sees of one answered request.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    /// The user's message.
    pub question: String,
    /// The answer that was returned.
    pub response: String,
    /// Approach name (e.g. `"tool_execution"`).
    pub approach: String,
    /// Tools that were called.
    pub tools_used: Vec<String>,
    /// End-to-end latency of the request.
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    /// The routing decision.
    pub classification: Classification,
}

/// The evaluator's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Score in `[0, 1]`.
    pub quality_score: f32,
    /// Why the score was given.
    #[serde(default)]
    pub reasoning: String,
}

/// The improvement advisor's suggestion for a low-quality answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSuggestion {
    /// Approach that should have been taken.
    #[serde(default)]
    pub better_approach: Option<String>,
    /// Tools that should have been used.
    #[serde(default)]
    pub suggested_tools: Vec<String>,
    /// Free-form advice.
    #[serde(default)]
    pub suggestion: String,
}

/// Write-only analytics store.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    /// Records how well an approach worked.
    async fn log_approach_effectiveness(
        &self,
        user_id: &str,
        approach: &str,
        quality_score: f32,
        latency: Duration,
    ) -> Result<(), AgentError>;

    /// Records which tools were used and how the answer scored.
    async fn log_tool_usage(
        &self,
        user_id: &str,
        tools_used: &[String],
        quality_score: f32,
    ) -> Result<(), AgentError>;

    /// Records the classification next to the achieved quality.
    async fn log_classification_result(
        &self,
        user_id: &str,
        classification: &Classification,
        quality_score: f32,
    ) -> Result<(), AgentError>;

    /// Records a suggested better approach for a low-quality answer.
    async fn log_improvement_suggestion(
        &self,
        user_id: &str,
        record: &EvaluationRecord,
        suggestion: &ImprovementSuggestion,
    ) -> Result<(), AgentError>;
}

/// Analytics sink writing structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn log_approach_effectiveness(
        &self,
        user_id: &str,
        approach: &str,
        quality_score: f32,
        latency: Duration,
    ) -> Result<(), AgentError> {
        info!(
            target: ANALYTICS_TARGET,
            event = "approach_effectiveness",
            user_id,
            approach,
            quality_score,
            latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        );
        Ok(())
    }

    async fn log_tool_usage(
        &self,
        user_id: &str,
        tools_used: &[String],
        quality_score: f32,
    ) -> Result<(), AgentError> {
        info!(
            target: ANALYTICS_TARGET,
            event = "tool_usage",
            user_id,
            tools = %tools_used.join(","),
            tool_count = tools_used.len(),
            quality_score,
        );
        Ok(())
    }

    async fn log_classification_result(
        &self,
        user_id: &str,
        classification: &Classification,
        quality_score: f32,
    ) -> Result<(), AgentError> {
        info!(
            target: ANALYTICS_TARGET,
            event = "classification_result",
            user_id,
            category = %classification.category(),
            confidence = classification.confidence(),
            tier = classification.tier_used().as_str(),
            quality_score,
        );
        Ok(())
    }

    async fn log_improvement_suggestion(
        &self,
        user_id: &str,
        record: &EvaluationRecord,
        suggestion: &ImprovementSuggestion,
    ) -> Result<(), AgentError> {
        info!(
            target: ANALYTICS_TARGET,
            event = "improvement_suggestion",
            user_id,
            approach = %record.approach,
            better_approach = suggestion.better_approach.as_deref().unwrap_or("unspecified"),
            suggested_tools = %suggestion.suggested_tools.join(","),
            suggestion = %suggestion.suggestion,
        );
        Ok(())
    }
}

/// Agent that scores an answer with one JSON completion.
pub struct EvaluatorAgent {
    name: &'static str,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl EvaluatorAgent {
    /// Creates the quality evaluator.
    #[must_use]
    pub fn scorer(config: &AgentConfig, system_prompt: String) -> Self {
        Self::with_name("evaluator", config, system_prompt)
    }

    /// Creates the improvement advisor.
    #[must_use]
    pub fn advisor(config: &AgentConfig, system_prompt: String) -> Self {
        Self::with_name("improvement", config, system_prompt)
    }

    fn with_name(name: &'static str, config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            name,
            model: config.evaluator_model.clone(),
            max_tokens: config.evaluator_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }

    async fn execute_json<T: for<'de> Deserialize<'de>>(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
    ) -> Result<T, AgentError> {
        let response = self.execute(provider, prompt).await?;
        serde_json::from_str(strip_code_fence(&response.content)).map_err(|e| {
            AgentError::ResponseParse {
                message: format!("Failed to parse {} response: {e}", self.name),
                content: response.content.clone(),
            }
        })
    }
}

#[async_trait]
impl Agent for EvaluatorAgent {
    fn name(&self) -> &'static str {
        self.name
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

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Scores answers and feeds the analytics sink.
pub struct EvaluationLearner {
    scorer: EvaluatorAgent,
    advisor: EvaluatorAgent,
    sink: Arc<dyn AnalyticsSink>,
    quality_threshold: f32,
}

impl EvaluationLearner {
    /// Creates a learner writing to `sink`.
    #[must_use]
    pub fn new(config: &AgentConfig, prompts: &PromptSet, sink: Arc<dyn AnalyticsSink>) -> Self {
        Self {
            scorer: EvaluatorAgent::scorer(config, prompts.evaluator.clone()),
            advisor: EvaluatorAgent::advisor(config, prompts.improvement.clone()),
            sink,
            quality_threshold: config.quality_threshold,
        }
    }

    /// Scores `record`, logs the outcome, and below the quality threshold
    /// asks for and logs an improvement suggestion.
    ///
    /// Never fails; returns the assessment when scoring succeeded.
    pub async fn evaluate_and_learn(
        &self,
        provider: &dyn LlmProvider,
        record: &EvaluationRecord,
        user_id: &str,
    ) -> Option<QualityAssessment> {
        let mut assessment: QualityAssessment = match self
            .scorer
            .execute_json(provider, &build_evaluation_prompt(record))
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(user_id, error = %e, "evaluation failed");
                return None;
            }
        };
        assessment.quality_score = if assessment.quality_score.is_nan() {
            0.0
        } else {
            assessment.quality_score.clamp(0.0, 1.0)
        };
        let score = assessment.quality_score;
        debug!(user_id, approach = %record.approach, quality_score = score, "response evaluated");

        let logged = [
            self.sink
                .log_approach_effectiveness(user_id, &record.approach, score, record.latency)
                .await,
            self.sink
                .log_tool_usage(user_id, &record.tools_used, score)
                .await,
            self.sink
                .log_classification_result(user_id, &record.classification, score)
                .await,
        ];
        for result in logged {
            if let Err(e) = result {
                warn!(user_id, error = %e, "analytics write failed");
            }
        }

        if score < self.quality_threshold {
            self.suggest_improvement(provider, record, &assessment, user_id)
                .await;
        }
        Some(assessment)
    }

    async fn suggest_improvement(
        &self,
        provider: &dyn LlmProvider,
        record: &EvaluationRecord,
        assessment: &QualityAssessment,
        user_id: &str,
    ) {
        let prompt =
            build_improvement_prompt(record, assessment.quality_score, &assessment.reasoning);
        let suggestion: ImprovementSuggestion = match self.advisor.execute_json(provider, &prompt).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!(user_id, error = %e, "improvement suggestion failed");
                return;
            }
        };
        if let Err(e) = self
            .sink
            .log_improvement_suggestion(user_id, record, &suggestion)
            .await
        {
            warn!(user_id, error = %e, "analytics write failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::agent::classifier::ClassifierTier;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::core::RequestCategory;

    /// Replies with queued contents; an empty queue is a provider error.
    struct QueuedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl QueuedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|s| (*s).to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for QueuedProvider {
        fn name(&self) -> &'static str {
            "queued"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
            next.map(|content| ChatResponse {
                content,
                usage: TokenUsage::default(),
                finish_reason: None,
            })
            .ok_or_else(|| AgentError::ApiRequest {
                message: "exhausted".to_string(),
                status: Some(500),
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn push(&self, event: &str) -> Result<(), AgentError> {
            if let Ok(mut events) = self.events.lock() {
                events.push(event.to_string());
            }
            if self.fail {
                return Err(AgentError::Analytics {
                    message: "sink offline".to_string(),
                });
            }
            Ok(())
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl AnalyticsSink for RecordingSink {
        async fn log_approach_effectiveness(
            &self,
            _user_id: &str,
            approach: &str,
            _quality_score: f32,
            _latency: Duration,
        ) -> Result<(), AgentError> {
            self.push(&format!("approach:{approach}"))
        }

        async fn log_tool_usage(
            &self,
            _user_id: &str,
            tools_used: &[String],
            _quality_score: f32,
        ) -> Result<(), AgentError> {
            self.push(&format!("tools:{}", tools_used.join(",")))
        }

        async fn log_classification_result(
            &self,
            _user_id: &str,
            classification: &Classification,
            _quality_score: f32,
        ) -> Result<(), AgentError> {
            self.push(&format!("classification:{}", classification.category()))
        }

        async fn log_improvement_suggestion(
            &self,
            _user_id: &str,
            _record: &EvaluationRecord,
            suggestion: &ImprovementSuggestion,
        ) -> Result<(), AgentError> {
            self.push(&format!(
                "improvement:{}",
                suggestion.better_approach.as_deref().unwrap_or("")
            ))
        }
    }

    fn record() -> EvaluationRecord {
        EvaluationRecord {
            question: "find emails about project deadline".to_string(),
            response: "Nothing found.".to_string(),
            approach: "tool_execution".to_string(),
            tools_used: vec!["gmail_search".to_string()],
            latency: Duration::from_millis(900),
            classification: Classification::new(
                RequestCategory::PersonalData,
                0.9,
                ClassifierTier::Heuristic,
                "mail",
                vec!["gmail_search".to_string()],
            ),
        }
    }

    fn learner(sink: Arc<RecordingSink>) -> EvaluationLearner {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        EvaluationLearner::new(&config, &PromptSet::defaults(), sink)
    }

    #[tokio::test]
    async fn test_good_answer_logs_without_improvement() {
        let sink = Arc::new(RecordingSink::default());
        let provider = QueuedProvider::new(&[r#"{"quality_score": 0.9, "reasoning": "complete"}"#]);
        let assessment = learner(Arc::clone(&sink))
            .evaluate_and_learn(&provider, &record(), "u1")
            .await;
        assert!(assessment.is_some_and(|a| (a.quality_score - 0.9).abs() < f32::EPSILON));
        assert_eq!(
            sink.events(),
            vec![
                "approach:tool_execution",
                "tools:gmail_search",
                "classification:PERSONAL_DATA",
            ]
        );
    }

    #[tokio::test]
    async fn test_low_score_requests_improvement() {
        let sink = Arc::new(RecordingSink::default());
        let provider = QueuedProvider::new(&[
            r#"{"quality_score": 0.2, "reasoning": "no data"}"#,
            r#"```json
{"better_approach": "plan_and_execute", "suggested_tools": ["gmail_search"], "suggestion": "search by sender"}
```"#,
        ]);
        learner(Arc::clone(&sink))
            .evaluate_and_learn(&provider, &record(), "u1")
            .await;
        assert_eq!(
            sink.events().last().map(String::as_str),
            Some("improvement:plan_and_execute")
        );
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
            fail: true,
        });
        let provider = QueuedProvider::new(&[r#"{"quality_score": 0.1}"#]);
        let assessment = learner(Arc::clone(&sink))
            .evaluate_and_learn(&provider, &record(), "u1")
            .await;
        assert!(assessment.is_some());
        assert_eq!(sink.events().len(), 3);

        let silent = QueuedProvider::new(&[]);
        let none = learner(Arc::clone(&sink))
            .evaluate_and_learn(&silent, &record(), "u1")
            .await;
        assert!(none.is_none());
    }
}
