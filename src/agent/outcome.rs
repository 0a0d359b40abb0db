//! The uniform result of one routed request.

use std::time::Duration;

use serde::{Serialize, Serializer};

use super::classifier::Classification;
use super::executor::ToolExecutionRecord;

/// How a request was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Approach {
    /// Tools disabled by preferences; answered directly.
    UserDisabledTools,
    /// Answered from model knowledge.
    DirectCompletion,
    /// Answered by the search-capable model.
    CompletionWithSearch,
    /// Personal-data tools executed and synthesized.
    ToolExecution,
    /// Answered from data already in the conversation.
    ContextAnswer,
    /// Planner-driven tool run for an undecided request.
    PlanAndExecute,
    /// The request could not be processed.
    Error,
}

impl Approach {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserDisabledTools => "user_disabled_tools",
            Self::DirectCompletion => "direct_completion",
            Self::CompletionWithSearch => "completion_with_search",
            Self::ToolExecution => "tool_execution",
            Self::ContextAnswer => "context_answer",
            Self::PlanAndExecute => "plan_and_execute",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal failure absorbed on the way to the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Model classification failed; the request was deferred.
    ClassificationDegraded,
    /// Model planning failed; a keyword plan was used.
    PlanningFallback,
    /// A tool step failed.
    ToolExecutionFailure {
        /// The failing tool.
        tool: String,
    },
    /// No tool step produced data.
    NoUsableData,
    /// Model synthesis failed; raw data was returned.
    SynthesisFailure,
    /// The settings store failed; default preferences were used.
    PreferencesUnavailable,
    /// The answering model failed; a fixed notice was returned instead.
    AnswerUnavailable,
}

/// The uniform output of [`Orchestrator::process_user_request`](super::Orchestrator::process_user_request).
#[derive(Debug, Clone, Serialize)]
pub struct RequestResult {
    /// `false` only for rejected or unexpectedly failed requests.
    pub success: bool,
    /// The answer shown to the user.
    pub response: String,
    /// The branch that produced the answer.
    pub approach: Approach,
    /// The routing decision (absent when the request was rejected early).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Tools that were called, in order.
    pub tools_used: Vec<String>,
    /// Per-step execution records.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolExecutionRecord>,
    /// Failures absorbed on the way.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degradations: Vec<Degradation>,
    /// End-to-end latency.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl RequestResult {
    /// A failed result with a user-facing message.
    #[must_use]
    pub fn failure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            response: message.into(),
            approach: Approach::Error,
            classification: None,
            tools_used: Vec::new(),
            tool_results: Vec::new(),
            degradations: Vec::new(),
            elapsed,
        }
    }

    /// Returns `true` if `degradation` was recorded.
    #[must_use]
    pub fn degraded(&self, degradation: &Degradation) -> bool {
        self.degradations.contains(degradation)
    }
}

/// Serialises a [`Duration`] as whole milliseconds.
pub(crate) fn serialize_millis<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
