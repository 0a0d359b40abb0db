//! Per-turn router.
//!
//! Coordinates the full request pipeline: preferences → tool discovery →
//! classification → (direct answer | search answer | context answer |
//! plan → filter → execute → synthesize) → spawned evaluation.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::answer::AnswerAgent;
use super::classifier::{Classification, ClassifierTier, RequestClassifier};
use super::config::AgentConfig;
use super::context::{ContextAnalyzer, NO_RECENT_DATA_CONTEXT};
use super::evaluation::{
    AnalyticsSink, EvaluationLearner, EvaluationRecord, QualityAssessment, TracingAnalyticsSink,
};
use super::executor::{ToolExecutionEngine, ToolExecutionRecord};
use super::message::{ChatMessage, user_message};
use super::outcome::{Approach, Degradation, RequestResult};
use super::planner::{PlanSource, ToolPlan, ToolPlanner};
use super::preferences::{PreferenceFilter, SettingsStore, StaticSettings, UserToolPreferences};
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::synthesizer::ResponseSynthesizer;
use super::tool::{ToolProvider, ToolRegistry};
use crate::core::{RequestCategory, extract_search_query};
use crate::error::AgentError;

/// Longest accepted user message, in bytes.
pub const MAX_MESSAGE_LEN: usize = 10_000;

/// Shown when a request fails for an unexpected reason.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while handling your request. Please try again.";

/// Answer for users with tools turned off when the model cannot be reached.
pub const TOOLS_DISABLED_NOTICE: &str = "Tool use is turned off in your settings, and I couldn't \
     reach the answering model just now. Please try again shortly.";

/// State of one request as it moves through the pipeline.
struct RequestContext<'a> {
    message: &'a str,
    history: &'a [ChatMessage],
    user_id: &'a str,
    started: Instant,
    preferences: UserToolPreferences,
    registry: ToolRegistry,
    classification: Option<Classification>,
    degradations: Vec<Degradation>,
}

impl<'a> RequestContext<'a> {
    fn new(message: &'a str, history: &'a [ChatMessage], user_id: &'a str, started: Instant) -> Self {
        Self {
            message,
            history,
            user_id,
            started,
            preferences: UserToolPreferences::default(),
            registry: ToolRegistry::default(),
            classification: None,
            degradations: Vec::new(),
        }
    }

    fn degrade(&mut self, degradation: Degradation) {
        debug!(user_id = self.user_id, ?degradation, "request degraded");
        if !self.degradations.contains(&degradation) {
            self.degradations.push(degradation);
        }
    }

    fn deferred(&self) -> bool {
        self.classification
            .as_ref()
            .is_some_and(|c| c.tier_used() == ClassifierTier::Deferred)
    }

    /// The conversation including the current user turn.
    fn turns(&self) -> Vec<ChatMessage> {
        let mut turns = self.history.to_vec();
        turns.push(user_message(self.message));
        turns
    }

    fn finish(
        &mut self,
        approach: Approach,
        response: String,
        tool_results: Vec<ToolExecutionRecord>,
    ) -> RequestResult {
        let tools_used = tool_results
            .iter()
            .filter(|record| self.registry.contains(&record.tool))
            .map(|record| record.tool.clone())
            .collect();
        RequestResult {
            success: true,
            response,
            approach,
            classification: self.classification.clone(),
            tools_used,
            tool_results,
            degradations: std::mem::take(&mut self.degradations),
            elapsed: self.started.elapsed(),
        }
    }

    fn fail(&mut self) -> RequestResult {
        RequestResult {
            classification: self.classification.take(),
            degradations: std::mem::take(&mut self.degradations),
            ..RequestResult::failure(GENERIC_FAILURE_MESSAGE, self.started.elapsed())
        }
    }
}

/// Routes each user turn to the cheapest adequate way of answering it.
///
/// Holds no per-user state; one instance can serve concurrent requests
/// behind an [`Arc`].
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    config: AgentConfig,
    prompts: PromptSet,
    settings: Arc<dyn SettingsStore>,
    classifier: RequestClassifier,
    planner: ToolPlanner,
    engine: ToolExecutionEngine,
    synthesizer: ResponseSynthesizer,
    direct: AnswerAgent,
    search: AnswerAgent,
    analyzer: ContextAnalyzer,
    learner: Arc<EvaluationLearner>,
}

impl Orchestrator {
    /// Creates a new orchestrator with the given provider and configuration.
    ///
    /// Loads prompt templates from the directory specified in
    /// [`AgentConfig::prompt_dir`], falling back to compiled-in defaults.
    /// Every user gets default preferences and analytics go to
    /// [`TracingAnalyticsSink`] until replaced.
    pub fn new(provider: Arc<dyn LlmProvider>, config: AgentConfig) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        Self {
            classifier: RequestClassifier::new(&config, prompts.classifier.clone()),
            planner: ToolPlanner::new(&config, prompts.planner.clone()),
            engine: ToolExecutionEngine::new(config.tool_timeout),
            synthesizer: ResponseSynthesizer::new(&config, &prompts),
            direct: AnswerAgent::direct(&config, prompts.direct.clone()),
            search: AnswerAgent::search(&config, prompts.search.clone()),
            analyzer: ContextAnalyzer::new(config.context_window, config.known_entities.clone()),
            learner: Arc::new(EvaluationLearner::new(
                &config,
                &prompts,
                Arc::new(TracingAnalyticsSink),
            )),
            settings: Arc::new(StaticSettings::default()),
            provider,
            config,
            prompts,
        }
    }

    /// Replaces the settings store consulted for user preferences.
    #[must_use]
    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the analytics sink fed by evaluation.
    #[must_use]
    pub fn with_analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.learner = Arc::new(EvaluationLearner::new(&self.config, &self.prompts, sink));
        self
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answers one user turn.
    ///
    /// `history` holds the turns before `message`, oldest first. Never
    /// fails: rejected input and unexpected errors come back as a result
    /// with `success == false`. When evaluation is enabled and a Tokio
    /// runtime is running, the outcome is scored on a spawned task after
    /// the result is built.
    pub async fn process_user_request(
        &self,
        message: &str,
        history: &[ChatMessage],
        user_id: &str,
        tool_provider: &dyn ToolProvider,
    ) -> RequestResult {
        let started = Instant::now();
        if let Err(e) = validate_message(message) {
            warn!(user_id, error = %e, "request rejected");
            return RequestResult::failure(e.to_string(), started.elapsed());
        }

        let mut ctx = RequestContext::new(message, history, user_id, started);
        ctx.preferences = self.load_preferences(&mut ctx).await;

        let result = match self.route(&mut ctx, tool_provider).await {
            Ok(result) => result,
            Err(e) => {
                error!(user_id, error = %e, "request failed");
                ctx.fail()
            }
        };

        info!(
            user_id,
            success = result.success,
            approach = %result.approach,
            tools = result.tools_used.len(),
            degradations = result.degradations.len(),
            elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX),
            "request complete"
        );
        self.spawn_evaluation(&result, message, user_id);
        result
    }

    async fn load_preferences(&self, ctx: &mut RequestContext<'_>) -> UserToolPreferences {
        match self.settings.get_user_tool_preferences(ctx.user_id).await {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "using default tool preferences");
                ctx.degrade(Degradation::PreferencesUnavailable);
                UserToolPreferences::default()
            }
        }
    }

    async fn route(
        &self,
        ctx: &mut RequestContext<'_>,
        tools: &dyn ToolProvider,
    ) -> Result<RequestResult, AgentError> {
        let provider = self.provider.as_ref();

        if !ctx.preferences.auto_tool_usage {
            ctx.classification = Some(
                self.classifier
                    .classify(provider, ctx.message, ctx.history, &ctx.preferences, &ctx.registry)
                    .await,
            );
            let answer = match self.direct.answer(provider, ctx.message, ctx.history).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(user_id = ctx.user_id, error = %e, "direct answer failed with tools disabled");
                    ctx.degrade(Degradation::AnswerUnavailable);
                    TOOLS_DISABLED_NOTICE.to_string()
                }
            };
            return Ok(ctx.finish(Approach::UserDisabledTools, answer, Vec::new()));
        }

        ctx.registry = ToolRegistry::discover(tools, self.config.discovery_timeout).await;
        let classification = self
            .classifier
            .classify(provider, ctx.message, ctx.history, &ctx.preferences, &ctx.registry)
            .await;
        if classification.tier_used() == ClassifierTier::Deferred {
            ctx.degrade(Degradation::ClassificationDegraded);
        }
        info!(
            user_id = ctx.user_id,
            category = %classification.category(),
            confidence = classification.confidence(),
            tier = classification.tier_used().as_str(),
            tools = ctx.registry.len(),
            "request classified"
        );
        let category = classification.category();
        let suggested = classification.suggested_tools().to_vec();
        ctx.classification = Some(classification);

        match category {
            RequestCategory::GeneralKnowledge | RequestCategory::UserDisabled => {
                self.answer_directly(ctx).await
            }
            RequestCategory::CurrentInfo => self.answer_with_search(ctx).await,
            RequestCategory::PersonalData => {
                let allowed = PreferenceFilter::filter(&suggested, &ctx.preferences, &ctx.registry);
                let mut plan = self
                    .planner
                    .plan_within(provider, ctx.message, ctx.history, &ctx.registry, &allowed)
                    .await;
                let query = extract_search_query(ctx.message, &self.config.known_entities);
                if !query.is_empty() && plan.pin_search_query(&query) {
                    debug!(user_id = ctx.user_id, query = %query, "pinned extracted search query");
                }
                self.run_plan(ctx, plan, Approach::ToolExecution, tools).await
            }
            RequestCategory::ContextDependent => self.answer_from_context(ctx, tools).await,
            RequestCategory::Ambiguous => {
                let plan = self
                    .planner
                    .plan(provider, ctx.message, ctx.history, &ctx.registry)
                    .await;
                self.run_plan(ctx, plan, Approach::PlanAndExecute, tools).await
            }
        }
    }

    async fn answer_directly(
        &self,
        ctx: &mut RequestContext<'_>,
    ) -> Result<RequestResult, AgentError> {
        let answer = self
            .direct
            .answer(self.provider.as_ref(), ctx.message, ctx.history)
            .await?;
        Ok(ctx.finish(Approach::DirectCompletion, answer, Vec::new()))
    }

    async fn answer_with_search(
        &self,
        ctx: &mut RequestContext<'_>,
    ) -> Result<RequestResult, AgentError> {
        match self
            .search
            .answer(self.provider.as_ref(), ctx.message, ctx.history)
            .await
        {
            Ok(answer) => Ok(ctx.finish(Approach::CompletionWithSearch, answer, Vec::new())),
            Err(e) => {
                warn!(user_id = ctx.user_id, error = %e, "search answer failed; answering directly");
                self.answer_directly(ctx).await
            }
        }
    }

    async fn answer_from_context(
        &self,
        ctx: &mut RequestContext<'_>,
        tools: &dyn ToolProvider,
    ) -> Result<RequestResult, AgentError> {
        let context = self.analyzer.analyze(&ctx.turns());
        if context == NO_RECENT_DATA_CONTEXT {
            debug!(user_id = ctx.user_id, "no reusable context; planning tools");
            let plan = self
                .planner
                .plan(self.provider.as_ref(), ctx.message, ctx.history, &ctx.registry)
                .await;
            return self.run_plan(ctx, plan, Approach::PlanAndExecute, tools).await;
        }

        let synthesis = self
            .synthesizer
            .synthesize_from_context(self.provider.as_ref(), ctx.message, &context, ctx.history)
            .await;
        if synthesis.fallback {
            ctx.degrade(Degradation::SynthesisFailure);
        }
        Ok(ctx.finish(Approach::ContextAnswer, synthesis.answer, Vec::new()))
    }

    async fn run_plan(
        &self,
        ctx: &mut RequestContext<'_>,
        plan: ToolPlan,
        approach: Approach,
        tools: &dyn ToolProvider,
    ) -> Result<RequestResult, AgentError> {
        let fell_back = plan.source == PlanSource::Fallback;
        if fell_back && !ctx.registry.is_empty() {
            ctx.degrade(Degradation::PlanningFallback);
        }

        if fell_back && ctx.deferred() {
            info!(
                user_id = ctx.user_id,
                "classification and planning both failed; answering without tools"
            );
            ctx.classification = ctx.classification.as_ref().map(|c| {
                c.recategorized(
                    RequestCategory::GeneralKnowledge,
                    "classification and planning unavailable; answering from model knowledge",
                )
            });
            return self.answer_directly(ctx).await;
        }

        let plan = PreferenceFilter::filter_plan(plan, &ctx.preferences, &ctx.registry);
        if !plan.has_steps() {
            debug!(user_id = ctx.user_id, reasoning = %plan.reasoning, "plan needs no tools");
            return self.answer_directly(ctx).await;
        }

        let records = self
            .engine
            .execute(&plan.tool_sequence, ctx.user_id, tools, &ctx.registry)
            .await;
        for record in records.iter().filter(|r| !r.success) {
            ctx.degrade(Degradation::ToolExecutionFailure {
                tool: record.tool.clone(),
            });
        }
        let any_success = records.iter().any(|r| r.success);
        if !any_success {
            ctx.degrade(Degradation::NoUsableData);
        }

        let synthesis = self
            .synthesizer
            .synthesize(self.provider.as_ref(), ctx.message, &records, ctx.history)
            .await;
        if synthesis.fallback && any_success {
            ctx.degrade(Degradation::SynthesisFailure);
        }
        Ok(ctx.finish(approach, synthesis.answer, records))
    }

    /// Scores a finished request in place and feeds the analytics sink.
    ///
    /// For callers that must wait for evaluation (the CLI) and therefore
    /// build the orchestrator with evaluation disabled. Returns `None` for
    /// failed results or when scoring fails.
    pub async fn evaluate(
        &self,
        result: &RequestResult,
        message: &str,
        user_id: &str,
    ) -> Option<QualityAssessment> {
        let record = evaluation_record(result, message)?;
        self.learner
            .evaluate_and_learn(self.provider.as_ref(), &record, user_id)
            .await
    }

    fn spawn_evaluation(&self, result: &RequestResult, message: &str, user_id: &str) {
        if !self.config.evaluate {
            return;
        }
        let Some(record) = evaluation_record(result, message) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(user_id, "no runtime; evaluation skipped");
            return;
        };

        let learner = Arc::clone(&self.learner);
        let provider = Arc::clone(&self.provider);
        let user_id = user_id.to_string();
        handle.spawn(async move {
            learner
                .evaluate_and_learn(provider.as_ref(), &record, &user_id)
                .await;
        });
    }
}

fn evaluation_record(result: &RequestResult, message: &str) -> Option<EvaluationRecord> {
    if !result.success {
        return None;
    }
    Some(EvaluationRecord {
        question: message.to_string(),
        response: result.response.clone(),
        approach: result.approach.as_str().to_string(),
        tools_used: result.tools_used.clone(),
        latency: result.elapsed,
        classification: result.classification.clone()?,
    })
}

fn validate_message(message: &str) -> Result<(), AgentError> {
    if message.trim().is_empty() {
        return Err(AgentError::Orchestration {
            message: "Message cannot be empty".to_string(),
        });
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(AgentError::Orchestration {
            message: format!(
                "Message exceeds maximum length ({} bytes, max {MAX_MESSAGE_LEN})",
                message.len()
            ),
        });
    }
    Ok(())
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("analyzer", &self.analyzer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::tool::{ToolDescriptor, ToolOutcome};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: "Paris.".to_string(),
                usage: TokenUsage::default(),
                finish_reason: None,
            })
        }
    }

    struct NoTools;

    #[async_trait]
    impl ToolProvider for NoTools {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError> {
            Ok(Vec::new())
        }

        async fn call_tool(&self, name: &str, _params: &Value) -> Result<ToolOutcome, AgentError> {
            panic!("unexpected call to {name}");
        }
    }

    fn orchestrator() -> (Arc<CountingProvider>, Orchestrator) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let config = AgentConfig::builder()
            .api_key("test")
            .evaluate(false)
            .build()
            .unwrap_or_else(|_| unreachable!());
        let llm: Arc<dyn LlmProvider> = provider.clone();
        (provider, Orchestrator::new(llm, config))
    }

    #[test]
    fn test_validate_message() {
        assert!(validate_message("hello").is_ok());
        assert!(validate_message("   ").is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LEN + 1)).is_err());
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_without_calls() {
        let (provider, orchestrator) = orchestrator();
        let result = orchestrator
            .process_user_request("  ", &[], "u1", &NoTools)
            .await;
        assert!(!result.success);
        assert_eq!(result.approach, Approach::Error);
        assert!(result.classification.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_general_knowledge_answers_directly() {
        let (provider, orchestrator) = orchestrator();
        let result = orchestrator
            .process_user_request("What is the capital of France?", &[], "u1", &NoTools)
            .await;
        assert!(result.success);
        assert_eq!(result.approach, Approach::DirectCompletion);
        assert_eq!(result.response, "Paris.");
        assert!(result.tools_used.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_hides_prompts() {
        let (_, orchestrator) = orchestrator();
        let debug = format!("{orchestrator:?}");
        assert!(debug.contains("counting"));
        assert!(!debug.contains("system_prompt"));
    }
}
