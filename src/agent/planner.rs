//! Tool planning.
//!
//! The planner asks the model for an ordered tool sequence given the
//! context summary and the tool catalogue. When the model call fails or
//! returns nothing usable, [`basic_plan`] maps request keywords to a
//! single search tool, so a usable plan is always produced.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classifier::detected_tool_categories;
use super::config::AgentConfig;
use super::context::ContextAnalyzer;
use super::message::{ChatMessage, user_message};
use super::prompt::build_planner_prompt;
use super::provider::LlmProvider;
use super::tool::ToolRegistry;
use super::traits::{Agent, strip_code_fence};
use crate::core::{DynamicRef, extract_search_query};
use crate::error::AgentError;

/// A step parameter: a literal JSON value or a reference to an earlier
/// step's result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Passed to the tool as is.
    Literal(serde_json::Value),
    /// Resolved from an earlier step's result before the call.
    DynamicRef(DynamicRef),
}

impl ParamValue {
    /// Classifies a raw planner value. Strings following the placeholder
    /// convention become references; everything else stays literal.
    #[must_use]
    pub fn from_raw(value: serde_json::Value) -> Self {
        if let serde_json::Value::String(s) = &value
            && let Some(reference) = DynamicRef::parse_placeholder(s)
        {
            return Self::DynamicRef(reference);
        }
        Self::Literal(value)
    }
}

/// One planned tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolPlanStep {
    /// Tool to call.
    pub tool: String,
    /// Named parameters.
    pub params: BTreeMap<String, ParamValue>,
    /// Why the step is in the plan.
    pub purpose: String,
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Produced by the planner model.
    Model,
    /// Produced by keyword mapping after the model path failed.
    Fallback,
}

/// An ordered tool plan. Consumed once, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolPlan {
    /// Whether any tool should run.
    pub needs_tools: bool,
    /// Steps in execution order.
    pub tool_sequence: Vec<ToolPlanStep>,
    /// Planner's reasoning.
    pub reasoning: String,
    /// What the plan is expected to deliver.
    pub expected_outcome: String,
    /// Model or fallback.
    pub source: PlanSource,
}

impl ToolPlan {
    /// A plan that runs nothing.
    #[must_use]
    pub fn no_tools(reasoning: impl Into<String>, source: PlanSource) -> Self {
        Self {
            needs_tools: false,
            tool_sequence: Vec::new(),
            reasoning: reasoning.into(),
            expected_outcome: String::new(),
            source,
        }
    }

    /// Returns `true` if executing the plan would call at least one tool.
    #[must_use]
    pub fn has_steps(&self) -> bool {
        self.needs_tools && !self.tool_sequence.is_empty()
    }

    /// Names of the planned tools, in order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tool_sequence.iter().map(|s| s.tool.as_str()).collect()
    }

    /// Sets `query` on the plan's search step, replacing any model-written
    /// value. The search step is the first step whose tool name contains
    /// `search`, else the first step that already takes a `query`.
    ///
    /// Returns `false` when the plan has no such step.
    pub fn pin_search_query(&mut self, query: &str) -> bool {
        let position = self
            .tool_sequence
            .iter()
            .position(|step| step.tool.contains("search"))
            .or_else(|| {
                self.tool_sequence
                    .iter()
                    .position(|step| step.params.contains_key("query"))
            });
        let Some(step) = position.and_then(|idx| self.tool_sequence.get_mut(idx)) else {
            return false;
        };
        step.params.insert(
            "query".to_string(),
            ParamValue::Literal(serde_json::Value::String(query.to_string())),
        );
        true
    }

    /// Keeps the steps for which `keep` returns `true`.
    ///
    /// Surviving steps are re-indexed. A bound reference whose source was
    /// removed, or which does not point strictly backward, becomes unbound.
    pub fn retain_steps<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ToolPlanStep) -> bool,
    {
        let steps = std::mem::take(&mut self.tool_sequence);
        let mut index_map: BTreeMap<usize, usize> = BTreeMap::new();
        for (old_idx, step) in steps.into_iter().enumerate() {
            if keep(&step) {
                index_map.insert(old_idx, self.tool_sequence.len());
                self.tool_sequence.push(step);
            }
        }

        for (idx, step) in self.tool_sequence.iter_mut().enumerate() {
            for value in step.params.values_mut() {
                if let ParamValue::DynamicRef(reference) = value
                    && let Some(source) = reference.source
                {
                    reference.source = index_map
                        .get(&source)
                        .copied()
                        .filter(|&new_source| new_source < idx);
                }
            }
        }

        if self.tool_sequence.is_empty() {
            self.needs_tools = false;
        }
    }
}

/// Raw plan as returned by the model.
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    needs_tools: bool,
    #[serde(default)]
    tool_sequence: Vec<RawStep>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    expected_outcome: String,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    tool: String,
    #[serde(default)]
    params: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    purpose: String,
}

/// Agent that plans tool calls with one JSON completion.
pub struct PlannerAgent {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl PlannerAgent {
    /// Creates a new planner agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.planner_model.clone(),
            max_tokens: config.planner_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }

    /// Parses the agent's JSON response into a validated plan.
    ///
    /// Steps naming tools outside `registry` are dropped.
    fn parse_plan(content: &str, registry: &ToolRegistry) -> Result<ToolPlan, AgentError> {
        let raw: RawPlan = serde_json::from_str(strip_code_fence(content)).map_err(|e| {
            AgentError::ResponseParse {
                message: format!("Failed to parse tool plan: {e}"),
                content: content.to_string(),
            }
        })?;

        let tool_sequence = raw
            .tool_sequence
            .into_iter()
            .map(|step| ToolPlanStep {
                tool: step.tool.trim().to_string(),
                params: step
                    .params
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(key, value)| (key, ParamValue::from_raw(value)))
                    .collect(),
                purpose: step.purpose,
            })
            .collect();

        let mut plan = ToolPlan {
            needs_tools: raw.needs_tools,
            tool_sequence,
            reasoning: raw.reasoning,
            expected_outcome: raw.expected_outcome,
            source: PlanSource::Model,
        };

        plan.retain_steps(|step| {
            let known = registry.contains(&step.tool);
            if !known {
                warn!(tool = %step.tool, "planner named an unknown tool; step dropped");
            }
            known
        });

        if raw.needs_tools && plan.tool_sequence.is_empty() {
            return Err(AgentError::ResponseParse {
                message: "plan requires tools but names no usable step".to_string(),
                content: content.to_string(),
            });
        }
        Ok(plan)
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    fn name(&self) -> &'static str {
        "planner"
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

/// Deterministic keyword planning.
///
/// Maps the request's email/files/calendar vocabulary to the first matching
/// category's search tool with a `query` parameter from
/// [`extract_search_query`] (omitted when empty). Without vocabulary or
/// matching tools the plan runs nothing.
#[must_use]
pub fn basic_plan<S: AsRef<str>>(
    message: &str,
    registry: &ToolRegistry,
    known_entities: &[S],
) -> ToolPlan {
    let lower = message.to_lowercase();
    let tool = detected_tool_categories(&lower)
        .into_iter()
        .find_map(|category| registry.primary_in(category));

    let Some(tool) = tool else {
        return ToolPlan::no_tools("no tool keywords matched", PlanSource::Fallback);
    };

    let mut params = BTreeMap::new();
    let query = extract_search_query(message, known_entities);
    if !query.is_empty() {
        params.insert(
            "query".to_string(),
            ParamValue::Literal(serde_json::Value::String(query)),
        );
    }

    ToolPlan {
        needs_tools: true,
        tool_sequence: vec![ToolPlanStep {
            tool: tool.name.clone(),
            params,
            purpose: format!("look up {} data for the request", tool.category),
        }],
        reasoning: "keyword mapping".to_string(),
        expected_outcome: String::new(),
        source: PlanSource::Fallback,
    }
}

/// LLM-backed planner with a deterministic fallback.
pub struct ToolPlanner {
    agent: PlannerAgent,
    analyzer: ContextAnalyzer,
    known_entities: Vec<String>,
}

impl ToolPlanner {
    /// Creates a planner from configuration and its system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            agent: PlannerAgent::new(config, system_prompt),
            analyzer: ContextAnalyzer::new(config.context_window, config.known_entities.clone()),
            known_entities: config.known_entities.clone(),
        }
    }

    /// Plans `message` against the full registry.
    ///
    /// Never fails: model errors, invalid JSON, or a `needs_tools` answer
    /// without valid steps fall back to [`basic_plan`].
    pub async fn plan(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
        registry: &ToolRegistry,
    ) -> ToolPlan {
        if registry.is_empty() {
            return ToolPlan::no_tools("no tools available", PlanSource::Fallback);
        }

        let mut turns = history.to_vec();
        turns.push(user_message(message));
        let context = self.analyzer.analyze(&turns);
        let query = extract_search_query(message, &self.known_entities);
        let prompt = build_planner_prompt(message, &context, &query, registry.descriptors());

        match self.plan_with_model(provider, &prompt, registry).await {
            Ok(plan) => {
                debug!(
                    steps = plan.tool_sequence.len(),
                    needs_tools = plan.needs_tools,
                    "model tool plan"
                );
                plan
            }
            Err(e) => {
                warn!(error = %e, "tool planning failed; using keyword plan");
                basic_plan(message, registry, &self.known_entities)
            }
        }
    }

    /// Plans against the registry restricted to `allowed` (suggested tools).
    ///
    /// An empty `allowed` list means no restriction.
    pub async fn plan_within(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
        registry: &ToolRegistry,
        allowed: &[String],
    ) -> ToolPlan {
        if allowed.is_empty() {
            return self.plan(provider, message, history, registry).await;
        }
        let restricted = registry.restricted_to(allowed);
        self.plan(provider, message, history, &restricted).await
    }

    async fn plan_with_model(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        registry: &ToolRegistry,
    ) -> Result<ToolPlan, AgentError> {
        let response = self.agent.execute(provider, prompt).await?;
        PlannerAgent::parse_plan(&response.content, registry)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::agent::tool::ToolDescriptor;
    use crate::core::{DEFAULT_KNOWN_ENTITIES, IdExtractor, ToolCategory};

    fn registry() -> ToolRegistry {
        let names = ["gmail_search", "gmail_get_message", "drive_search", "calendar_list_events"];
        ToolRegistry::new(
            names
                .iter()
                .map(|name| ToolDescriptor {
                    name: (*name).to_string(),
                    description: format!("{name} tool"),
                    category: ToolCategory::Other,
                    input_schema: serde_json::json!({}),
                })
                .collect(),
        )
    }

    struct ScriptedProvider {
        reply: Option<String>,
        calls: AtomicUsize,
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
                .ok_or_else(|| AgentError::ApiRequest {
                    message: "down".to_string(),
                    status: None,
                })
        }
    }

    fn planner() -> ToolPlanner {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        ToolPlanner::new(&config, "plan".to_string())
    }

    fn literal(step: &ToolPlanStep, key: &str) -> Option<serde_json::Value> {
        match step.params.get(key) {
            Some(ParamValue::Literal(v)) => Some(v.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_basic_plan_uses_extracted_query() {
        let plan = basic_plan(
            "find emails about project deadline",
            &registry(),
            DEFAULT_KNOWN_ENTITIES,
        );
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.tool_names(), vec!["gmail_search"]);
        assert_eq!(
            literal(&plan.tool_sequence[0], "query"),
            Some(serde_json::json!("project deadline"))
        );
    }

    fn step(tool: &str, params: serde_json::Value) -> ToolPlanStep {
        let params = params
            .as_object()
            .map(|map| {
                map.iter()
                    .map(|(k, v)| (k.clone(), ParamValue::from_raw(v.clone())))
                    .collect()
            })
            .unwrap_or_default();
        ToolPlanStep {
            tool: tool.to_string(),
            params,
            purpose: String::new(),
        }
    }

    fn model_plan(steps: Vec<ToolPlanStep>) -> ToolPlan {
        ToolPlan {
            needs_tools: true,
            tool_sequence: steps,
            reasoning: String::new(),
            expected_outcome: String::new(),
            source: PlanSource::Model,
        }
    }

    #[test]
    fn test_pin_search_query_overrides_model_value() {
        let mut plan = model_plan(vec![
            step("gmail_list_labels", serde_json::json!({})),
            step("gmail_search", serde_json::json!({"query": "deadline email"})),
        ]);
        assert!(plan.pin_search_query("project deadline"));
        assert_eq!(
            literal(&plan.tool_sequence[1], "query"),
            Some(serde_json::json!("project deadline"))
        );
        assert!(literal(&plan.tool_sequence[0], "query").is_none());
    }

    #[test]
    fn test_pin_search_query_falls_back_to_query_param() {
        let mut plan = model_plan(vec![step(
            "drive_list_files",
            serde_json::json!({"query": "budget"}),
        )]);
        assert!(plan.pin_search_query("Q3 budget"));
        assert_eq!(
            literal(&plan.tool_sequence[0], "query"),
            Some(serde_json::json!("Q3 budget"))
        );

        let mut calendar = model_plan(vec![step("calendar_list_events", serde_json::json!({}))]);
        assert!(!calendar.pin_search_query("standup"));
        assert!(calendar.tool_sequence[0].params.is_empty());
    }

    #[test]
    fn test_basic_plan_omits_empty_query() {
        let plan = basic_plan("show my calendar", &registry(), DEFAULT_KNOWN_ENTITIES);
        assert_eq!(plan.tool_names(), vec!["calendar_list_events"]);
        assert!(plan.tool_sequence[0].params.is_empty());
    }

    #[test]
    fn test_basic_plan_without_keywords_runs_nothing() {
        let plan = basic_plan("hmm", &registry(), DEFAULT_KNOWN_ENTITIES);
        assert!(!plan.has_steps());
    }

    #[test]
    fn test_parse_plan_drops_unknown_tools_and_binds_references() {
        let content = r#"```json
{
  "needs_tools": true,
  "tool_sequence": [
    {"tool": "slack_search", "params": {"query": "x"}},
    {"tool": "gmail_search", "params": {"query": "Jubilo", "max_results": 5}, "purpose": "find"},
    {"tool": "gmail_get_message", "params": {"message_id": "$step1.message_id"}, "purpose": "read"}
  ],
  "reasoning": "search then read",
  "expected_outcome": "the message"
}
```"#;
        let plan = PlannerAgent::parse_plan(content, &registry()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.tool_names(), vec!["gmail_search", "gmail_get_message"]);
        assert_eq!(
            literal(&plan.tool_sequence[0], "max_results"),
            Some(serde_json::json!(5))
        );
        match plan.tool_sequence[1].params.get("message_id") {
            Some(ParamValue::DynamicRef(reference)) => {
                assert_eq!(reference.source, Some(0));
                assert_eq!(reference.extractor, IdExtractor::MessageId);
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn test_forward_reference_becomes_unbound() {
        let content = r#"{"needs_tools": true, "tool_sequence": [
            {"tool": "gmail_get_message", "params": {"message_id": "$step1"}},
            {"tool": "gmail_search", "params": {}}
        ]}"#;
        let plan = PlannerAgent::parse_plan(content, &registry()).unwrap_or_else(|e| panic!("{e}"));
        match plan.tool_sequence[0].params.get("message_id") {
            Some(ParamValue::DynamicRef(reference)) => assert_eq!(reference.source, None),
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let provider = ScriptedProvider {
            reply: None,
            calls: AtomicUsize::new(0),
        };
        let plan = planner()
            .plan(&provider, "find emails about project deadline", &[], &registry())
            .await;
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.tool_names(), vec!["gmail_search"]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_needs_tools_without_valid_steps_falls_back() {
        let provider = ScriptedProvider {
            reply: Some(
                r#"{"needs_tools": true, "tool_sequence": [{"tool": "nope"}]}"#.to_string(),
            ),
            calls: AtomicUsize::new(0),
        };
        let plan = planner()
            .plan(&provider, "list my drive files", &[], &registry())
            .await;
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.tool_names(), vec!["drive_search"]);
    }

    #[tokio::test]
    async fn test_plan_within_restricts_catalogue() {
        let provider = ScriptedProvider {
            reply: Some(
                r#"{"needs_tools": true, "tool_sequence": [{"tool": "drive_search", "params": {}}]}"#
                    .to_string(),
            ),
            calls: AtomicUsize::new(0),
        };
        let plan = planner()
            .plan_within(
                &provider,
                "find emails about budget",
                &[],
                &registry(),
                &["gmail_search".to_string()],
            )
            .await;
        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(plan.tool_names(), vec!["gmail_search"]);
    }

    #[tokio::test]
    async fn test_empty_registry_skips_model() {
        let provider = ScriptedProvider {
            reply: None,
            calls: AtomicUsize::new(0),
        };
        let plan = planner()
            .plan(&provider, "find emails", &[], &ToolRegistry::default())
            .await;
        assert!(!plan.has_steps());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}
