//! Multi-tier request classification.
//!
//! Tier 0 checks the user's preferences, Tier 1 applies deterministic
//! keyword heuristics, Tier 2 asks the classifier model when Tier 1 is not
//! confident enough, and Tier 3 defers to the planner as `AMBIGUOUS`.
//! Classification never fails: every error escalates to the next tier.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::AgentConfig;
use super::message::{ChatMessage, Role};
use super::preferences::UserToolPreferences;
use super::prompt::build_classifier_prompt;
use super::provider::LlmProvider;
use super::tool::ToolRegistry;
use super::traits::{Agent, strip_code_fence};
use crate::core::{RequestCategory, ToolCategory};
use crate::error::AgentError;

/// Confidence given to unambiguous Tier-1 decisions.
const STRONG: f32 = 0.9;
/// Confidence for Tier-1 decisions with a single weaker signal.
const MODERATE: f32 = 0.8;
/// Confidence when Tier-1 signals conflict.
const WEAK: f32 = 0.5;
/// Confidence when Tier 1 found nothing at all.
const NONE: f32 = 0.3;

/// Which stage produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierTier {
    /// Decided from user preferences before any analysis.
    Preferences,
    /// Deterministic keyword heuristics.
    Heuristic,
    /// Structured model completion.
    Model,
    /// Nothing decided; the planner makes the call.
    Deferred,
}

impl ClassifierTier {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Preferences => "preferences",
            Self::Heuristic => "heuristic",
            Self::Model => "model",
            Self::Deferred => "deferred",
        }
    }
}

/// The routing decision for one request. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    category: RequestCategory,
    confidence: f32,
    tier_used: ClassifierTier,
    reasoning: String,
    suggested_tools: Vec<String>,
}

impl Classification {
    /// Creates a classification, clamping `confidence` into `[0, 1]`.
    #[must_use]
    pub fn new(
        category: RequestCategory,
        confidence: f32,
        tier_used: ClassifierTier,
        reasoning: impl Into<String>,
        suggested_tools: Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            category,
            confidence,
            tier_used,
            reasoning: reasoning.into(),
            suggested_tools,
        }
    }

    /// The decided category.
    #[must_use]
    pub const fn category(&self) -> RequestCategory {
        self.category
    }

    /// Confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f32 {
        self.confidence
    }

    /// The tier that produced this classification.
    #[must_use]
    pub const fn tier_used(&self) -> ClassifierTier {
        self.tier_used
    }

    /// Short explanation of the decision.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Tools worth trying, all present in the registry snapshot.
    #[must_use]
    pub fn suggested_tools(&self) -> &[String] {
        &self.suggested_tools
    }

    /// Returns the same decision under a different category.
    #[must_use]
    pub fn recategorized(&self, category: RequestCategory, reasoning: impl Into<String>) -> Self {
        Self {
            category,
            reasoning: reasoning.into(),
            ..self.clone()
        }
    }
}

static PERSONAL_INTENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(my|me|i|i've|i'm|mine|our)\b|^(find|search|show|list|check|read|get|look up|summari[sz]e)\b").ok()
});

static EMAIL_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(e-?mails?|gmail|inbox|mail|mailbox|unread|sent me|replied|reply|messages? from)\b").ok()
});

static FILE_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(drive|files?|documents?|docs?|spreadsheets?|sheets?|folders?|pdfs?|slides?|presentations?)\b").ok()
});

static CALENDAR_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(calendar|meetings?|events?|appointments?|schedule[sd]?|agenda|availability|free slots?)\b").ok()
});

static CURRENT_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(today|tonight|right now|as of now|currently|latest|recent|news|headlines?|weather|forecast|price|prices|stock|stocks|score|scores|this week|live (?:scores?|results?|coverage|stream))\b").ok()
});

static GENERAL_TERMS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(what (is|are|was|were)|who (is|was|were)|when (did|was)|where (is|was)|how (does|do|did|to)|why (is|do|does|did)|explain|define|describe|tell me about)\b|\b(capital of|meaning of|definition of|history of|difference between)\b").ok()
});

static FOLLOW_UP: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(and |so |but )?(what|how) about\b|^tell me more\b|^more (details|info)\b|^(what|who|when|where|which) (is|are|was|were) (it|they|them|those|these)\b|^(which|what) ones?\b|^(open|read|show me|summari[sz]e|forward|reply to) (it|them|those|these|that one|this one|the (first|second|last|latest)( one)?)\b|^(and |so )?(it|they|them|those|these|that one|this one|the (first|second|last|latest) one)[\s?.!]*$").ok()
});

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|r| r.is_match(text))
}

/// Tool categories referenced by the vocabulary of a lowercased message.
pub(crate) fn detected_tool_categories(lower: &str) -> Vec<ToolCategory> {
    let mut categories = Vec::new();
    if matches(&EMAIL_TERMS, lower) {
        categories.push(ToolCategory::Email);
    }
    if matches(&FILE_TERMS, lower) {
        categories.push(ToolCategory::Files);
    }
    if matches(&CALENDAR_TERMS, lower) {
        categories.push(ToolCategory::Calendar);
    }
    categories
}

/// Registry tools for the given categories, search/list tools first.
fn suggest_tools(categories: &[ToolCategory], registry: &ToolRegistry) -> Vec<String> {
    categories
        .iter()
        .flat_map(|&category| registry.in_category(category))
        .map(|tool| tool.name.clone())
        .collect()
}

/// Tier-1 classification: deterministic keyword heuristics, no I/O.
///
/// `history` holds the turns before `message`.
#[must_use]
pub fn classify_heuristic(
    message: &str,
    history: &[ChatMessage],
    registry: &ToolRegistry,
) -> Classification {
    let lower = message.trim().to_lowercase();
    let word_count = lower.split_whitespace().count();

    let categories = detected_tool_categories(&lower);
    let personal_intent = matches(&PERSONAL_INTENT, &lower);
    let current = matches(&CURRENT_TERMS, &lower);
    let general = matches(&GENERAL_TERMS, &lower);
    let has_assistant_turn = history.iter().any(|m| m.role == Role::Assistant);
    let follow_up = word_count <= 8 && matches(&FOLLOW_UP, &lower);

    let heuristic = |category, confidence, reasoning: &str, tools| {
        Classification::new(
            category,
            confidence,
            ClassifierTier::Heuristic,
            reasoning,
            tools,
        )
    };

    if !categories.is_empty() {
        let tools = suggest_tools(&categories, registry);
        return if personal_intent {
            heuristic(
                RequestCategory::PersonalData,
                STRONG,
                "personal data vocabulary with first-person or lookup intent",
                tools,
            )
        } else if general {
            heuristic(
                RequestCategory::PersonalData,
                WEAK,
                "data vocabulary inside a general question",
                tools,
            )
        } else {
            heuristic(
                RequestCategory::PersonalData,
                MODERATE,
                "personal data vocabulary",
                tools,
            )
        };
    }

    if follow_up {
        return if has_assistant_turn {
            heuristic(
                RequestCategory::ContextDependent,
                STRONG,
                "short follow-up referring to earlier turns",
                Vec::new(),
            )
        } else {
            heuristic(
                RequestCategory::Ambiguous,
                NONE,
                "follow-up phrasing without prior turns",
                Vec::new(),
            )
        };
    }

    match (current, general) {
        (true, _) => heuristic(
            RequestCategory::CurrentInfo,
            if general { MODERATE } else { STRONG },
            "asks for current public information",
            Vec::new(),
        ),
        (false, true) => heuristic(
            RequestCategory::GeneralKnowledge,
            STRONG,
            "general knowledge question",
            Vec::new(),
        ),
        (false, false) => heuristic(
            RequestCategory::Ambiguous,
            NONE,
            "no decisive markers",
            Vec::new(),
        ),
    }
}

/// Structured answer expected from the classifier model.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    category: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    suggested_tools: Vec<String>,
}

/// Agent that classifies a request with one JSON completion.
pub struct ClassifierAgent {
    model: String,
    max_tokens: u32,
    timeout: Duration,
    system_prompt: String,
}

impl ClassifierAgent {
    /// Creates a new classifier agent with the given configuration and system prompt.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            model: config.classifier_model.clone(),
            max_tokens: config.classifier_max_tokens,
            timeout: config.completion_timeout,
            system_prompt,
        }
    }

    fn parse_verdict(content: &str) -> Result<(RequestCategory, ModelVerdict), AgentError> {
        let verdict: ModelVerdict =
            serde_json::from_str(strip_code_fence(content)).map_err(|e| {
                AgentError::ResponseParse {
                    message: format!("Failed to parse classification: {e}"),
                    content: content.to_string(),
                }
            })?;

        let category = RequestCategory::parse(&verdict.category)
            .filter(|c| RequestCategory::MODEL_CHOICES.contains(c))
            .ok_or_else(|| AgentError::ResponseParse {
                message: format!("unknown category '{}'", verdict.category),
                content: content.to_string(),
            })?;

        Ok((category, verdict))
    }
}

#[async_trait]
impl Agent for ClassifierAgent {
    fn name(&self) -> &'static str {
        "classifier"
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

/// The multi-tier classifier.
pub struct RequestClassifier {
    agent: ClassifierAgent,
    threshold: f32,
}

impl RequestClassifier {
    /// Creates a classifier escalating to the model below `config.classification_threshold`.
    #[must_use]
    pub fn new(config: &AgentConfig, system_prompt: String) -> Self {
        Self {
            agent: ClassifierAgent::new(config, system_prompt),
            threshold: config.classification_threshold,
        }
    }

    /// Classifies `message` given the turns before it.
    ///
    /// Preferences with `auto_tool_usage == false` short-circuit to
    /// `USER_DISABLED`. Suggested tools are always names present in
    /// `registry`.
    pub async fn classify(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
        preferences: &UserToolPreferences,
        registry: &ToolRegistry,
    ) -> Classification {
        if !preferences.auto_tool_usage {
            debug!("automatic tool usage disabled by preferences");
            return Classification::new(
                RequestCategory::UserDisabled,
                1.0,
                ClassifierTier::Preferences,
                "automatic tool usage is disabled",
                Vec::new(),
            );
        }

        let heuristic = classify_heuristic(message, history, registry);
        if heuristic.confidence() >= self.threshold {
            debug!(
                category = %heuristic.category(),
                confidence = heuristic.confidence(),
                "tier 1 classification"
            );
            return heuristic;
        }

        match self.classify_with_model(provider, message, history, registry, &heuristic).await {
            Ok(classification) => {
                debug!(
                    category = %classification.category(),
                    confidence = classification.confidence(),
                    "tier 2 classification"
                );
                classification
            }
            Err(e) => {
                warn!(error = %e, "model classification failed; deferring to planner");
                Classification::new(
                    RequestCategory::Ambiguous,
                    heuristic.confidence(),
                    ClassifierTier::Deferred,
                    format!("deferred to planner ({})", heuristic.reasoning()),
                    heuristic.suggested_tools().to_vec(),
                )
            }
        }
    }

    async fn classify_with_model(
        &self,
        provider: &dyn LlmProvider,
        message: &str,
        history: &[ChatMessage],
        registry: &ToolRegistry,
        heuristic: &Classification,
    ) -> Result<Classification, AgentError> {
        let prompt = build_classifier_prompt(message, history, &registry.names());
        let response = self.agent.execute(provider, &prompt).await?;
        let (category, verdict) = ClassifierAgent::parse_verdict(&response.content)?;

        let mut suggested: Vec<String> = verdict
            .suggested_tools
            .into_iter()
            .filter(|name| registry.contains(name))
            .collect();
        if suggested.is_empty() && category == RequestCategory::PersonalData {
            suggested = heuristic.suggested_tools().to_vec();
        }

        Ok(Classification::new(
            category,
            verdict.confidence.unwrap_or(self.threshold),
            ClassifierTier::Model,
            verdict.reasoning,
            suggested,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage, assistant_message, user_message};
    use crate::agent::tool::ToolDescriptor;
    use test_case::test_case;

    fn registry() -> ToolRegistry {
        let names = ["gmail_get_message", "gmail_search", "drive_list_files", "calendar_list_events"];
        ToolRegistry::new(
            names
                .iter()
                .map(|name| ToolDescriptor {
                    name: (*name).to_string(),
                    description: String::new(),
                    category: ToolCategory::Other,
                    input_schema: serde_json::json!({}),
                })
                .collect(),
        )
    }

    struct ScriptedProvider {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn replying(content: &str) -> Self {
            Self {
                reply: Ok(content.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
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
            match &self.reply {
                Ok(content) => Ok(ChatResponse {
                    content: content.clone(),
                    usage: TokenUsage::default(),
                    finish_reason: Some("stop".to_string()),
                }),
                Err(()) => Err(AgentError::ApiRequest {
                    message: "service unavailable".to_string(),
                    status: Some(503),
                }),
            }
        }
    }

    fn classifier() -> RequestClassifier {
        let config = AgentConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        RequestClassifier::new(&config, "classify".to_string())
    }

    #[test_case("What is the capital of France?", RequestCategory::GeneralKnowledge ; "capital question")]
    #[test_case("Explain how photosynthesis works", RequestCategory::GeneralKnowledge ; "explain")]
    #[test_case("find emails about project deadline", RequestCategory::PersonalData ; "email search")]
    #[test_case("what meetings do I have tomorrow", RequestCategory::PersonalData ; "calendar")]
    #[test_case("what's the weather in Iwata today", RequestCategory::CurrentInfo ; "weather")]
    #[test_case("latest J-League news", RequestCategory::CurrentInfo ; "news")]
    #[test_case("live scores for Jubilo Iwata", RequestCategory::CurrentInfo ; "live scores")]
    fn test_heuristic_categories(message: &str, expected: RequestCategory) {
        let classification = classify_heuristic(message, &[], &registry());
        assert_eq!(classification.category(), expected);
        assert!(classification.confidence() >= 0.7);
        assert_eq!(classification.tier_used(), ClassifierTier::Heuristic);
    }

    #[test]
    fn test_heuristic_suggests_registry_tools_search_first() {
        let classification =
            classify_heuristic("find emails about project deadline", &[], &registry());
        assert_eq!(
            classification.suggested_tools(),
            ["gmail_search".to_string(), "gmail_get_message".to_string()]
        );
    }

    #[test]
    fn test_follow_up_with_history_is_context_dependent() {
        let history = vec![
            user_message("any new emails?"),
            assistant_message("You have 2 recent emails: one from Iwata FC."),
        ];
        let classification = classify_heuristic("what about Jubilo?", &history, &registry());
        assert_eq!(classification.category(), RequestCategory::ContextDependent);
        assert!(classification.suggested_tools().is_empty());
    }

    #[test_case("what are they?" ; "pronoun question")]
    #[test_case("the first one?" ; "ordinal only")]
    #[test_case("summarize those" ; "pronoun-led action")]
    fn test_pronoun_follow_ups_use_context(message: &str) {
        let history = vec![
            user_message("any new emails?"),
            assistant_message("You have 2 recent emails: one from Iwata FC."),
        ];
        let classification = classify_heuristic(message, &history, &registry());
        assert_eq!(classification.category(), RequestCategory::ContextDependent);
    }

    #[test]
    fn test_pronoun_inside_general_question_is_not_a_follow_up() {
        let history = vec![
            user_message("any new emails?"),
            assistant_message("You have 2 recent emails: one from Iwata FC."),
        ];
        let classification = classify_heuristic("How does it work?", &history, &registry());
        assert_eq!(classification.category(), RequestCategory::GeneralKnowledge);
    }

    #[test_case("Where do penguins live?" ; "live as a verb")]
    #[test_case("How do I know when to stop now and then?" ; "bare now")]
    fn test_everyday_words_are_not_current_info(message: &str) {
        let classification = classify_heuristic(message, &[], &registry());
        assert_ne!(classification.category(), RequestCategory::CurrentInfo);
    }

    #[test]
    fn test_follow_up_without_history_is_not_confident() {
        let classification = classify_heuristic("what about Jubilo?", &[], &registry());
        assert_eq!(classification.category(), RequestCategory::Ambiguous);
        assert!(classification.confidence() < 0.7);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let high = Classification::new(
            RequestCategory::Ambiguous,
            4.2,
            ClassifierTier::Model,
            "",
            vec![],
        );
        assert!((high.confidence() - 1.0).abs() < f32::EPSILON);
        let nan = Classification::new(
            RequestCategory::Ambiguous,
            f32::NAN,
            ClassifierTier::Model,
            "",
            vec![],
        );
        assert!(nan.confidence().abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_confident_heuristic_skips_model() {
        let provider = ScriptedProvider::failing();
        let classification = classifier()
            .classify(
                &provider,
                "What is the capital of France?",
                &[],
                &UserToolPreferences::default(),
                &registry(),
            )
            .await;
        assert_eq!(classification.category(), RequestCategory::GeneralKnowledge);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_preferences_short_circuit() {
        let provider = ScriptedProvider::failing();
        let prefs = UserToolPreferences {
            auto_tool_usage: false,
            ..UserToolPreferences::default()
        };
        let classification = classifier()
            .classify(&provider, "find my emails", &[], &prefs, &registry())
            .await;
        assert_eq!(classification.category(), RequestCategory::UserDisabled);
        assert_eq!(classification.tier_used(), ClassifierTier::Preferences);
        assert!((classification.confidence() - 1.0).abs() < f32::EPSILON);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_tier_filters_unknown_tools() {
        let provider = ScriptedProvider::replying(
            r#"```json
{"category": "PERSONAL_DATA", "confidence": 0.8, "reasoning": "mail", "suggested_tools": ["gmail_search", "slack_search"]}
```"#,
        );
        let classification = classifier()
            .classify(
                &provider,
                "anything from Suzuki?",
                &[],
                &UserToolPreferences::default(),
                &registry(),
            )
            .await;
        assert_eq!(classification.category(), RequestCategory::PersonalData);
        assert_eq!(classification.tier_used(), ClassifierTier::Model);
        assert_eq!(classification.suggested_tools(), ["gmail_search".to_string()]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test_case(ScriptedProvider::failing() ; "provider error")]
    #[test_case(ScriptedProvider::replying("not json") ; "unparsable")]
    #[test_case(ScriptedProvider::replying(r#"{"category": "USER_DISABLED"}"#) ; "category not allowed")]
    #[test_case(ScriptedProvider::replying(r#"{"category": "SPORTS"}"#) ; "unknown category")]
    fn test_model_failure_defers(provider: ScriptedProvider) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|_| unreachable!());
        let classification = runtime.block_on(classifier().classify(
            &provider,
            "anything from Suzuki?",
            &[],
            &UserToolPreferences::default(),
            &registry(),
        ));
        assert_eq!(classification.category(), RequestCategory::Ambiguous);
        assert_eq!(classification.tier_used(), ClassifierTier::Deferred);
    }

    #[tokio::test]
    async fn test_classification_is_idempotent() {
        let provider = ScriptedProvider::replying(r#"{"category": "AMBIGUOUS", "confidence": 0.4}"#);
        let classifier = classifier();
        let prefs = UserToolPreferences::default();
        let first = classifier
            .classify(&provider, "Jubilo", &[], &prefs, &registry())
            .await;
        let second = classifier
            .classify(&provider, "Jubilo", &[], &prefs, &registry())
            .await;
        assert_eq!(first, second);
    }
}
