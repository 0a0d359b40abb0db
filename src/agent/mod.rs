//! Per-turn request routing for a tool-using assistant.
//!
//! Decides for every user turn whether to answer from model knowledge,
//! fetch personal data through tools, answer from the conversation, or run
//! a multi-step tool plan. Completions, tools, settings and analytics are
//! injected capabilities ([`LlmProvider`], [`ToolProvider`],
//! [`SettingsStore`], [`AnalyticsSink`]).
//!
//! # Architecture
//!
//! ```text
//! User turn → Orchestrator
//!   ├── SettingsStore → UserToolPreferences
//!   ├── ToolProvider::list_tools → ToolRegistry (per-request snapshot)
//!   ├── RequestClassifier (preferences → heuristics → model)
//!   ├── GENERAL_KNOWLEDGE  → direct completion
//!   ├── CURRENT_INFO       → search-model completion
//!   ├── CONTEXT_DEPENDENT  → ContextAnalyzer → context answer
//!   ├── PERSONAL_DATA / AMBIGUOUS
//!   │   ├── ToolPlanner (model plan, keyword fallback)
//!   │   ├── PreferenceFilter
//!   │   ├── ToolExecutionEngine (sequential, dynamic references)
//!   │   └── ResponseSynthesizer
//!   └── spawned EvaluationLearner → AnalyticsSink
//! ```

pub mod answer;
pub mod classifier;
pub mod client;
pub mod config;
pub mod context;
pub mod evaluation;
pub mod executor;
pub mod fixture;
pub mod message;
pub mod orchestrator;
pub mod outcome;
pub mod planner;
pub mod preferences;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod synthesizer;
pub mod tool;
pub mod traits;

// Re-export key types
pub use classifier::{Classification, ClassifierTier, RequestClassifier, classify_heuristic};
pub use config::AgentConfig;
pub use context::{ContextAnalyzer, NO_RECENT_DATA_CONTEXT};
pub use evaluation::{
    AnalyticsSink, EvaluationLearner, EvaluationRecord, ImprovementSuggestion, QualityAssessment,
    TracingAnalyticsSink,
};
pub use executor::{ToolExecutionEngine, ToolExecutionRecord};
pub use fixture::StaticToolProvider;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::Orchestrator;
pub use outcome::{Approach, Degradation, RequestResult};
pub use planner::{ParamValue, PlanSource, ToolPlan, ToolPlanStep, ToolPlanner, basic_plan};
pub use preferences::{
    PreferenceFilter, PreferredApproach, SettingsStore, StaticSettings, UserToolPreferences,
};
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use synthesizer::{ResponseSynthesizer, Synthesis};
pub use tool::{ToolDescriptor, ToolOutcome, ToolProvider, ToolRegistry};
pub use traits::Agent;
