//! # assist-router
//!
//! Per-turn agent orchestration for a tool-using assistant: request
//! classification, tool planning, sequential tool execution with dynamic
//! parameter references, answer synthesis, and asynchronous outcome
//! evaluation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use assist_router::agent::{AgentConfig, Orchestrator, StaticToolProvider, client};
//!
//! # async fn run() -> Result<(), assist_router::AgentError> {
//! let config = AgentConfig::from_env()?;
//! let provider = client::create_provider(&config)?;
//! let orchestrator = Orchestrator::new(Arc::from(provider), config);
//! let tools = StaticToolProvider::default();
//!
//! let result = orchestrator
//!     .process_user_request("What is the capital of France?", &[], "user-1", &tools)
//!     .await;
//! assert!(result.tools_used.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod core;
pub mod error;

pub use agent::{
    AgentConfig, Approach, ChatMessage, Classification, LlmProvider, Orchestrator, RequestResult,
    ToolProvider,
};
pub use crate::core::{RequestCategory, ToolCategory, extract_search_query};
pub use error::{AgentError, CommandError, Result};
