//! File-backed tool provider.
//!
//! Serves a fixed catalogue and canned responses from a JSON document so
//! the router can be exercised without live integrations:
//!
//! ```json
//! {
//!   "tools": [{"name": "gmail_search", "description": "Search mail", "category": "email"}],
//!   "responses": {"gmail_search": {"success": true, "response": "Message ID: abc123def456"}}
//! }
//! ```
//!
//! A tool without a canned response answers with a failed outcome.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::tool::{ToolDescriptor, ToolOutcome, ToolProvider};
use crate::error::AgentError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureDocument {
    tools: Vec<ToolDescriptor>,
    responses: HashMap<String, ToolOutcome>,
    unavailable: bool,
}

/// A [`ToolProvider`] answering from a fixture document.
#[derive(Debug, Default)]
pub struct StaticToolProvider {
    tools: Vec<ToolDescriptor>,
    responses: HashMap<String, ToolOutcome>,
    unavailable: bool,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticToolProvider {
    /// Creates a provider with the given catalogue and no responses.
    #[must_use]
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    /// Adds a canned outcome for `tool`.
    #[must_use]
    pub fn with_response(mut self, tool: impl Into<String>, outcome: ToolOutcome) -> Self {
        self.responses.insert(tool.into(), outcome);
        self
    }

    /// Parses a fixture document.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolDiscovery`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let document: FixtureDocument =
            serde_json::from_str(json).map_err(|e| AgentError::ToolDiscovery {
                message: format!("invalid tool fixture: {e}"),
            })?;
        Ok(Self {
            tools: document.tools,
            responses: document.responses,
            unavailable: document.unavailable,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Loads a fixture document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Io`] if the file cannot be read, or
    /// [`AgentError::ToolDiscovery`] if it is malformed.
    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Calls made so far, in order, with their parameters.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolProvider for StaticToolProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError> {
        if self.unavailable {
            return Err(AgentError::ToolDiscovery {
                message: "tool provider unavailable".to_string(),
            });
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, params: &Value) -> Result<ToolOutcome, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((name.to_string(), params.clone()));
        }
        debug!(tool = name, %params, "fixture tool call");
        Ok(self
            .responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| ToolOutcome::failed(format!("no fixture response for {name}"))))
    }
}
