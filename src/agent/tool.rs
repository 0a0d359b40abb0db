//! Tool capability types and the per-request tool registry.
//!
//! A [`ToolProvider`] is the external collaborator that owns the concrete
//! integrations (mail, files, calendar). The engine only sees what it
//! reports through [`ToolProvider::list_tools`] and the opaque
//! [`ToolOutcome`] of each call. [`ToolRegistry`] is the read-only
//! snapshot of that catalogue taken once per request.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::ToolCategory;
use crate::error::AgentError;

/// A tool advertised by the tool provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (the dispatch key for [`ToolProvider::call_tool`]).
    pub name: String,
    /// Human-readable description of what the tool does.
    #[serde(default)]
    pub description: String,
    /// Service family the tool belongs to.
    #[serde(default)]
    pub category: ToolCategory,
    /// JSON Schema object describing the tool's parameters.
    #[serde(default = "empty_schema")]
    pub input_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// The result of a tool invocation.
///
/// Opaque beyond the success flag and the response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// Whether the tool reports success.
    pub success: bool,
    /// Response payload (text or structured JSON).
    #[serde(default)]
    pub response: serde_json::Value,
}

impl ToolOutcome {
    /// Creates a successful outcome with a text payload.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            response: serde_json::Value::String(text.into()),
        }
    }

    /// Creates a failed outcome with an error payload.
    #[must_use]
    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            response: serde_json::Value::String(text.into()),
        }
    }

    /// Returns the payload as text (see [`payload_text`]).
    #[must_use]
    pub fn response_text(&self) -> String {
        payload_text(&self.response)
    }
}

/// Renders a tool payload as text: strings verbatim, anything else as
/// compact JSON, `null` as empty.
#[must_use]
pub fn payload_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// External tool capability (mail, files, calendar integrations).
///
/// Implementations must resolve every call; the engine adds its own
/// timeout on top and treats any error as a failed step.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Enumerates the tools currently available to the user.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolDiscovery`] when the catalogue cannot be read.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError>;

    /// Invokes a tool with named parameters.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ToolExecution`] on transport or integration
    /// failures. A tool that ran but reported failure should return
    /// `Ok` with [`ToolOutcome::success`] set to `false`.
    async fn call_tool(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<ToolOutcome, AgentError>;
}

/// Read-only snapshot of the tool catalogue for one request.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Builds a registry from descriptors, normalising categories and
    /// dropping duplicate names (first wins).
    #[must_use]
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        let mut normalized: Vec<ToolDescriptor> = Vec::with_capacity(tools.len());
        for mut tool in tools {
            if normalized.iter().any(|t| t.name == tool.name) {
                continue;
            }
            if tool.category == ToolCategory::Other {
                tool.category = ToolCategory::infer_from_name(&tool.name);
            }
            normalized.push(tool);
        }
        Self { tools: normalized }
    }

    /// Takes a snapshot of the provider's catalogue.
    ///
    /// Discovery errors and timeouts yield an empty registry; the router
    /// then answers without tools.
    pub async fn discover(provider: &dyn ToolProvider, timeout: Duration) -> Self {
        match tokio::time::timeout(timeout, provider.list_tools()).await {
            Ok(Ok(tools)) => {
                let registry = Self::new(tools);
                debug!(tool_count = registry.len(), "tool catalogue discovered");
                registry
            }
            Ok(Err(e)) => {
                warn!(error = %e, "tool discovery failed; continuing without tools");
                Self::default()
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "tool discovery timed out; continuing without tools"
                );
                Self::default()
            }
        }
    }

    /// Returns all descriptors in provider order.
    #[must_use]
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Returns `true` if the catalogue contains `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the category of `name`, if known.
    #[must_use]
    pub fn category_of(&self, name: &str) -> Option<ToolCategory> {
        self.get(name).map(|t| t.category)
    }

    /// Returns the tools in `category`, search/list tools first.
    #[must_use]
    pub fn in_category(&self, category: ToolCategory) -> Vec<&ToolDescriptor> {
        let mut tools: Vec<&ToolDescriptor> = self
            .tools
            .iter()
            .filter(|t| t.category == category)
            .collect();
        tools.sort_by_key(|t| lookup_rank(&t.name));
        tools
    }

    /// Returns the preferred entry-point tool of `category`.
    #[must_use]
    pub fn primary_in(&self, category: ToolCategory) -> Option<&ToolDescriptor> {
        self.in_category(category).into_iter().next()
    }

    /// Returns all tool names in provider order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    /// Returns a registry restricted to `names` (order of the catalogue).
    #[must_use]
    pub fn restricted_to<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self {
            tools: self
                .tools
                .iter()
                .filter(|t| names.iter().any(|n| n.as_ref() == t.name))
                .cloned()
                .collect(),
        }
    }

    /// Returns `true` if no tools are available.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Returns the number of tools.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tools.len()
    }
}

/// Sort key putting search tools first, then list tools, then the rest.
fn lookup_rank(name: &str) -> u8 {
    if name.contains("search") {
        0
    } else if name.contains("list") {
        1
    } else {
        2
    }
}
