//! Per-user tool preferences and the filter that applies them.
//!
//! Preferences only ever remove or truncate tools; they never add a tool
//! that was not suggested or planned.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::planner::ToolPlan;
use super::tool::ToolRegistry;
use crate::core::ToolCategory;
use crate::error::AgentError;

/// Default cap on tool calls per request.
pub const DEFAULT_MAX_TOOLS_PER_QUERY: usize = 3;

/// How eagerly tools are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredApproach {
    /// Keep only the first tool.
    Conservative,
    /// Keep allowed tools up to the per-query cap.
    #[default]
    Balanced,
    /// Keep allowed tools up to the per-query cap.
    Aggressive,
}

/// A user's tool settings. Read-only within a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserToolPreferences {
    /// When `false`, requests are answered without any tools.
    pub auto_tool_usage: bool,
    /// Allow mail tools.
    pub enable_gmail: bool,
    /// Allow file tools.
    pub enable_drive: bool,
    /// Allow calendar tools.
    pub enable_calendar: bool,
    /// Upper bound on tools executed per request.
    pub max_tools_per_query: usize,
    /// How eagerly tools are used.
    pub preferred_approach: PreferredApproach,
}

impl Default for UserToolPreferences {
    fn default() -> Self {
        Self {
            auto_tool_usage: true,
            enable_gmail: true,
            enable_drive: true,
            enable_calendar: true,
            max_tools_per_query: DEFAULT_MAX_TOOLS_PER_QUERY,
            preferred_approach: PreferredApproach::Balanced,
        }
    }
}

impl UserToolPreferences {
    /// Returns `true` if tools of `category` may be used.
    #[must_use]
    pub const fn allows(&self, category: ToolCategory) -> bool {
        match category {
            ToolCategory::Email => self.enable_gmail,
            ToolCategory::Files => self.enable_drive,
            ToolCategory::Calendar => self.enable_calendar,
            ToolCategory::Other => true,
        }
    }

    /// Number of tools the approach permits.
    #[must_use]
    pub fn tool_limit(&self) -> usize {
        match self.preferred_approach {
            PreferredApproach::Conservative => self.max_tools_per_query.min(1),
            PreferredApproach::Balanced | PreferredApproach::Aggressive => {
                self.max_tools_per_query
            }
        }
    }
}

/// Source of per-user preferences (an external settings store).
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetches the preferences of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Settings`] when the store cannot be read. The
    /// router then falls back to [`UserToolPreferences::default`].
    async fn get_user_tool_preferences(
        &self,
        user_id: &str,
    ) -> Result<UserToolPreferences, AgentError>;
}

/// In-memory settings: one default plus per-user overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticSettings {
    /// Preferences for users without an override.
    #[serde(default)]
    pub default: UserToolPreferences,
    /// Per-user overrides.
    #[serde(default)]
    pub users: HashMap<String, UserToolPreferences>,
}

impl StaticSettings {
    /// Uses `preferences` for every user.
    #[must_use]
    pub fn uniform(preferences: UserToolPreferences) -> Self {
        Self {
            default: preferences,
            users: HashMap::new(),
        }
    }

    /// Loads settings from a JSON file.
    ///
    /// Accepts either a full `{ "default": .., "users": {..} }` document or
    /// a bare preferences object applied to every user.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Io`] if the file cannot be read and
    /// [`AgentError::Settings`] if it is not valid settings JSON.
    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        let content = std::fs::read_to_string(path)?;
        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| AgentError::Settings {
                message: format!("{}: {e}", path.display()),
            })?;

        let is_document = value.get("default").is_some() || value.get("users").is_some();
        let parsed = if is_document {
            serde_json::from_value::<Self>(value)
        } else {
            serde_json::from_value::<UserToolPreferences>(value).map(Self::uniform)
        };
        parsed.map_err(|e| AgentError::Settings {
            message: format!("{}: {e}", path.display()),
        })
    }
}

#[async_trait]
impl SettingsStore for StaticSettings {
    async fn get_user_tool_preferences(
        &self,
        user_id: &str,
    ) -> Result<UserToolPreferences, AgentError> {
        Ok(self
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Applies [`UserToolPreferences`] to tool suggestions and plans.
pub struct PreferenceFilter;

impl PreferenceFilter {
    /// Filters suggested tool names.
    ///
    /// Drops tools of disabled categories, then truncates to the approach's
    /// limit. Order is preserved and nothing is ever added.
    #[must_use]
    pub fn filter(
        suggested_tools: &[String],
        preferences: &UserToolPreferences,
        registry: &ToolRegistry,
    ) -> Vec<String> {
        let limit = preferences.tool_limit();
        let filtered: Vec<String> = suggested_tools
            .iter()
            .filter(|name| preferences.allows(category_for(name, registry)))
            .take(limit)
            .cloned()
            .collect();

        debug!(
            suggested = suggested_tools.len(),
            kept = filtered.len(),
            approach = ?preferences.preferred_approach,
            "filtered suggested tools"
        );
        filtered
    }

    /// Applies the same rules to the steps of a plan.
    ///
    /// Kept steps are re-indexed; dynamic references pointing at a removed
    /// step become unbound and fall back to scanning every earlier result.
    #[must_use]
    pub fn filter_plan(
        mut plan: ToolPlan,
        preferences: &UserToolPreferences,
        registry: &ToolRegistry,
    ) -> ToolPlan {
        let limit = preferences.tool_limit();
        let planned = plan.tool_sequence.len();

        let mut kept = 0;
        plan.retain_steps(|step| {
            if kept >= limit || !preferences.allows(category_for(&step.tool, registry)) {
                return false;
            }
            kept += 1;
            true
        });

        if plan.tool_sequence.len() != planned {
            debug!(
                planned,
                kept = plan.tool_sequence.len(),
                "preferences removed plan steps"
            );
        }
        plan
    }
}

fn category_for(name: &str, registry: &ToolRegistry) -> ToolCategory {
    registry
        .category_of(name)
        .unwrap_or_else(|| ToolCategory::infer_from_name(name))
}
