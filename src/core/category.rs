//! Request and tool categories.
//!
//! These types live in `core` so the CLI, the classifier, and the
//! preference filter share one parsing and naming scheme.

use serde::{Deserialize, Serialize};

/// How a user request should be satisfied.
///
/// Serialised in `SCREAMING_SNAKE_CASE` (`"GENERAL_KNOWLEDGE"`, ...), which is
/// also the vocabulary the classifier model is asked to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestCategory {
    /// Answerable from model knowledge alone.
    GeneralKnowledge,
    /// Needs fresh public information (news, weather, prices).
    CurrentInfo,
    /// Needs the user's own data via tool calls.
    PersonalData,
    /// Refers back to data already visible in the conversation.
    ContextDependent,
    /// Could not be decided; the planner makes the call.
    Ambiguous,
    /// The user switched automatic tool usage off.
    UserDisabled,
}

impl RequestCategory {
    /// Categories a model may answer with. `UserDisabled` is decided from
    /// preferences only and is never accepted from a model.
    pub const MODEL_CHOICES: [Self; 5] = [
        Self::GeneralKnowledge,
        Self::CurrentInfo,
        Self::PersonalData,
        Self::ContextDependent,
        Self::Ambiguous,
    ];

    /// Parses a category name (case-insensitive, `-`/space tolerant).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "GENERAL_KNOWLEDGE" => Some(Self::GeneralKnowledge),
            "CURRENT_INFO" => Some(Self::CurrentInfo),
            "PERSONAL_DATA" => Some(Self::PersonalData),
            "CONTEXT_DEPENDENT" => Some(Self::ContextDependent),
            "AMBIGUOUS" => Some(Self::Ambiguous),
            "USER_DISABLED" => Some(Self::UserDisabled),
            _ => None,
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralKnowledge => "GENERAL_KNOWLEDGE",
            Self::CurrentInfo => "CURRENT_INFO",
            Self::PersonalData => "PERSONAL_DATA",
            Self::ContextDependent => "CONTEXT_DEPENDENT",
            Self::Ambiguous => "AMBIGUOUS",
            Self::UserDisabled => "USER_DISABLED",
        }
    }
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The service family a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Mail (Gmail).
    Email,
    /// Documents and files (Drive).
    Files,
    /// Calendar events.
    Calendar,
    /// Anything else.
    #[default]
    Other,
}

impl ToolCategory {
    /// Parses a category string (case-insensitive). Unknown values map to
    /// [`ToolCategory::Other`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "email" | "gmail" | "mail" => Self::Email,
            "files" | "drive" | "docs" => Self::Files,
            "calendar" => Self::Calendar,
            _ => Self::Other,
        }
    }

    /// Infers a category from a tool name prefix (`gmail_search` → Email).
    #[must_use]
    pub fn infer_from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.starts_with("gmail") || lower.starts_with("email") || lower.starts_with("mail") {
            Self::Email
        } else if lower.starts_with("drive")
            || lower.starts_with("docs")
            || lower.starts_with("files")
        {
            Self::Files
        } else if lower.starts_with("calendar") {
            Self::Calendar
        } else {
            Self::Other
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Files => "files",
            Self::Calendar => "calendar",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_category_parse() {
        assert_eq!(
            RequestCategory::parse("general_knowledge"),
            Some(RequestCategory::GeneralKnowledge)
        );
        assert_eq!(
            RequestCategory::parse("Personal Data"),
            Some(RequestCategory::PersonalData)
        );
        assert_eq!(
            RequestCategory::parse("context-dependent"),
            Some(RequestCategory::ContextDependent)
        );
        assert_eq!(RequestCategory::parse("weather"), None);
    }

    #[test]
    fn test_request_category_serialization() {
        let json = serde_json::to_string(&RequestCategory::CurrentInfo).unwrap_or_default();
        assert_eq!(json, "\"CURRENT_INFO\"");
    }

    #[test]
    fn test_model_choices_exclude_user_disabled() {
        assert!(!RequestCategory::MODEL_CHOICES.contains(&RequestCategory::UserDisabled));
    }

    #[test]
    fn test_tool_category_infer() {
        assert_eq!(ToolCategory::infer_from_name("gmail_search"), ToolCategory::Email);
        assert_eq!(
            ToolCategory::infer_from_name("drive_list_files"),
            ToolCategory::Files
        );
        assert_eq!(
            ToolCategory::infer_from_name("calendar_list_events"),
            ToolCategory::Calendar
        );
        assert_eq!(ToolCategory::infer_from_name("web_fetch"), ToolCategory::Other);
    }

    #[test]
    fn test_tool_category_display() {
        assert_eq!(format!("{}", ToolCategory::Files), "files");
        assert_eq!(ToolCategory::parse("Gmail"), ToolCategory::Email);
    }
}
