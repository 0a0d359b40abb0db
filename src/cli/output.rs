//! Output formatting for CLI results.

use std::fmt::Write;

use serde::Serialize;

use crate::agent::{Classification, RequestResult, ToolDescriptor};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything but `json` is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }

    /// Serializes `value` as pretty JSON.
    #[must_use]
    pub fn to_json<T: Serialize + ?Sized>(self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

/// Formats a routed request.
///
/// Text output is the answer, followed by a diagnostic footer when
/// `verbose` is set.
#[must_use]
pub fn format_request_result(result: &RequestResult, format: OutputFormat, verbose: bool) -> String {
    match format {
        OutputFormat::Json => format.to_json(result),
        OutputFormat::Text => {
            let mut output = result.response.clone();
            if verbose {
                let category = result
                    .classification
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |c| c.category().to_string());
                let tools = if result.tools_used.is_empty() {
                    "none".to_string()
                } else {
                    result.tools_used.join(", ")
                };
                let _ = write!(
                    output,
                    "\n\n---\nApproach: {} | Category: {category} | Tools: {tools} | Time: {:.1}s",
                    result.approach,
                    result.elapsed.as_secs_f64()
                );
                for degradation in &result.degradations {
                    let _ = write!(output, "\nDegraded: {degradation:?}");
                }
            }
            output.push('\n');
            output
        }
    }
}

/// Formats a classification.
#[must_use]
pub fn format_classification(classification: &Classification, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(classification),
        OutputFormat::Text => {
            let mut output = format!(
                "{} (confidence {:.2}, tier {})\n",
                classification.category(),
                classification.confidence(),
                classification.tier_used().as_str()
            );
            if !classification.reasoning().is_empty() {
                let _ = writeln!(output, "Reasoning: {}", classification.reasoning());
            }
            if !classification.suggested_tools().is_empty() {
                let _ = writeln!(
                    output,
                    "Suggested tools: {}",
                    classification.suggested_tools().join(", ")
                );
            }
            output
        }
    }
}

/// Formats a tool catalogue.
#[must_use]
pub fn format_tool_list(tools: &[ToolDescriptor], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format.to_json(tools),
        OutputFormat::Text => {
            if tools.is_empty() {
                return "No tools available.\n".to_string();
            }
            let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
            let mut output = String::new();
            for tool in tools {
                let _ = writeln!(
                    output,
                    "{:<width$}  {:<8}  {}",
                    tool.name,
                    tool.category.as_str(),
                    tool.description
                );
            }
            output
        }
    }
}
