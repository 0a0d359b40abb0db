//! Sequential tool execution with inter-step parameter resolution.
//!
//! Steps run strictly in plan order. Before each call, dynamic references
//! are resolved against the results of earlier successful steps; a step
//! never sees a later one. Every failure is recorded and execution moves
//! on to the next step.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::outcome::serialize_millis;
use super::planner::{ParamValue, ToolPlanStep};
use super::tool::{ToolOutcome, ToolProvider, ToolRegistry, payload_text};
use crate::core::{DynamicRef, IdExtractor};

/// The outcome of one executed (or skipped) plan step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolExecutionRecord {
    /// Tool that was called.
    pub tool: String,
    /// Parameters after reference resolution.
    pub params_used: serde_json::Value,
    /// Whether the call succeeded.
    pub success: bool,
    /// Tool payload on success (and on reported failure, when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time of the call.
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ToolExecutionRecord {
    /// Returns the payload as text (empty if there is none).
    #[must_use]
    pub fn result_text(&self) -> String {
        self.result.as_ref().map(payload_text).unwrap_or_default()
    }

    fn failed(
        tool: &str,
        params_used: serde_json::Value,
        error: String,
        result: Option<serde_json::Value>,
        elapsed: Duration,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            params_used,
            success: false,
            result,
            error: Some(error),
            elapsed,
        }
    }
}

/// Executes tool plans one step at a time.
#[derive(Debug, Clone)]
pub struct ToolExecutionEngine {
    tool_timeout: Duration,
}

impl ToolExecutionEngine {
    /// Creates an engine bounding each tool call by `tool_timeout`.
    #[must_use]
    pub const fn new(tool_timeout: Duration) -> Self {
        Self { tool_timeout }
    }

    /// Runs `steps` in order and returns one record per step.
    ///
    /// With an empty registry nothing runs and no records are returned.
    /// Steps naming tools outside the registry are recorded as failures
    /// without a call.
    pub async fn execute(
        &self,
        steps: &[ToolPlanStep],
        user_id: &str,
        provider: &dyn ToolProvider,
        registry: &ToolRegistry,
    ) -> Vec<ToolExecutionRecord> {
        if registry.is_empty() {
            warn!(user_id, "no tools available; execution skipped");
            return Vec::new();
        }

        let mut records: Vec<ToolExecutionRecord> = Vec::with_capacity(steps.len());
        for (idx, step) in steps.iter().enumerate() {
            let params = resolve_params(step, &records);

            if !registry.contains(&step.tool) {
                warn!(user_id, step = idx, tool = %step.tool, "tool not in registry; step skipped");
                records.push(ToolExecutionRecord::failed(
                    &step.tool,
                    params,
                    format!("tool '{}' is not available", step.tool),
                    None,
                    Duration::ZERO,
                ));
                continue;
            }

            let record = self.call(&step.tool, params, provider).await;
            info!(
                user_id,
                step = idx,
                tool = %record.tool,
                success = record.success,
                elapsed_ms = u64::try_from(record.elapsed.as_millis()).unwrap_or(u64::MAX),
                "tool step finished"
            );
            records.push(record);
        }
        records
    }

    async fn call(
        &self,
        tool: &str,
        params: serde_json::Value,
        provider: &dyn ToolProvider,
    ) -> ToolExecutionRecord {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.tool_timeout, provider.call_tool(tool, &params)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(ToolOutcome {
                success: true,
                response,
            })) => ToolExecutionRecord {
                tool: tool.to_string(),
                params_used: params,
                success: true,
                result: Some(response),
                error: None,
                elapsed,
            },
            Ok(Ok(ToolOutcome {
                success: false,
                response,
            })) => {
                let reported = payload_text(&response);
                let error = if reported.is_empty() {
                    "tool reported failure".to_string()
                } else {
                    reported
                };
                ToolExecutionRecord::failed(tool, params, error, Some(response), elapsed)
            }
            Ok(Err(e)) => ToolExecutionRecord::failed(tool, params, e.to_string(), None, elapsed),
            Err(_) => ToolExecutionRecord::failed(
                tool,
                params,
                format!("timed out after {}s", self.tool_timeout.as_secs()),
                None,
                elapsed,
            ),
        }
    }
}

/// Builds the concrete parameter object for `step`, resolving dynamic
/// references against `records` (the steps before it).
///
/// Unresolvable references are passed through as their placeholder text.
#[must_use]
pub fn resolve_params(step: &ToolPlanStep, records: &[ToolExecutionRecord]) -> serde_json::Value {
    let params: serde_json::Map<String, serde_json::Value> = step
        .params
        .iter()
        .map(|(key, value)| {
            let resolved = match value {
                ParamValue::Literal(literal) => literal.clone(),
                ParamValue::DynamicRef(reference) => {
                    serde_json::Value::String(resolve_reference(reference, records).unwrap_or_else(|| {
                        debug!(param = %key, placeholder = %reference.placeholder, "reference unresolved");
                        reference.placeholder.clone()
                    }))
                }
            };
            (key.clone(), resolved)
        })
        .collect();
    serde_json::Value::Object(params)
}

/// Resolves one reference: the named source step first, then every earlier
/// successful step, most recent first.
#[must_use]
pub fn resolve_reference(
    reference: &DynamicRef,
    records: &[ToolExecutionRecord],
) -> Option<String> {
    let extract = |record: &ToolExecutionRecord| -> Option<String> {
        if !record.success {
            return None;
        }
        let text = record.result_text();
        reference.extractor.extract(&text).or_else(|| {
            // A bound step with a specific extractor still accepts any id shape.
            (reference.extractor != IdExtractor::Any)
                .then(|| IdExtractor::Any.extract(&text))
                .flatten()
        })
    };

    if let Some(found) = reference
        .source
        .and_then(|idx| records.get(idx))
        .and_then(extract)
    {
        return Some(found);
    }

    records.iter().rev().find_map(extract)
}
