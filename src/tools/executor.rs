// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution engine
//!
//! Runs the calls of one model turn strictly in order. Each call, including
//! any confirmation wait, completes before the next one starts.

use std::sync::Arc;

use crate::session::ChatMessage;

use super::{ToolCall, ToolContext, ToolRegistry, ToolResult};

/// Longest tool output fed back to the model, in bytes
const MAX_RESULT_CHARS: usize = 30_000;

/// Sequential executor bound to one registry and context
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ToolExecutor {
    /// Create a new executor
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self { registry, context }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Execute one call
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        self.context.progress(&format!("Using tool: {}", call.name));
        let result = self.registry.execute(call, &self.context).await;

        if result.success {
            tracing::info!("Tool {} succeeded in {}ms", call.name, result.execution_time_ms);
        } else {
            tracing::info!(
                "Tool {} failed: {}",
                call.name,
                truncate_output(result.error.as_deref().unwrap_or_default(), 200)
            );
        }
        result
    }

    /// Execute calls in order, reporting each result as it completes.
    pub async fn execute_all<F>(&self, calls: &[ToolCall], mut on_result: F) -> Vec<ToolResult>
    where
        F: FnMut(&ToolCall, &ToolResult),
    {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute(call).await;
            on_result(call, &result);
            results.push(result);
        }
        results
    }

    /// Convert tool results to a message for the conversation
    pub fn results_to_message(calls: &[ToolCall], results: Vec<ToolResult>) -> ChatMessage {
        let content = results
            .iter()
            .map(|result| {
                let name = calls
                    .iter()
                    .find(|c| c.id == result.call_id)
                    .map(|c| c.name.as_str())
                    .unwrap_or("unknown");
                let status = if result.success {
                    "success"
                } else if result.declined {
                    "declined"
                } else {
                    "error"
                };
                format!(
                    "<tool_result name=\"{}\" id=\"{}\" status=\"{}\">\n{}\n</tool_result>",
                    name,
                    result.call_id,
                    status,
                    truncate_output(&result.to_model_text(), MAX_RESULT_CHARS)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        ChatMessage::tool(content, results)
    }
}

/// Truncate on a char boundary, marking the cut.
pub fn truncate_output(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... (output truncated)", &s[..end])
}
