// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Working-session state
//!
//! A `Session` carries the conversation, the context budget, running stats,
//! the undo stack and the input history for one project. It is persisted by
//! `StorageGateway::save_session` after every turn.

pub mod undo;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tools::{ToolCall, ToolResult};
pub use undo::{apply_undo, UndoAction, UndoEntry, UndoStack, DEFAULT_UNDO_CAPACITY};

/// Default token-usage ratio above which the context should be compressed
pub const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.8;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_results: Vec<ToolResult>) -> Self {
        Self {
            tool_results,
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Context-window budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContextState {
    /// Project-relative paths currently loaded into the conversation
    pub files_in_context: Vec<String>,
    /// Share of the context window in use, 0.0 to 1.0
    pub token_usage: f64,
    pub needs_compression: bool,
}

impl ContextState {
    /// Set the usage ratio (clamped to 0..=1) and derive `needs_compression`.
    pub fn set_token_usage(&mut self, ratio: f64, threshold: f64) {
        let ratio = if ratio.is_finite() { ratio } else { 0.0 };
        self.token_usage = ratio.clamp(0.0, 1.0);
        self.needs_compression = self.token_usage >= threshold;
    }

    pub fn add_file(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.files_in_context.contains(&path) {
            self.files_in_context.push(path);
        }
    }

    pub fn remove_file(&mut self, path: &str) {
        self.files_in_context.retain(|p| p != path);
    }
}

/// Running totals for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionStats {
    pub total_tokens: u64,
    pub total_time_ms: u64,
    pub tool_calls: u64,
    pub edits_applied: u64,
    pub edits_rejected: u64,
}

/// One working session against a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project_name: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub history: Vec<ChatMessage>,
    pub context: ContextState,
    pub undo_stack: UndoStack,
    pub stats: SessionStats,
    pub input_history: Vec<String>,
}

impl Session {
    /// Start a session with the default undo capacity.
    pub fn new(project_name: impl Into<String>) -> Self {
        Self::with_undo_capacity(project_name, DEFAULT_UNDO_CAPACITY)
    }

    pub fn with_undo_capacity(project_name: impl Into<String>, capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            created_at: now,
            last_activity_at: now,
            history: Vec::new(),
            context: ContextState::default(),
            undo_stack: UndoStack::new(capacity),
            stats: SessionStats::default(),
            input_history: Vec::new(),
        }
    }

    /// Bump `last_activity_at`.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.history.push(message);
        self.touch();
    }

    /// Append to the input history unless empty or equal to the previous entry.
    pub fn add_input_history(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }
        if self.input_history.last().map(String::as_str) == Some(input) {
            return;
        }
        self.input_history.push(input.to_string());
    }

    pub fn push_undo(&mut self, entry: UndoEntry) {
        self.undo_stack.push(entry);
    }

    pub fn pop_undo(&mut self) -> Option<UndoEntry> {
        self.undo_stack.pop()
    }

    /// Fold one tool outcome into the stats; returns its undo entry, if any.
    pub fn record_tool_result(&mut self, result: &ToolResult) -> Option<UndoEntry> {
        self.stats.tool_calls += 1;
        self.stats.total_time_ms += result.execution_time_ms;
        if result.declined {
            self.stats.edits_rejected += 1;
        }
        let entry = result.undo_entry.clone()?;
        self.stats.edits_applied += 1;
        self.push_undo(entry.clone());
        Some(entry)
    }

    /// Account for a model round-trip.
    pub fn record_model_usage(&mut self, tokens: u64, elapsed_ms: u64) {
        self.stats.total_tokens += tokens;
        self.stats.total_time_ms += elapsed_ms;
    }

    /// Recompute the context budget from the latest prompt size.
    pub fn update_token_usage(&mut self, prompt_tokens: u64, window: u64, threshold: f64) {
        let ratio = if window == 0 {
            1.0
        } else {
            prompt_tokens as f64 / window as f64
        };
        self.context.set_token_usage(ratio, threshold);
    }
}
