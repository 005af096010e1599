// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Loom
//!
//! Tools are named, schema-validated units of work the model invokes through
//! tool-call directives. Every execution produces a well-formed `ToolResult`:
//! validation failures, errors and panics inside a tool become failure
//! results instead of propagating into the agent loop.
//!
//! Mutating tools (edit, git commit, run) ask for confirmation through the
//! context before they touch anything; a decline yields a declined result
//! and no mutation.

pub mod builtin;
pub mod definition;
pub mod executor;
pub mod permission;

pub use definition::*;
pub use executor::*;
pub use permission::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ToolSettings;
use crate::error::{LoomError, Result};
use crate::indexer::{FileData, Indexer};
use crate::session::undo::UndoEntry;
use crate::storage::StorageGateway;

/// One parsed directive from model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub params: Params,
    pub timestamp: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, params: Params) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            params,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of executing a `ToolCall`
///
/// `data` is set only on success and `error` only on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    /// The human declined the confirmation
    #[serde(default)]
    pub declined: bool,
    /// Set when a mutation was applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_entry: Option<UndoEntry>,
}

impl ToolResult {
    /// Create a successful result
    pub fn success(call_id: impl Into<String>, data: Value, execution_time_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms,
            declined: false,
            undo_entry: None,
        }
    }

    /// Create a failure result
    pub fn failure(call_id: impl Into<String>, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms,
            declined: false,
            undo_entry: None,
        }
    }

    /// Create a result for a declined confirmation
    pub fn declined(call_id: impl Into<String>, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            declined: true,
            ..Self::failure(call_id, message, execution_time_ms)
        }
    }

    /// Text fed back to the model
    pub fn to_model_text(&self) -> String {
        match (&self.data, &self.error) {
            (Some(data), _) => serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string()),
            (None, Some(error)) if self.declined => format!("Declined: {}", error),
            (None, Some(error)) => format!("Error: {}", error),
            (None, None) => String::new(),
        }
    }
}

/// What a tool's `run` produced
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Completed without mutating project files
    Done(Value),
    /// Mutated a file; `undo` reverts it
    Applied { data: Value, undo: UndoEntry },
    /// The human declined the confirmation
    Declined(String),
}

/// Grouping used for listing and for the confirmation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Read,
    Edit,
    Search,
    Analysis,
    Git,
    Run,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Read => "read",
            ToolCategory::Edit => "edit",
            ToolCategory::Search => "search",
            ToolCategory::Analysis => "analysis",
            ToolCategory::Git => "git",
            ToolCategory::Run => "run",
        }
    }
}

type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Context provided to tools during execution
#[derive(Clone)]
pub struct ToolContext {
    /// Project root; every tool path is relative to it
    pub root: PathBuf,
    pub project_name: String,
    pub storage: Arc<StorageGateway>,
    pub settings: ToolSettings,
    /// Keeps the index current after mutations
    indexer: Option<Arc<Indexer>>,
    confirmations: Option<ConfirmationSender>,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("root", &self.root)
            .field("project_name", &self.project_name)
            .field("trust_mode", &self.settings.trust_mode)
            .field("has_indexer", &self.indexer.is_some())
            .field("has_confirmations", &self.confirmations.is_some())
            .field("has_progress", &self.progress.is_some())
            .finish()
    }
}

impl ToolContext {
    pub fn new(
        root: impl AsRef<Path>,
        project_name: impl Into<String>,
        storage: Arc<StorageGateway>,
        settings: ToolSettings,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            project_name: project_name.into(),
            storage,
            settings,
            indexer: None,
            confirmations: None,
            progress: None,
        }
    }

    /// Context bound to an indexer's project, refreshing it after edits.
    pub fn for_indexer(indexer: Arc<Indexer>, settings: ToolSettings) -> Self {
        Self {
            indexer: Some(indexer.clone()),
            ..Self::new(
                indexer.root(),
                indexer.project_name(),
                indexer.storage().clone(),
                settings,
            )
        }
    }

    /// Route confirmation requests to a UI.
    pub fn with_confirmations(mut self, sender: ConfirmationSender) -> Self {
        self.confirmations = Some(sender);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn trust_mode(&self) -> bool {
        self.settings.trust_mode
    }

    /// Resolve a project-relative path, rejecting escapes from the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        crate::utils::resolve_project_path(&self.root, relative)
    }

    /// Emit a progress message.
    pub fn progress(&self, message: &str) {
        if let Some(progress) = &self.progress {
            progress(message);
        }
    }

    /// Ask the human to approve a mutation.
    ///
    /// Trust mode approves immediately. Without a confirmation channel, or
    /// when the request is dropped unanswered, the answer is no.
    pub async fn confirm(
        &self,
        tool_name: &str,
        message: impl Into<String>,
        diff: Option<DiffPreview>,
    ) -> bool {
        if self.settings.trust_mode {
            return true;
        }
        let Some(sender) = &self.confirmations else {
            tracing::debug!("No confirmation channel; declining {}", tool_name);
            return false;
        };
        let (request, response) = ConfirmationRequest::new(tool_name, message, diff);
        if sender.send(request).is_err() {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Bring the index in line with a file that was just written or removed.
    ///
    /// Without an indexer only an already stored `FileData` is refreshed, so
    /// later edits still pass the external-change check.
    pub async fn reindex(&self, relative: &str, content: Option<&str>) {
        let result = match (&self.indexer, content) {
            (Some(indexer), Some(content)) => indexer.update_file(relative, content).await.map(|_| ()),
            (Some(indexer), None) => indexer.remove_file(relative).await.map(|_| ()),
            (None, content) => self.refresh_stored_file(relative, content).await,
        };
        if let Err(e) = result {
            tracing::warn!("Index refresh for {} failed: {}", relative, e);
        }
    }

    async fn refresh_stored_file(&self, relative: &str, content: Option<&str>) -> Result<()> {
        if self.storage.get_file(&self.project_name, relative).await?.is_none() {
            return Ok(());
        }
        match content {
            Some(content) => {
                let data = FileData::from_content(content, Utc::now());
                self.storage.set_file(&self.project_name, relative, &data).await
            }
            None => self.storage.delete_file(&self.project_name, relative).await,
        }
    }
}

/// Trait for implementing tools
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec>;

    fn category(&self) -> ToolCategory;

    /// Whether this tool may ask for confirmation before acting
    fn requires_confirmation(&self) -> bool {
        false
    }

    /// Check params before any side effect; `None` means valid.
    fn validate_params(&self, params: &Params) -> Option<String> {
        validate_against(&self.parameters(), params)
    }

    /// Do the work. Errors are converted to failure results by `execute`.
    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome>;

    /// Validate, run, and convert every outcome into a `ToolResult`.
    async fn execute(&self, call_id: &str, params: &Params, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();
        let elapsed = |started: Instant| started.elapsed().as_millis() as u64;

        if let Some(problem) = self.validate_params(params) {
            let error = LoomError::ParamValidation(problem);
            return ToolResult::failure(call_id, error.to_string(), elapsed(started));
        }

        let outcome = AssertUnwindSafe(self.run(params, ctx)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(ToolOutcome::Done(data))) => ToolResult::success(call_id, data, elapsed(started)),
            Ok(Ok(ToolOutcome::Applied { data, undo })) => ToolResult {
                undo_entry: Some(undo.with_tool_call_id(call_id)),
                ..ToolResult::success(call_id, data, elapsed(started))
            },
            Ok(Ok(ToolOutcome::Declined(message))) => {
                ToolResult::declined(call_id, message, elapsed(started))
            }
            Ok(Err(e)) => ToolResult::failure(call_id, e.to_string(), elapsed(started)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ToolResult::failure(
                    call_id,
                    LoomError::ToolExecution(format!("{} panicked: {}", self.name(), message))
                        .to_string(),
                    elapsed(started),
                )
            }
        };

        tracing::debug!(
            "Tool {} ({}) finished in {}ms: success={}",
            self.name(),
            call_id,
            result.execution_time_ms,
            result.success
        );
        result
    }
}

/// Registry of available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with all built-in tools
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for tool in builtin::all() {
            registry.register(tool);
        }
        registry
    }

    /// Register a tool, replacing any with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Tools in one category, sorted by name
    pub fn by_category(&self, category: ToolCategory) -> Vec<&Arc<dyn Tool>> {
        let mut tools: Vec<&Arc<dyn Tool>> = self
            .tools
            .values()
            .filter(|t| t.category() == category)
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn sorted(&self) -> Vec<&Arc<dyn Tool>> {
        let mut tools: Vec<&Arc<dyn Tool>> = self.tools.values().collect();
        tools.sort_by(|a, b| (a.category(), a.name()).cmp(&(b.category(), b.name())));
        tools
    }

    /// Human- and model-readable description of every tool
    pub fn schema_description(&self) -> String {
        self.sorted()
            .iter()
            .map(|tool| {
                let params = tool.parameters();
                let mut block = format!(
                    "### {} [{}]\n{}\n",
                    tool.name(),
                    tool.category().as_str(),
                    tool.description()
                );
                if params.is_empty() {
                    block.push_str("Parameters: none\n");
                } else {
                    block.push_str("Parameters:\n");
                    block.push_str(&describe_params(&params));
                    block.push('\n');
                }
                if tool.requires_confirmation() {
                    block.push_str("Requires user confirmation.\n");
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON form of every tool schema
    pub fn schema_json(&self) -> Value {
        Value::Array(
            self.sorted()
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name(),
                        "description": tool.description(),
                        "category": tool.category(),
                        "requires_confirmation": tool.requires_confirmation(),
                        "parameters": tool.parameters(),
                    })
                })
                .collect(),
        )
    }

    /// Execute a call; unknown tools yield a failure result.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        match self.get(&call.name) {
            Some(tool) => tool.execute(&call.id, &call.params, ctx).await,
            None => ToolResult::failure(&call.id, format!("Unknown tool: {}", call.name), 0),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text back"
        }
        fn parameters(&self) -> Vec<ParamSpec> {
            ParamsBuilder::new().string("text", "Text", true).build()
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Read
        }
        async fn run(&self, params: &Params, _ctx: &ToolContext) -> Result<ToolOutcome> {
            match require_str(params, "text")? {
                "boom" => Err(LoomError::ToolExecution("boom".into())),
                "panic" => panic!("tool blew up"),
                text => Ok(ToolOutcome::Done(json!({ "text": text }))),
            }
        }
    }

    struct GuardedTool;

    #[async_trait]
    impl Tool for GuardedTool {
        fn name(&self) -> &str {
            "guarded"
        }
        fn description(&self) -> &str {
            "Mutates after confirmation"
        }
        fn parameters(&self) -> Vec<ParamSpec> {
            Vec::new()
        }
        fn category(&self) -> ToolCategory {
            ToolCategory::Edit
        }
        fn requires_confirmation(&self) -> bool {
            true
        }
        async fn run(&self, _params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
            if !ctx.confirm(self.name(), "Do it?", None).await {
                return Ok(ToolOutcome::Declined("User declined".into()));
            }
            Ok(ToolOutcome::Applied {
                data: json!({"done": true}),
                undo: UndoEntry::create("x.ts", "x".into(), "create x.ts"),
            })
        }
    }

    fn context(dir: &TempDir) -> ToolContext {
        ToolContext::new(
            dir.path(),
            "test",
            Arc::new(StorageGateway::in_memory()),
            ToolSettings::default(),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        registry.register(Arc::new(GuardedTool));
        registry
    }

    fn call(name: &str, params: Value) -> ToolCall {
        ToolCall::new("call_1", name, params.as_object().cloned().unwrap_or_default())
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = TempDir::new().unwrap();
        let result = registry()
            .execute(&call("echo", json!({"text": "hi"})), &context(&dir))
            .await;

        assert!(result.success);
        assert_eq!(result.data, Some(json!({"text": "hi"})));
        assert!(result.error.is_none());
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn test_validation_fails_before_run() {
        let dir = TempDir::new().unwrap();
        let result = registry()
            .execute(&call("echo", json!({"text": 5})), &context(&dir))
            .await;

        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().contains("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_errors_and_panics_become_failures() {
        let dir = TempDir::new().unwrap();
        let registry = registry();
        let ctx = context(&dir);

        let failed = registry.execute(&call("echo", json!({"text": "boom"})), &ctx).await;
        assert!(!failed.success);
        assert!(failed.error.unwrap().contains("boom"));

        let panicked = registry.execute(&call("echo", json!({"text": "panic"})), &ctx).await;
        assert!(!panicked.success);
        assert!(panicked.error.unwrap().contains("tool blew up"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = TempDir::new().unwrap();
        let result = registry().execute(&call("nope", json!({})), &context(&dir)).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_confirmation_declined_without_channel() {
        let dir = TempDir::new().unwrap();
        let result = registry().execute(&call("guarded", json!({})), &context(&dir)).await;

        assert!(!result.success);
        assert!(result.declined);
        assert!(result.undo_entry.is_none());
    }

    #[tokio::test]
    async fn test_confirmation_approved_over_channel() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = confirmation_channel();
        let ctx = context(&dir).with_confirmations(tx);

        let responder = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert_eq!(request.tool_name, "guarded");
            request.approve();
        });

        let result = registry().execute(&call("guarded", json!({})), &ctx).await;
        responder.await.unwrap();

        assert!(result.success);
        let undo = result.undo_entry.unwrap();
        assert_eq!(undo.tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn test_trust_mode_skips_channel() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir);
        ctx.settings.trust_mode = true;

        let result = registry().execute(&call("guarded", json!({})), &ctx).await;
        assert!(result.success);
    }

    #[test]
    fn test_registry_listing() {
        let registry = registry();
        assert!(registry.has("echo"));
        assert!(!registry.has("missing"));
        assert_eq!(registry.names(), vec!["echo", "guarded"]);
        assert_eq!(registry.by_category(ToolCategory::Edit).len(), 1);
        assert_eq!(registry.len(), 2);

        let schema = registry.schema_description();
        assert!(schema.contains("### echo [read]"));
        assert!(schema.contains("- text (string, required): Text"));
        assert!(schema.contains("Requires user confirmation."));
        assert_eq!(registry.schema_json().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_tool_result_model_text() {
        assert_eq!(
            ToolResult::failure("c", "nope", 0).to_model_text(),
            "Error: nope"
        );
        assert_eq!(
            ToolResult::declined("c", "User declined", 0).to_model_text(),
            "Declined: User declined"
        );
        assert!(ToolResult::success("c", json!({"a": 1}), 0)
            .to_model_text()
            .contains("\"a\": 1"));
    }
}
