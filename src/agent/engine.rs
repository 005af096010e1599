// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The conversational tool loop
//!
//! One user message becomes up to `max_tool_rounds` model round-trips. Each
//! reply is parsed for tool calls, the calls run in order through the
//! executor, and their results go back to the model as the next message. The
//! session is persisted after every round.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{AgentSettings, SessionSettings, Settings};
use crate::error::{LoomError, Result};
use crate::indexer::normalize_rel_path;
use crate::session::{apply_undo, ChatMessage, ContextState, Role, Session, UndoEntry};
use crate::tools::{ToolCall, ToolContext, ToolExecutor, ToolResult};

use super::llm::LlmClient;
use super::prompt::build_system_prompt;
use super::response_parser::ResponseParser;

/// Tools whose `path` parameter names a file the model has now seen
const READ_TOOLS: &[&str] = &["get_lines", "get_function", "get_class", "get_structure"];

/// What one user message produced
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Prose from the last model reply, tool markup removed
    pub text: String,
    /// Every tool result of the turn, in execution order
    pub tool_results: Vec<ToolResult>,
    /// The last reply stopped inside an unclosed tool call
    pub incomplete_tool_call: bool,
    /// Model round-trips used
    pub rounds: usize,
    /// The turn stopped because the round limit was reached with calls pending
    pub round_limit_reached: bool,
}

/// Drives the model and the tools for one project
pub struct Agent {
    llm: Arc<dyn LlmClient>,
    executor: ToolExecutor,
    parser: ResponseParser,
    agent_settings: AgentSettings,
    session_settings: SessionSettings,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, executor: ToolExecutor, settings: &Settings) -> Self {
        Self {
            llm,
            executor,
            parser: ResponseParser::default(),
            agent_settings: settings.agent.clone(),
            session_settings: settings.session.clone(),
        }
    }

    pub fn context(&self) -> &ToolContext {
        self.executor.context()
    }

    /// Fresh session for this agent's project.
    pub fn new_session(&self) -> Session {
        Session::with_undo_capacity(
            self.context().project_name.clone(),
            self.session_settings.undo_capacity,
        )
    }

    /// Load a stored session; it must belong to this project.
    pub async fn resume_session(&self, id: &str) -> Result<Session> {
        let session = self
            .context()
            .storage
            .load_session(id, self.session_settings.undo_capacity)
            .await?
            .ok_or_else(|| LoomError::Session(format!("Session not found: {}", id)))?;
        if session.project_name != self.context().project_name {
            return Err(LoomError::Session(format!(
                "Session {} belongs to project {}",
                id, session.project_name
            )));
        }
        Ok(session)
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        self.context().storage.save_session(session).await
    }

    fn conversation(&self, session: &Session, system: String) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(session.history.len() + 1);
        messages.push(ChatMessage::new(Role::System, system));
        messages.extend(session.history.iter().cloned());
        messages
    }

    /// Run one user message to completion.
    pub async fn handle_message(&self, session: &mut Session, input: &str) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Err(LoomError::InvalidInput("Message is empty".to_string()));
        }

        session.add_input_history(input);
        session.add_message(ChatMessage::user(input));

        let ctx = self.context();
        let project = match ctx.storage.get_project(&ctx.project_name).await {
            Ok(project) => project,
            Err(e) => {
                tracing::warn!(target: "loom.agent", error = %e, "project record unavailable");
                None
            }
        };

        let max_rounds = self.agent_settings.max_tool_rounds.max(1);
        let mut outcome = TurnOutcome::default();

        for round in 1..=max_rounds {
            outcome.rounds = round;
            tracing::debug!(
                target: "loom.agent",
                round,
                history = session.history.len(),
                "starting model round"
            );

            let system = build_system_prompt(self.executor.registry(), project.as_ref(), &session.context);
            let messages = self.conversation(session, system);

            let started = Instant::now();
            let response = match self.llm.chat(&messages).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(target: "loom.agent", error = %e, "model request failed");
                    self.persist(session).await?;
                    return Err(e);
                }
            };
            session.record_model_usage(response.total_tokens(), started.elapsed().as_millis() as u64);
            session.update_token_usage(
                response.prompt_tokens,
                self.session_settings.context_window_tokens,
                self.session_settings.compression_threshold,
            );

            let parsed = self.parser.parse(&response.content);
            session.add_message(ChatMessage::assistant(
                response.content.clone(),
                parsed.tool_calls.clone(),
            ));
            outcome.text = parsed.text;
            outcome.incomplete_tool_call = parsed.incomplete_tool_call;

            if parsed.tool_calls.is_empty() {
                break;
            }

            tracing::info!(
                target: "loom.agent",
                round,
                tool_calls = parsed.tool_calls.len(),
                "executing tool calls"
            );
            let results = self
                .executor
                .execute_all(&parsed.tool_calls, |call, result| {
                    session.record_tool_result(result);
                    track_context(&mut session.context, call, result);
                })
                .await;

            session.add_message(ToolExecutor::results_to_message(&parsed.tool_calls, results.clone()));
            outcome.tool_results.extend(results);
            self.persist(session).await?;

            if parsed.incomplete_tool_call {
                break;
            }
            if round == max_rounds {
                outcome.round_limit_reached = true;
                tracing::warn!(target: "loom.agent", max_rounds, "tool round limit reached");
            }
        }

        self.persist(session).await?;
        tracing::info!(
            target: "loom.agent",
            rounds = outcome.rounds,
            tool_results = outcome.tool_results.len(),
            incomplete = outcome.incomplete_tool_call,
            "turn complete"
        );
        Ok(outcome)
    }

    /// Revert the most recent applied edit of a session.
    ///
    /// Returns `None` when there is nothing to undo. A conflicting entry is put
    /// back on the stack and the error returned.
    pub async fn undo_last(&self, session: &mut Session) -> Result<Option<UndoEntry>> {
        let Some(entry) = session.pop_undo() else {
            return Ok(None);
        };

        let ctx = self.context();
        if let Err(e) = apply_undo(&ctx.root, &entry).await {
            session.push_undo(entry);
            return Err(e);
        }

        ctx.reindex(&entry.file_path, entry.previous_content.as_deref()).await;
        match &entry.previous_content {
            Some(_) => session.context.add_file(entry.file_path.clone()),
            None => session.context.remove_file(&entry.file_path),
        }
        session.touch();
        self.persist(session).await?;
        Ok(Some(entry))
    }
}

/// Keep the list of files the model has looked at in step with tool results.
fn track_context(context: &mut ContextState, call: &ToolCall, result: &ToolResult) {
    if !result.success {
        return;
    }
    let Some(path) = call.params.get("path").and_then(|v| v.as_str()) else {
        return;
    };
    let path = normalize_rel_path(path);
    if call.name == "delete_file" {
        context.remove_file(&path);
    } else if READ_TOOLS.contains(&call.name.as_str())
        || matches!(call.name.as_str(), "edit_lines" | "create_file")
    {
        context.add_file(path);
    }
}
