// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Confirmation gate for mutating tools
//!
//! A tool that wants to mutate sends a `ConfirmationRequest` through the
//! channel held by its `ToolContext` and suspends until the receiving side
//! answers. Dropping the request without answering counts as a decline.

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{self, BufRead, Write};
use tokio::sync::{mpsc, oneshot};

/// Line-level preview of a pending file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPreview {
    pub file_path: String,
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
    /// 1-based line where the change starts
    pub start_line: usize,
}

impl DiffPreview {
    /// Render as a unified-style hunk.
    pub fn render(&self) -> String {
        let mut out = format!(
            "--- {}\n+++ {}\n@@ -{},{} +{},{} @@\n",
            self.file_path,
            self.file_path,
            self.start_line,
            self.old_lines.len(),
            self.start_line,
            self.new_lines.len()
        );
        for line in &self.old_lines {
            out.push_str(&format!("-{}\n", line));
        }
        for line in &self.new_lines {
            out.push_str(&format!("+{}\n", line));
        }
        out
    }
}

/// A pending approval, answered through `respond`
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub message: String,
    pub diff: Option<DiffPreview>,
    respond: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    pub fn new(
        tool_name: impl Into<String>,
        message: impl Into<String>,
        diff: Option<DiffPreview>,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (respond, rx) = oneshot::channel();
        (
            Self {
                tool_name: tool_name.into(),
                message: message.into(),
                diff,
                respond,
            },
            rx,
        )
    }

    /// Answer the request. A tool that stopped waiting is ignored.
    pub fn answer(self, approved: bool) {
        let _ = self.respond.send(approved);
    }

    pub fn approve(self) {
        self.answer(true);
    }

    pub fn decline(self) {
        self.answer(false);
    }
}

pub type ConfirmationSender = mpsc::UnboundedSender<ConfirmationRequest>;
pub type ConfirmationReceiver = mpsc::UnboundedReceiver<ConfirmationRequest>;

/// Create the channel a UI listens on for confirmation requests.
pub fn confirmation_channel() -> (ConfirmationSender, ConfirmationReceiver) {
    mpsc::unbounded_channel()
}

/// Response to a confirmation prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionResponse {
    /// Allow this specific action
    Allow,
    /// Deny this specific action
    Deny,
    /// Allow all actions for this tool in this session
    AllowAll,
    /// Allow all actions for all tools in this session
    TrustAll,
}

impl PermissionResponse {
    /// Parse a y/n/a/t answer; anything else denies.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "y" | "yes" => PermissionResponse::Allow,
            "a" | "allow" => PermissionResponse::AllowAll,
            "t" | "trust" => PermissionResponse::TrustAll,
            _ => PermissionResponse::Deny,
        }
    }
}

/// Answers confirmation requests, remembering session-wide grants
#[derive(Debug, Default)]
pub struct PermissionManager {
    /// Tools that have been granted "allow all"
    allowed_tools: HashSet<String>,
    trust_mode: bool,
}

impl PermissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trust_mode() -> Self {
        Self {
            allowed_tools: HashSet::new(),
            trust_mode: true,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.trust_mode
    }

    /// Whether a prompt is needed for this tool
    pub fn needs_prompt(&self, tool_name: &str) -> bool {
        !self.trust_mode && !self.allowed_tools.contains(tool_name)
    }

    /// Record a prompt answer and return whether the action is approved.
    pub fn record(&mut self, tool_name: &str, response: PermissionResponse) -> bool {
        match response {
            PermissionResponse::Allow => true,
            PermissionResponse::Deny => false,
            PermissionResponse::AllowAll => {
                self.allowed_tools.insert(tool_name.to_string());
                true
            }
            PermissionResponse::TrustAll => {
                self.trust_mode = true;
                true
            }
        }
    }

    /// Answer one request, prompting only when needed.
    pub fn resolve<P>(&mut self, request: ConfirmationRequest, prompt: P)
    where
        P: FnOnce(&ConfirmationRequest) -> io::Result<PermissionResponse>,
    {
        if !self.needs_prompt(&request.tool_name) {
            request.approve();
            return;
        }
        let approved = match prompt(&request) {
            Ok(response) => self.record(&request.tool_name, response),
            Err(e) => {
                tracing::warn!("Confirmation prompt failed: {}", e);
                false
            }
        };
        request.answer(approved);
    }
}

/// Show a request on the terminal and read the answer from `input`.
pub fn prompt_terminal(
    request: &ConfirmationRequest,
    input: &mut impl BufRead,
) -> io::Result<PermissionResponse> {
    let mut stdout = io::stdout();

    println!();
    stdout.execute(SetForegroundColor(Color::Yellow))?;
    print!("? ");
    stdout.execute(ResetColor)?;
    println!("Tool '{}' wants to:", request.tool_name);
    println!("  {}", request.message);

    if let Some(diff) = &request.diff {
        for line in diff.render().lines() {
            let color = match line.chars().next() {
                Some('+') if !line.starts_with("+++") => Some(Color::Green),
                Some('-') if !line.starts_with("---") => Some(Color::Red),
                _ => None,
            };
            if let Some(color) = color {
                stdout.execute(SetForegroundColor(color))?;
            }
            println!("  {}", line);
            stdout.execute(ResetColor)?;
        }
    }

    println!();
    print!("Allow? [y]es / [n]o / [a]llow all for this tool / [t]rust all: ");
    stdout.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(PermissionResponse::parse(&answer))
}
