// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Command and test runner tools
//!
//! Commands run through `sh -c` in the project root with stdin closed and a
//! timeout. Block-listed commands are refused outright.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{LoomError, Result};
use crate::tools::{
    opt_str, opt_usize, require_str, truncate_output, ParamSpec, Params, ParamsBuilder, Tool,
    ToolCategory, ToolContext, ToolOutcome,
};

use super::project_rel;

/// Hard ceiling on any command timeout, in seconds
const MAX_TIMEOUT_SECS: u64 = 600;

const MAX_STDOUT: usize = 30_000;
const MAX_STDERR: usize = 10_000;

/// Patterns that are always refused
const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    "mkfs",
    ":(){:|:&};:",
    "> /dev/sda",
    "dd if=/dev/zero of=/dev",
    "sudo ",
    "shutdown",
    "reboot",
    "poweroff",
    "halt",
    "init 0",
    "init 6",
];

/// Read-only command prefixes that run without confirmation
const ALLOWED_PREFIXES: &[&str] = &[
    "ls",
    "pwd",
    "cat",
    "head",
    "tail",
    "wc",
    "echo",
    "git status",
    "git diff",
    "git log",
    "node --version",
    "npm --version",
    "npx tsc --noEmit",
];

/// Shell syntax that can chain or redirect past an allow-listed prefix
const SHELL_OPERATORS: &[&str] = &[";", "&&", "||", "|", ">", "<", "`", "$(", "\n"];

/// Captured result of a finished command
#[derive(Debug)]
struct CommandOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Run `command` under `sh -c`, killing it when the timeout elapses.
async fn run_shell(command: &str, cwd: &Path, timeout_secs: u64) -> Result<CommandOutput> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LoomError::ToolExecution(format!("Failed to spawn command: {}", e)))?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(LoomError::ToolExecution(format!("Failed to execute command: {}", e))),
        Err(_) => Err(LoomError::ToolExecution(format!(
            "Command timed out after {} seconds",
            timeout_secs
        ))),
    }
}

fn output_json(command: &str, output: &CommandOutput) -> Value {
    json!({
        "command": command,
        "exit_code": output.exit_code,
        "stdout": truncate_output(&output.stdout, MAX_STDOUT),
        "stderr": truncate_output(&output.stderr, MAX_STDERR),
    })
}

/// Single-quote a word for `sh`.
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Tool for executing shell commands
pub struct RunCommandTool {
    blocked: Vec<String>,
}

impl RunCommandTool {
    pub fn new() -> Self {
        Self {
            blocked: BLOCKED_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Check if a command is blocked
    fn is_blocked(&self, command: &str, extra: &[String]) -> bool {
        let lower = command.to_lowercase();
        self.blocked
            .iter()
            .chain(extra)
            .any(|p| lower.contains(&p.to_lowercase()))
            || is_dangerous_rm_root(&lower)
    }

    /// Whether a command may run without asking
    fn is_allowed(command: &str, extra: &[String]) -> bool {
        let command = command.trim();
        if SHELL_OPERATORS.iter().any(|op| command.contains(op)) {
            return false;
        }
        ALLOWED_PREFIXES
            .iter()
            .copied()
            .chain(extra.iter().map(String::as_str))
            .any(|prefix| command == prefix || command.starts_with(&format!("{} ", prefix)))
    }
}

impl Default for RunCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

/// `rm` with a recursive flag aimed at `/` in any spelling.
fn is_dangerous_rm_root(command: &str) -> bool {
    let tokens: Vec<&str> = command.split_whitespace().collect();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i] != "rm" {
            i += 1;
            continue;
        }

        let mut recursive = false;
        let mut root_target = false;
        let mut j = i + 1;
        while j < tokens.len() {
            let token = tokens[j]
                .trim_matches(|ch: char| matches!(ch, '"' | '\'' | '`' | ';' | '|' | '&'));
            if let Some(flags) = token.strip_prefix('-') {
                if token == "--recursive" || (!token.starts_with("--") && flags.contains(['r', 'R'])) {
                    recursive = true;
                }
            } else if token == "/" || token == "/*" {
                root_target = true;
            }
            j += 1;
        }

        if recursive && root_target {
            return true;
        }
        i = j;
    }

    false
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the project root and return exit code, stdout and stderr."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("command", "The shell command to execute", true)
            .integer("timeout", "Timeout in seconds (max 600)", false)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Run
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let command = require_str(params, "command")?.trim();
        let timeout_secs = opt_usize(params, "timeout")
            .map(|t| t as u64)
            .unwrap_or(ctx.settings.command_timeout_secs)
            .clamp(1, MAX_TIMEOUT_SECS);

        if self.is_blocked(command, &ctx.settings.blocked_commands) {
            return Err(LoomError::ToolExecution(
                "This command has been blocked for safety reasons.".to_string(),
            ));
        }

        if !Self::is_allowed(command, &ctx.settings.allowed_commands)
            && !ctx.confirm(self.name(), format!("Execute: {}", command), None).await
        {
            return Ok(ToolOutcome::Declined(format!("User declined: {}", command)));
        }

        ctx.progress(&format!("$ {}", command));
        let output = run_shell(command, &ctx.root, timeout_secs).await?;
        Ok(ToolOutcome::Done(output_json(command, &output)))
    }
}

/// Test framework found in `package.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestRunner {
    Vitest,
    Jest,
    Mocha,
    NpmScript,
}

impl TestRunner {
    fn as_str(&self) -> &'static str {
        match self {
            TestRunner::Vitest => "vitest",
            TestRunner::Jest => "jest",
            TestRunner::Mocha => "mocha",
            TestRunner::NpmScript => "npm",
        }
    }

    /// Shell command running `path` and tests matching `filter`.
    fn command(&self, path: Option<&str>, filter: Option<&str>) -> String {
        let mut parts: Vec<String> = match self {
            TestRunner::Vitest => vec!["npx".into(), "vitest".into(), "run".into()],
            TestRunner::Jest => vec!["npx".into(), "jest".into()],
            TestRunner::Mocha => vec!["npx".into(), "mocha".into()],
            TestRunner::NpmScript => vec!["npm".into(), "test".into(), "--".into()],
        };
        if let Some(path) = path {
            parts.push(shell_quote(path));
        }
        if let Some(filter) = filter {
            parts.push(if *self == TestRunner::Mocha { "--grep" } else { "-t" }.into());
            parts.push(shell_quote(filter));
        }
        parts.join(" ")
    }
}

/// Pick the runner declared in `package.json`.
fn detect_test_runner(root: &Path) -> Result<TestRunner> {
    let manifest = root.join("package.json");
    let content = std::fs::read_to_string(&manifest).map_err(|_| {
        LoomError::ToolExecution("No package.json found; cannot detect a test runner".into())
    })?;
    let package: Value = serde_json::from_str(&content)?;

    let has_dep = |name: &str| {
        ["dependencies", "devDependencies"]
            .iter()
            .any(|section| package[section].get(name).is_some())
    };
    if has_dep("vitest") {
        return Ok(TestRunner::Vitest);
    }
    if has_dep("jest") {
        return Ok(TestRunner::Jest);
    }
    if has_dep("mocha") {
        return Ok(TestRunner::Mocha);
    }
    match package["scripts"]["test"].as_str() {
        Some(script) if !script.contains("no test specified") => Ok(TestRunner::NpmScript),
        _ => Err(LoomError::ToolExecution(
            "No test runner detected in package.json".into(),
        )),
    }
}

/// Tool for running the project's test suite
pub struct RunTestsTool;

#[async_trait]
impl Tool for RunTestsTool {
    fn name(&self) -> &str {
        "run_tests"
    }

    fn description(&self) -> &str {
        "Run the project's tests (vitest, jest, mocha or the npm test script), optionally for one path or test name."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "Test file or directory", false)
            .string("filter", "Only run tests whose name matches", false)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Run
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let path = opt_str(params, "path").map(|p| project_rel(ctx, p)).transpose()?;
        let filter = opt_str(params, "filter");
        let runner = detect_test_runner(&ctx.root)?;
        let command = runner.command(path.as_deref(), filter);

        ctx.progress(&format!("Running tests: {}", command));
        let output = run_shell(&command, &ctx.root, ctx.settings.command_timeout_secs.clamp(1, MAX_TIMEOUT_SECS)).await?;

        let mut data = output_json(&command, &output);
        data["runner"] = json!(runner.as_str());
        data["passed"] = json!(output.exit_code == 0);
        Ok(ToolOutcome::Done(data))
    }
}
