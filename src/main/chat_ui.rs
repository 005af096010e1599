// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::collections::HashMap;
use std::io::{self, Write};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use indicatif::{ProgressBar, ProgressStyle};

use loom::agent::TurnOutcome;
use loom::indexer::{IndexPhase, IndexStats, IndexingProgress};
use loom::session::Session;

/// Progress bar for an indexing run; created lazily once the total is known.
pub(super) struct IndexProgress {
    bar: Option<ProgressBar>,
}

impl IndexProgress {
    pub(super) fn new() -> Self {
        Self { bar: None }
    }

    pub(super) fn update(&mut self, progress: &IndexingProgress) {
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(progress.total as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        });
        bar.set_length(progress.total as u64);
        bar.set_position(progress.current as u64);
        let phase = match progress.phase {
            IndexPhase::Scanning => "scanning",
            IndexPhase::Parsing => "parsing",
            IndexPhase::Analyzing => "analyzing",
            IndexPhase::Indexing => "indexing",
        };
        bar.set_message(format!("{} {}", phase, progress.current_file));
    }

    pub(super) fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

pub(super) fn print_index_summary(stats: &IndexStats) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("✓ ");
    stdout.execute(ResetColor)?;
    println!(
        "Indexed {} files ({} parsed, {} with parse errors) in {}ms",
        stats.files_scanned, stats.files_parsed, stats.parse_errors, stats.time_ms
    );
    Ok(())
}

pub(super) fn print_welcome(project: &str, session: &Session, trust: bool) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("loom · {}", project);
    stdout.execute(ResetColor)?;
    println!("  session {}", session.id);
    if !session.history.is_empty() {
        println!("  {} messages so far", session.history.len());
    }
    if trust {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!("  trust mode: edits and commands run without asking");
        stdout.execute(ResetColor)?;
    }
    println!("  /help for commands, /exit to quit");
    println!();
    Ok(())
}

pub(super) fn print_help() {
    println!("Commands:");
    println!("  /undo     revert the last applied edit");
    println!("  /stats    show session statistics");
    println!("  /reindex  re-scan the project");
    println!("  /help     show this help");
    println!("  /exit     quit");
}

pub(super) fn read_user_input() -> io::Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("you: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

pub(super) fn print_tool_progress(message: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::DarkGrey));
    println!("  ╭─ {}", message);
    let _ = stdout.execute(ResetColor);
}

/// Tool names by call id, taken from the assistant messages of a session.
fn tool_names(session: &Session) -> HashMap<&str, &str> {
    session
        .history
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .map(|c| (c.id.as_str(), c.name.as_str()))
        .collect()
}

pub(super) fn print_turn(outcome: &TurnOutcome, session: &Session) -> io::Result<()> {
    let mut stdout = io::stdout();
    let names = tool_names(session);

    for result in &outcome.tool_results {
        let name = names.get(result.call_id.as_str()).copied().unwrap_or("tool");
        let (color, mark) = if result.success {
            (Color::Green, "✓")
        } else if result.declined {
            (Color::Yellow, "⊘")
        } else {
            (Color::Red, "✗")
        };
        stdout.execute(SetForegroundColor(color))?;
        print!("  {} ", mark);
        stdout.execute(ResetColor)?;
        match &result.error {
            Some(error) if !result.success => println!("{}: {}", name, error),
            _ => println!("{} ({}ms)", name, result.execution_time_ms),
        }
    }

    println!();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    print!("loom: ");
    stdout.execute(ResetColor)?;
    println!("{}", outcome.text);

    if outcome.incomplete_tool_call {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!("  (the reply ended inside an unfinished tool call; ask it to continue)");
        stdout.execute(ResetColor)?;
    }
    if outcome.round_limit_reached {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!("  (stopped after {} tool rounds)", outcome.rounds);
        stdout.execute(ResetColor)?;
    }
    if session.context.needs_compression {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!(
            "  (context {:.0}% full; consider starting a new session)",
            session.context.token_usage * 100.0
        );
        stdout.execute(ResetColor)?;
    }
    println!();
    Ok(())
}

pub(super) fn print_stats(session: &Session) {
    let stats = &session.stats;
    println!("Session {}", session.id);
    println!("  messages:       {}", session.history.len());
    println!("  tokens:         {}", stats.total_tokens);
    println!("  time:           {}ms", stats.total_time_ms);
    println!("  tool calls:     {}", stats.tool_calls);
    println!("  edits applied:  {}", stats.edits_applied);
    println!("  edits rejected: {}", stats.edits_rejected);
    println!("  undo available: {}", session.undo_stack.len());
    println!("  context usage:  {:.0}%", session.context.token_usage * 100.0);
}

pub(super) fn print_error(message: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(Color::Red));
    println!("{}", message);
    let _ = stdout.execute(ResetColor);
}
