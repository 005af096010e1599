// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Edit tools
//!
//! Every edit asks for confirmation with a diff preview, writes the file,
//! refreshes the index and returns an undo entry. A decline leaves the file
//! untouched.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{LoomError, Result};
use crate::session::undo::UndoEntry;
use crate::storage::content_hash;
use crate::tools::{
    require_str, require_usize, DiffPreview, ParamSpec, Params, ParamsBuilder, Tool, ToolCategory,
    ToolContext, ToolOutcome,
};

use super::{project_rel, read_project_file};

/// Split into lines, treating an empty string as no lines.
fn split_lines(content: &str) -> Vec<String> {
    content.lines().map(str::to_string).collect()
}

/// Line terminator of a file, taken from its first line.
fn line_ending(content: &str) -> &'static str {
    match content.find('\n') {
        Some(idx) if content[..idx].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Tool for replacing a range of lines
pub struct EditLinesTool;

#[async_trait]
impl Tool for EditLinesTool {
    fn name(&self) -> &str {
        "edit_lines"
    }

    fn description(&self) -> &str {
        "Replace lines start..=end of a file with new content. Use end = start - 1 to insert before start; empty content deletes the range."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .integer("start", "First line to replace, 1-based", true)
            .integer("end", "Last line to replace, inclusive", true)
            .string("content", "Replacement text", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        if let Some(problem) = crate::tools::validate_against(&self.parameters(), params) {
            return Some(problem);
        }
        let start = require_usize(params, "start").ok()?;
        let end = require_usize(params, "end").ok()?;
        if start == 0 {
            Some("parameter 'start' must be at least 1".to_string())
        } else if end + 1 < start {
            Some(format!("'end' ({}) must be at least start - 1 ({})", end, start - 1))
        } else {
            None
        }
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let file = read_project_file(ctx, require_str(params, "path")?).await?;
        let start = require_usize(params, "start")?;
        let end = require_usize(params, "end")?;
        let replacement = split_lines(require_str(params, "content")?);

        if let Some(stored) = ctx.storage.get_file(&ctx.project_name, &file.rel).await? {
            if stored.hash != content_hash(&file.content) {
                ctx.reindex(&file.rel, Some(&file.content)).await;
                return Err(LoomError::Conflict(format!(
                    "{} changed on disk since it was last read; re-read it before editing",
                    file.rel
                )));
            }
        }

        let lines = split_lines(&file.content);
        if start > lines.len() + 1 || end > lines.len() {
            return Err(LoomError::ToolExecution(format!(
                "Range {}-{} is outside {} ({} lines)",
                start,
                end,
                file.rel,
                lines.len()
            )));
        }

        let removed = lines[start - 1..end].to_vec();
        let mut updated: Vec<String> = lines[..start - 1].to_vec();
        updated.extend(replacement.iter().cloned());
        updated.extend(lines[end..].iter().cloned());

        let eol = line_ending(&file.content);
        let mut new_content = updated.join(eol);
        if !updated.is_empty() && (file.content.ends_with('\n') || file.content.is_empty()) {
            new_content.push_str(eol);
        }

        let diff = DiffPreview {
            file_path: file.rel.clone(),
            old_lines: removed.clone(),
            new_lines: replacement.clone(),
            start_line: start,
        };
        let message = if removed.is_empty() {
            format!("Insert {} line(s) into {} at line {}", replacement.len(), file.rel, start)
        } else {
            format!("Edit {} lines {}-{}", file.rel, start, end)
        };
        if !ctx.confirm(self.name(), message.clone(), Some(diff)).await {
            return Ok(ToolOutcome::Declined(format!("User declined: {}", message)));
        }

        tokio::fs::write(&file.absolute, &new_content).await?;
        ctx.reindex(&file.rel, Some(&new_content)).await;

        Ok(ToolOutcome::Applied {
            data: json!({
                "path": file.rel,
                "start_line": start,
                "lines_removed": removed.len(),
                "lines_added": replacement.len(),
                "total_lines": updated.len(),
            }),
            undo: UndoEntry::edit(file.rel, file.content, new_content, message),
        })
    }
}

/// Tool for creating a new file
pub struct CreateFileTool;

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new file with the given content. Fails if the file exists."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .string("content", "File content", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let path = require_str(params, "path")?;
        let content = require_str(params, "content")?;
        let absolute = ctx.resolve(path)?;
        let rel = project_rel(ctx, path)?;

        if absolute.exists() {
            return Err(LoomError::Conflict(format!(
                "{} already exists; use edit_lines to change it",
                rel
            )));
        }

        let new_lines = split_lines(content);
        let message = format!("Create {} ({} lines)", rel, new_lines.len());
        let diff = DiffPreview {
            file_path: rel.clone(),
            old_lines: Vec::new(),
            new_lines,
            start_line: 1,
        };
        if !ctx.confirm(self.name(), message.clone(), Some(diff)).await {
            return Ok(ToolOutcome::Declined(format!("User declined: {}", message)));
        }

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&absolute, content).await?;
        ctx.reindex(&rel, Some(content)).await;

        Ok(ToolOutcome::Applied {
            data: json!({ "path": rel, "bytes": content.len() }),
            undo: UndoEntry::create(rel, content.to_string(), message),
        })
    }
}

/// Tool for deleting a file
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file from the project."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Edit
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let file = read_project_file(ctx, require_str(params, "path")?).await?;
        let old_lines = split_lines(&file.content);
        let message = format!("Delete {} ({} lines)", file.rel, old_lines.len());
        let diff = DiffPreview {
            file_path: file.rel.clone(),
            old_lines,
            new_lines: Vec::new(),
            start_line: 1,
        };
        if !ctx.confirm(self.name(), message.clone(), Some(diff)).await {
            return Ok(ToolOutcome::Declined(format!("User declined: {}", message)));
        }

        tokio::fs::remove_file(&file.absolute).await?;
        ctx.reindex(&file.rel, None).await;

        Ok(ToolOutcome::Applied {
            data: json!({ "path": file.rel, "deleted": true }),
            undo: UndoEntry::delete(file.rel, file.content, message),
        })
    }
}
