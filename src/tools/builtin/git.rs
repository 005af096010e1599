// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Git tools
//!
//! Repository access goes through `git2`. Git objects are confined to
//! synchronous helpers so none are held across a confirmation wait.

use async_trait::async_trait;
use git2::{DiffFormat, DiffOptions, IndexAddOption, Repository, Signature, Status, StatusOptions};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::error::{LoomError, Result};
use crate::tools::{
    opt_bool, opt_str, opt_str_list, require_str, ParamSpec, Params, ParamsBuilder, Tool,
    ToolCategory, ToolContext, ToolOutcome,
};

use super::project_rel;

/// Open the repository containing the project root.
fn open_repo(root: &Path) -> Result<Repository> {
    Repository::discover(root)
        .map_err(|e| LoomError::Git(format!("Not a git repository: {}", e.message())))
}

fn workdir(repo: &Repository) -> Result<PathBuf> {
    let dir = repo
        .workdir()
        .ok_or_else(|| LoomError::Git("Bare repositories not supported".into()))?;
    Ok(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()))
}

/// Repository-relative form of a project-relative path.
fn repo_path(repo: &Repository, root: &Path, rel: &str) -> Result<String> {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let absolute = root.join(rel);
    let workdir = workdir(repo)?;
    let inside = absolute.strip_prefix(&workdir).map_err(|_| {
        LoomError::Git(format!("{} is outside the repository", rel))
    })?;
    Ok(inside.to_string_lossy().replace('\\', "/"))
}

fn index_state(status: Status) -> Option<&'static str> {
    if status.is_index_new() {
        Some("added")
    } else if status.is_index_modified() {
        Some("modified")
    } else if status.is_index_deleted() {
        Some("deleted")
    } else if status.is_index_renamed() {
        Some("renamed")
    } else if status.is_index_typechange() {
        Some("typechange")
    } else {
        None
    }
}

fn worktree_state(status: Status) -> Option<&'static str> {
    if status.is_conflicted() {
        Some("conflicted")
    } else if status.is_wt_new() {
        Some("untracked")
    } else if status.is_wt_modified() {
        Some("modified")
    } else if status.is_wt_deleted() {
        Some("deleted")
    } else if status.is_wt_renamed() {
        Some("renamed")
    } else if status.is_wt_typechange() {
        Some("typechange")
    } else {
        None
    }
}

/// Changed paths with their staged and unstaged state.
fn collect_status(repo: &Repository) -> Result<Vec<(String, Option<&'static str>, Option<&'static str>)>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut entries: Vec<_> = statuses
        .iter()
        .filter_map(|entry| {
            let path = entry.path()?.to_string();
            let status = entry.status();
            let index = index_state(status);
            let worktree = worktree_state(status);
            (index.is_some() || worktree.is_some()).then_some((path, index, worktree))
        })
        .collect();
    entries.sort();
    Ok(entries)
}

/// Tool for showing working tree status
pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the current branch and changed files, staged and unstaged."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    async fn run(&self, _params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let repo = open_repo(&ctx.root)?;
        let branch = repo
            .head()
            .ok()
            .and_then(|h| h.shorthand().map(String::from))
            .unwrap_or_else(|| "(no commits)".to_string());

        let entries: Vec<Value> = collect_status(&repo)?
            .into_iter()
            .map(|(path, index, worktree)| json!({"path": path, "staged": index, "unstaged": worktree}))
            .collect();

        Ok(ToolOutcome::Done(json!({
            "branch": branch,
            "clean": entries.is_empty(),
            "entries": entries,
        })))
    }
}

/// Tool for showing a patch of uncommitted changes
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show the diff of unstaged changes, or of staged changes against HEAD."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "Limit the diff to this file or directory", false)
            .boolean("staged", "Diff the index against HEAD", false)
            .default_value(json!(false))
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let repo = open_repo(&ctx.root)?;
        let staged = opt_bool(params, "staged").unwrap_or(false);

        let mut opts = DiffOptions::new();
        if let Some(path) = opt_str(params, "path") {
            let rel = project_rel(ctx, path)?;
            opts.pathspec(repo_path(&repo, &ctx.root, &rel)?);
        }

        let diff = if staged {
            let head_tree = repo.head().ok().and_then(|h| h.peel_to_tree().ok());
            repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts))?
        } else {
            repo.diff_index_to_workdir(None, Some(&mut opts))?
        };

        let stats = diff.stats()?;
        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            let origin = line.origin();
            if matches!(origin, '+' | '-' | ' ') {
                patch.push(origin);
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        Ok(ToolOutcome::Done(json!({
            "staged": staged,
            "files_changed": stats.files_changed(),
            "insertions": stats.insertions(),
            "deletions": stats.deletions(),
            "diff": patch,
        })))
    }
}

/// Tool for committing changes
pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage and commit changes. Without files, every change including untracked files is committed."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("message", "Commit message", true)
            .array("files", "Files to stage and commit", false)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Git
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let message = require_str(params, "message")?.trim();
        if message.is_empty() {
            return Err(LoomError::InvalidInput("Commit message must not be empty".into()));
        }

        let selected = match opt_str_list(params, "files") {
            Some(files) if !files.is_empty() => Some(
                files
                    .iter()
                    .map(|f| project_rel(ctx, f))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => None,
        };
        let files = commit_candidates(&ctx.root, selected.as_deref())?;
        if files.is_empty() {
            return Err(LoomError::Git("Nothing to commit".into()));
        }

        let prompt = format!("Commit {} file(s): {}\n  \"{}\"", files.len(), files.join(", "), message);
        if !ctx.confirm(self.name(), prompt, None).await {
            return Ok(ToolOutcome::Declined("User declined the commit".into()));
        }

        let commit = write_commit(&ctx.root, message, selected.is_some().then_some(files.as_slice()))?;
        tracing::info!("Committed {} ({} files)", commit, files.len());

        Ok(ToolOutcome::Done(json!({
            "commit": commit,
            "message": message,
            "files": files,
        })))
    }
}

/// Repository paths a commit would include.
fn commit_candidates(root: &Path, selected: Option<&[String]>) -> Result<Vec<String>> {
    let repo = open_repo(root)?;
    match selected {
        Some(files) => files.iter().map(|f| repo_path(&repo, root, f)).collect(),
        None => Ok(collect_status(&repo)?.into_iter().map(|(path, _, _)| path).collect()),
    }
}

/// Stage and commit; returns the short commit id.
fn write_commit(root: &Path, message: &str, files: Option<&[String]>) -> Result<String> {
    let repo = open_repo(root)?;
    let workdir = workdir(&repo)?;
    let mut index = repo.index()?;

    match files {
        Some(files) => {
            for file in files {
                if workdir.join(file).exists() {
                    index.add_path(Path::new(file))?;
                } else {
                    index.remove_path(Path::new(file))?;
                }
            }
        }
        None => {
            index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
            index.update_all(["*"].iter(), None)?;
        }
    }
    index.write()?;

    let tree = repo.find_tree(index.write_tree()?)?;
    let signature = repo
        .signature()
        .or_else(|_| Signature::now("Loom", "loom@localhost"))?;
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    Ok(format!("{:.8}", oid))
}
