// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Built-in tools for Loom

mod analysis;
mod edit;
mod git;
mod read;
mod run;
mod search;

pub use analysis::{GetComplexityTool, GetDependenciesTool, GetDependentsTool, GetTodosTool};
pub use edit::{CreateFileTool, DeleteFileTool, EditLinesTool};
pub use git::{GitCommitTool, GitDiffTool, GitStatusTool};
pub use read::{GetClassTool, GetFunctionTool, GetLinesTool, GetStructureTool};
pub use run::{RunCommandTool, RunTestsTool};
pub use search::{FindDefinitionTool, FindReferencesTool};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LoomError, Result};
use crate::indexer::{normalize_rel_path, FileAst, FileMeta, ParserRegistry};
use crate::storage::content_hash;

use super::{Tool, ToolContext};

/// Every built-in tool
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetLinesTool),
        Arc::new(GetFunctionTool),
        Arc::new(GetClassTool),
        Arc::new(GetStructureTool),
        Arc::new(EditLinesTool),
        Arc::new(CreateFileTool),
        Arc::new(DeleteFileTool),
        Arc::new(FindReferencesTool),
        Arc::new(FindDefinitionTool),
        Arc::new(GetDependenciesTool),
        Arc::new(GetDependentsTool),
        Arc::new(GetComplexityTool),
        Arc::new(GetTodosTool),
        Arc::new(GitStatusTool),
        Arc::new(GitDiffTool),
        Arc::new(GitCommitTool),
        Arc::new(RunCommandTool::new()),
        Arc::new(RunTestsTool),
    ]
}

/// A project file read from disk
struct ProjectFile {
    /// Normalized project-relative path
    rel: String,
    absolute: PathBuf,
    content: String,
}

/// Resolve and read a project file.
async fn read_project_file(ctx: &ToolContext, path: &str) -> Result<ProjectFile> {
    let absolute = ctx.resolve(path)?;
    let rel = normalize_rel_path(&crate::utils::relative_path_string(&ctx.root, &absolute));
    if !absolute.is_file() {
        return Err(LoomError::ToolExecution(format!("File not found: {}", rel)));
    }
    let content = tokio::fs::read_to_string(&absolute).await?;
    Ok(ProjectFile {
        rel,
        absolute,
        content,
    })
}

/// Structural summary of a file.
///
/// The stored AST is used while its content hash still matches the file on
/// disk; otherwise the file is parsed again.
async fn load_ast(ctx: &ToolContext, file: &ProjectFile) -> Result<FileAst> {
    let stored = ctx.storage.get_file(&ctx.project_name, &file.rel).await?;
    if stored.is_some_and(|data| data.hash == content_hash(&file.content)) {
        if let Some(ast) = ctx.storage.get_ast(&ctx.project_name, &file.rel).await? {
            return Ok(ast);
        }
    }
    ParserRegistry::new()
        .parse_path(Path::new(&file.rel), &file.content)
        .ok_or_else(|| {
            LoomError::ToolExecution(format!("{} is not a supported source file", file.rel))
        })
}

/// Stored metadata for an indexed file.
async fn require_meta(ctx: &ToolContext, path: &str) -> Result<(String, FileMeta)> {
    let rel = project_rel(ctx, path)?;
    match ctx.storage.get_meta(&ctx.project_name, &rel).await? {
        Some(meta) => Ok((rel, meta)),
        None => Err(LoomError::ToolExecution(format!(
            "{} is not indexed; run the indexer first",
            rel
        ))),
    }
}

/// Validated, normalized project-relative form of `path`.
fn project_rel(ctx: &ToolContext, path: &str) -> Result<String> {
    let absolute = ctx.resolve(path)?;
    Ok(normalize_rel_path(&crate::utils::relative_path_string(
        &ctx.root, &absolute,
    )))
}

/// Lines `start..=end` (1-based) of `content`.
fn slice_lines(content: &str, start: u32, end: u32) -> String {
    content
        .lines()
        .skip(start.saturating_sub(1) as usize)
        .take(end.saturating_sub(start) as usize + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether `candidate` is `prefix` itself or lies under it.
fn within(candidate: &str, prefix: Option<&str>) -> bool {
    match prefix {
        None => true,
        Some(p) => {
            let p = p.trim_end_matches('/');
            p.is_empty() || candidate == p || candidate.starts_with(&format!("{}/", p))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::config::{IndexerSettings, ToolSettings};
    use crate::indexer::Indexer;
    use crate::storage::StorageGateway;
    use crate::tools::{Params, ToolContext};

    /// Write files into a temp project, index it and return a context.
    pub async fn indexed_project(files: &[(&str, &str)], settings: ToolSettings) -> (TempDir, ToolContext) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let storage = Arc::new(StorageGateway::in_memory());
        let indexer = Arc::new(Indexer::new(dir.path(), storage, &IndexerSettings::default()));
        indexer.index_project(|_| {}).await.unwrap();
        let ctx = ToolContext::for_indexer(indexer, settings);
        (dir, ctx)
    }

    pub fn trusted() -> ToolSettings {
        ToolSettings {
            trust_mode: true,
            ..ToolSettings::default()
        }
    }

    pub fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }
}
