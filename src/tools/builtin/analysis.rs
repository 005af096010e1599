// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Analysis tools over stored file metadata

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::error::{LoomError, Result};
use crate::indexer::languages::lexer::MaskedSource;
use crate::indexer::languages::ImportKind;
use crate::tools::{
    opt_str, opt_usize, require_str, ParamSpec, Params, ParamsBuilder, Tool, ToolCategory,
    ToolContext, ToolOutcome,
};

use super::{project_rel, require_meta, within};

/// Files listed by `get_complexity` without a limit
const DEFAULT_COMPLEXITY_LIMIT: usize = 10;

/// Markers reported by `get_todos`
const TODO_MARKERS: &[&str] = &["TODO", "FIXME", "HACK", "XXX"];

static TODO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b:?[ \t]*([^\n]*)").unwrap());

/// Tool for listing what a file imports
pub struct GetDependenciesTool;

#[async_trait]
impl Tool for GetDependenciesTool {
    fn name(&self) -> &str {
        "get_dependencies"
    }

    fn description(&self) -> &str {
        "List the project files a file imports, plus its external and built-in packages."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let (rel, meta) = require_meta(ctx, require_str(params, "path")?).await?;

        let mut packages = BTreeSet::new();
        if let Some(ast) = ctx.storage.get_ast(&ctx.project_name, &rel).await? {
            packages.extend(
                ast.imports
                    .iter()
                    .filter(|i| i.kind != ImportKind::Internal)
                    .map(|i| i.source.clone()),
            );
        }

        Ok(ToolOutcome::Done(json!({
            "path": rel,
            "dependencies": meta.dependencies,
            "transitive_dependency_count": meta.transitive_dep_count,
            "packages": packages,
        })))
    }
}

/// Tool for listing which files import a file
pub struct GetDependentsTool;

#[async_trait]
impl Tool for GetDependentsTool {
    fn name(&self) -> &str {
        "get_dependents"
    }

    fn description(&self) -> &str {
        "List the files that import a file, with its hub flag and impact score."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let (rel, meta) = require_meta(ctx, require_str(params, "path")?).await?;
        Ok(ToolOutcome::Done(json!({
            "path": rel,
            "dependents": meta.dependents,
            "transitive_dependent_count": meta.transitive_dep_by_count,
            "is_hub": meta.is_hub,
            "is_entry_point": meta.is_entry_point,
            "impact_score": meta.impact_score,
        })))
    }
}

/// Tool for reporting complexity of one file or the most complex files
pub struct GetComplexityTool;

#[async_trait]
impl Tool for GetComplexityTool {
    fn name(&self) -> &str {
        "get_complexity"
    }

    fn description(&self) -> &str {
        "Complexity metrics of a file, or the most complex files under a directory (default: whole project)."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File or directory relative to the project root", false)
            .integer("limit", "Files to list when ranking", false)
            .default_value(json!(DEFAULT_COMPLEXITY_LIMIT))
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let scope = opt_str(params, "path").map(|p| project_rel(ctx, p)).transpose()?;
        let limit = opt_usize(params, "limit").unwrap_or(DEFAULT_COMPLEXITY_LIMIT);

        let metas = ctx.storage.get_all_metas(&ctx.project_name).await?;
        if let Some(meta) = scope.as_ref().and_then(|s| metas.get(s)) {
            return Ok(ToolOutcome::Done(complexity_entry(
                scope.as_deref().unwrap_or_default(),
                meta,
            )));
        }

        let mut ranked: Vec<_> = metas
            .iter()
            .filter(|(path, _)| within(path, scope.as_deref()))
            .collect();
        if ranked.is_empty() {
            return Err(LoomError::ToolExecution(match scope {
                Some(scope) => format!("No indexed files under {}", scope),
                None => "Project is not indexed; run the indexer first".to_string(),
            }));
        }
        ranked.sort_by(|(pa, a), (pb, b)| {
            b.complexity
                .score
                .cmp(&a.complexity.score)
                .then_with(|| pa.cmp(pb))
        });

        let total = ranked.len();
        let files: Vec<Value> = ranked
            .into_iter()
            .take(limit)
            .map(|(path, meta)| complexity_entry(path, meta))
            .collect();
        Ok(ToolOutcome::Done(json!({ "total_files": total, "files": files })))
    }
}

fn complexity_entry(path: &str, meta: &crate::indexer::FileMeta) -> Value {
    json!({
        "path": path,
        "score": meta.complexity.score,
        "loc": meta.complexity.loc,
        "nesting": meta.complexity.nesting,
        "cyclomatic_complexity": meta.complexity.cyclomatic_complexity,
        "file_type": meta.file_type.as_str(),
    })
}

/// Tool for collecting TODO-style comments
pub struct GetTodosTool;

#[async_trait]
impl Tool for GetTodosTool {
    fn name(&self) -> &str {
        "get_todos"
    }

    fn description(&self) -> &str {
        "List TODO, FIXME, HACK and XXX comments in indexed files."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File or directory to restrict the search to", false)
            .string("type", "Only this marker", false)
            .one_of(TODO_MARKERS)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Analysis
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let scope = opt_str(params, "path").map(|p| project_rel(ctx, p)).transpose()?;
        let wanted = opt_str(params, "type");

        let files = ctx.storage.get_all_files(&ctx.project_name).await?;
        if files.is_empty() {
            return Err(LoomError::ToolExecution(
                "Project is not indexed; run the indexer first".to_string(),
            ));
        }

        let mut paths: Vec<&String> = files.keys().filter(|p| within(p, scope.as_deref())).collect();
        paths.sort();

        let mut todos = Vec::new();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for path in paths {
            for todo in find_todos(&files[path].content()) {
                if wanted.is_some_and(|w| w != todo.marker) {
                    continue;
                }
                *counts.entry(todo.marker).or_default() += 1;
                todos.push(json!({
                    "path": path,
                    "line": todo.line,
                    "type": todo.marker,
                    "text": todo.text,
                }));
            }
        }

        Ok(ToolOutcome::Done(json!({
            "count": todos.len(),
            "by_type": counts,
            "todos": todos,
        })))
    }
}

#[derive(Debug, PartialEq)]
struct Todo {
    marker: &'static str,
    line: u32,
    text: String,
}

/// Markers that appear inside comments, in source order.
fn find_todos(content: &str) -> Vec<Todo> {
    let masked = MaskedSource::new(content);
    let original = content.as_bytes();
    let code = masked.without_comments.as_bytes();

    TODO_PATTERN
        .captures_iter(content)
        .filter_map(|caps| {
            let m = caps.get(1)?;
            // Comment bytes are blanked in `without_comments`.
            if code.get(m.start()) == original.get(m.start()) {
                return None;
            }
            let marker = TODO_MARKERS.iter().copied().find(|k| *k == m.as_str())?;
            let text = caps
                .get(2)
                .map(|t| t.as_str().trim().trim_end_matches("*/").trim_end().to_string())
                .unwrap_or_default();
            Some(Todo {
                marker,
                line: masked.line_of(m.start()),
                text,
            })
        })
        .collect()
}
