// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Read tools
//!
//! Line ranges, single declarations and file or directory structure.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::error::{LoomError, Result};
use crate::indexer::{FileAst, ScanOptions, Scanner};
use crate::tools::{
    opt_str, opt_usize, require_str, require_usize, ParamSpec, Params, ParamsBuilder, Tool,
    ToolCategory, ToolContext, ToolOutcome,
};

use super::{load_ast, project_rel, read_project_file, slice_lines, within};

/// Default depth of a directory listing
const DEFAULT_TREE_DEPTH: usize = 3;

/// Longest line shown before truncation
const MAX_LINE_CHARS: usize = 500;

/// Tool for reading a range of lines
pub struct GetLinesTool;

#[async_trait]
impl Tool for GetLinesTool {
    fn name(&self) -> &str {
        "get_lines"
    }

    fn description(&self) -> &str {
        "Read lines of a file with line numbers. Without start/end the whole file is returned."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .integer("start", "First line, 1-based", false)
            .default_value(json!(1))
            .integer("end", "Last line, inclusive (default: end of file)", false)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        if let Some(problem) = crate::tools::validate_against(&self.parameters(), params) {
            return Some(problem);
        }
        match (opt_usize(params, "start"), opt_usize(params, "end")) {
            (Some(0), _) => Some("parameter 'start' must be at least 1".to_string()),
            (Some(start), Some(end)) if end < start => {
                Some(format!("'end' ({}) is before 'start' ({})", end, start))
            }
            _ => None,
        }
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let file = read_project_file(ctx, require_str(params, "path")?).await?;
        let lines: Vec<&str> = file.content.lines().collect();
        let total = lines.len();

        let start = opt_usize(params, "start").unwrap_or(1);
        let end = opt_usize(params, "end").unwrap_or(total).min(total);
        if total > 0 && start > total {
            return Err(LoomError::ToolExecution(format!(
                "Line {} is past the end of {} ({} lines)",
                start, file.rel, total
            )));
        }

        let mut content = String::new();
        for (i, line) in lines.iter().enumerate().take(end).skip(start - 1) {
            let shown = if line.chars().count() > MAX_LINE_CHARS {
                format!("{}... (truncated)", line.chars().take(MAX_LINE_CHARS).collect::<String>())
            } else {
                line.to_string()
            };
            content.push_str(&format!("{:>6}\t{}\n", i + 1, shown));
        }

        Ok(ToolOutcome::Done(json!({
            "path": file.rel,
            "start_line": start,
            "end_line": end,
            "total_lines": total,
            "content": content,
        })))
    }
}

/// Tool for reading one function or method
pub struct GetFunctionTool;

#[async_trait]
impl Tool for GetFunctionTool {
    fn name(&self) -> &str {
        "get_function"
    }

    fn description(&self) -> &str {
        "Get the source of a function, or of a method as 'Class.method' or bare method name."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .string("name", "Function or method name", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let file = read_project_file(ctx, require_str(params, "path")?).await?;
        let name = require_str(params, "name")?;
        let ast = load_ast(ctx, &file).await?;

        if let Some(f) = ast.functions.iter().find(|f| f.name == name) {
            return Ok(ToolOutcome::Done(json!({
                "path": file.rel,
                "name": f.name,
                "kind": "function",
                "line_start": f.line_start,
                "line_end": f.line_end,
                "params": f.params,
                "is_async": f.is_async,
                "is_exported": f.is_exported,
                "code": slice_lines(&file.content, f.line_start, f.line_end),
            })));
        }

        let (class_name, method_name) = match name.split_once('.') {
            Some((class, method)) => (Some(class), method),
            None => (None, name),
        };
        let method = ast
            .classes
            .iter()
            .filter(|c| class_name.is_none_or(|n| c.name == n))
            .find_map(|c| {
                c.methods
                    .iter()
                    .find(|m| m.name == method_name)
                    .map(|m| (c, m))
            });
        if let Some((class, m)) = method {
            return Ok(ToolOutcome::Done(json!({
                "path": file.rel,
                "name": m.name,
                "kind": "method",
                "class": class.name,
                "line_start": m.line_start,
                "line_end": m.line_end,
                "params": m.params,
                "is_async": m.is_async,
                "is_static": m.is_static,
                "code": slice_lines(&file.content, m.line_start, m.line_end),
            })));
        }

        Err(LoomError::ToolExecution(format!(
            "Function '{}' not found in {}. Available: {}",
            name,
            file.rel,
            available_functions(&ast)
        )))
    }
}

fn available_functions(ast: &FileAst) -> String {
    let mut names: Vec<String> = ast.functions.iter().map(|f| f.name.clone()).collect();
    for class in &ast.classes {
        names.extend(class.methods.iter().map(|m| format!("{}.{}", class.name, m.name)));
    }
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Tool for reading one class
pub struct GetClassTool;

#[async_trait]
impl Tool for GetClassTool {
    fn name(&self) -> &str {
        "get_class"
    }

    fn description(&self) -> &str {
        "Get the source of a class with its heritage and method list."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File path relative to the project root", true)
            .string("name", "Class name", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let file = read_project_file(ctx, require_str(params, "path")?).await?;
        let name = require_str(params, "name")?;
        let ast = load_ast(ctx, &file).await?;

        let Some(class) = ast.classes.iter().find(|c| c.name == name) else {
            let available: Vec<&str> = ast.classes.iter().map(|c| c.name.as_str()).collect();
            return Err(LoomError::ToolExecution(format!(
                "Class '{}' not found in {}. Available: {}",
                name,
                file.rel,
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            )));
        };

        let methods: Vec<Value> = class
            .methods
            .iter()
            .map(|m| {
                json!({
                    "name": m.name,
                    "line_start": m.line_start,
                    "line_end": m.line_end,
                    "visibility": m.visibility,
                    "is_static": m.is_static,
                    "is_async": m.is_async,
                })
            })
            .collect();

        Ok(ToolOutcome::Done(json!({
            "path": file.rel,
            "name": class.name,
            "line_start": class.line_start,
            "line_end": class.line_end,
            "extends": class.extends,
            "implements": class.implements,
            "is_exported": class.is_exported,
            "is_abstract": class.is_abstract,
            "methods": methods,
            "code": slice_lines(&file.content, class.line_start, class.line_end),
        })))
    }
}

/// Tool for summarizing a file or listing a directory
pub struct GetStructureTool;

#[async_trait]
impl Tool for GetStructureTool {
    fn name(&self) -> &str {
        "get_structure"
    }

    fn description(&self) -> &str {
        "Summarize a file's imports, exports and declarations, or show the file tree of a directory (default: project root)."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("path", "File or directory relative to the project root", false)
            .integer("depth", "Directory levels to show", false)
            .default_value(json!(DEFAULT_TREE_DEPTH))
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let path = opt_str(params, "path").filter(|p| !p.trim().is_empty() && p.trim() != ".");
        if let Some(path) = path {
            if ctx.resolve(path)?.is_file() {
                return file_structure(ctx, path).await;
            }
        }

        let base = path.map(|p| project_rel(ctx, p)).transpose()?;
        let depth = match params.get("depth") {
            Some(_) => require_usize(params, "depth")?.max(1),
            None => DEFAULT_TREE_DEPTH,
        };

        let mut files = ctx.storage.list_files(&ctx.project_name).await?;
        if files.is_empty() {
            files = Scanner::new(&ctx.root, ScanOptions::default())
                .files()
                .into_iter()
                .map(|e| e.path)
                .collect();
        }
        files.retain(|f| within(f, base.as_deref()));
        if files.is_empty() {
            return Err(LoomError::ToolExecution(format!(
                "No files found under {}",
                base.as_deref().unwrap_or(".")
            )));
        }

        Ok(ToolOutcome::Done(json!({
            "path": base.clone().unwrap_or_else(|| ".".to_string()),
            "file_count": files.len(),
            "tree": render_tree(&files, base.as_deref(), depth),
        })))
    }
}

async fn file_structure(ctx: &ToolContext, path: &str) -> Result<ToolOutcome> {
    let file = read_project_file(ctx, path).await?;
    let ast = load_ast(ctx, &file).await?;
    let meta = ctx.storage.get_meta(&ctx.project_name, &file.rel).await?;

    let imports: Vec<Value> = ast
        .imports
        .iter()
        .map(|i| json!({"source": i.source, "names": i.names, "line": i.line, "kind": i.kind}))
        .collect();
    let functions: Vec<Value> = ast
        .functions
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "lines": format!("{}-{}", f.line_start, f.line_end),
                "params": f.params,
                "is_async": f.is_async,
                "is_exported": f.is_exported,
            })
        })
        .collect();
    let classes: Vec<Value> = ast
        .classes
        .iter()
        .map(|c| {
            json!({
                "name": c.name,
                "lines": format!("{}-{}", c.line_start, c.line_end),
                "extends": c.extends,
                "methods": c.methods.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut summary = json!({
        "path": file.rel,
        "total_lines": file.content.lines().count(),
        "parse_error": ast.parse_error,
        "imports": imports,
        "exports": ast.exports.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
        "functions": functions,
        "classes": classes,
        "interfaces": ast.interfaces.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        "types": ast.type_aliases.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
    });
    if let Some(meta) = meta {
        summary["complexity"] = json!(meta.complexity.score);
        summary["dependents"] = json!(meta.dependents.len());
        summary["impact_score"] = json!(meta.impact_score);
    }
    Ok(ToolOutcome::Done(summary))
}

/// Indented tree of `files` below `base`, cut at `depth` levels.
fn render_tree(files: &[String], base: Option<&str>, depth: usize) -> String {
    let prefix_len = base
        .map(|b| b.trim_end_matches('/'))
        .filter(|b| !b.is_empty())
        .map(|b| b.split('/').count())
        .unwrap_or(0);

    let mut nodes: BTreeSet<(Vec<&str>, bool)> = BTreeSet::new();
    for file in files {
        let parts: Vec<&str> = file.split('/').skip(prefix_len).collect();
        for len in 1..=parts.len().min(depth) {
            let is_dir = len < parts.len();
            nodes.insert((parts[..len].to_vec(), is_dir));
        }
    }

    nodes
        .iter()
        .map(|(parts, is_dir)| {
            format!(
                "{}{}{}",
                "  ".repeat(parts.len() - 1),
                parts[parts.len() - 1],
                if *is_dir { "/" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
