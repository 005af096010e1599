// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Symbol search tools backed by the stored index

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::error::{LoomError, Result};
use crate::indexer::SymbolIndex;
use crate::tools::{
    opt_str, require_str, ParamSpec, Params, ParamsBuilder, Tool, ToolCategory, ToolContext,
    ToolOutcome,
};

use super::{project_rel, within};

/// Most references returned by one search
const MAX_REFERENCES: usize = 200;

/// Most near-miss names suggested when a symbol is unknown
const MAX_SUGGESTIONS: usize = 10;

async fn require_symbol_index(ctx: &ToolContext) -> Result<SymbolIndex> {
    ctx.storage
        .get_symbol_index(&ctx.project_name)
        .await?
        .ok_or_else(|| LoomError::ToolExecution("Project is not indexed; run the indexer first".to_string()))
}

/// Indexed names containing `symbol`, ignoring case.
fn similar_symbols<'a>(index: &'a SymbolIndex, symbol: &str) -> Vec<&'a str> {
    let needle = symbol.to_lowercase();
    index
        .keys()
        .filter(|name| name.to_lowercase().contains(&needle))
        .take(MAX_SUGGESTIONS)
        .map(String::as_str)
        .collect()
}

/// Tool for locating where a symbol is declared
pub struct FindDefinitionTool;

#[async_trait]
impl Tool for FindDefinitionTool {
    fn name(&self) -> &str {
        "find_definition"
    }

    fn description(&self) -> &str {
        "Find where a function, class, method, interface or type is declared."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("symbol", "Exact symbol name", true)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let symbol = require_str(params, "symbol")?;
        let index = require_symbol_index(ctx).await?;

        match index.get(symbol) {
            Some(locations) if !locations.is_empty() => Ok(ToolOutcome::Done(json!({
                "symbol": symbol,
                "count": locations.len(),
                "definitions": locations,
            }))),
            _ => {
                let similar = similar_symbols(&index, symbol);
                Err(LoomError::ToolExecution(if similar.is_empty() {
                    format!("Symbol '{}' not found", symbol)
                } else {
                    format!("Symbol '{}' not found. Similar: {}", symbol, similar.join(", "))
                }))
            }
        }
    }
}

/// Tool for finding every use of a symbol
pub struct FindReferencesTool;

#[async_trait]
impl Tool for FindReferencesTool {
    fn name(&self) -> &str {
        "find_references"
    }

    fn description(&self) -> &str {
        "Find lines in indexed files that mention a symbol as a whole word, optionally under a path."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        ParamsBuilder::new()
            .string("symbol", "Symbol name", true)
            .string("path", "File or directory to restrict the search to", false)
            .build()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Search
    }

    async fn run(&self, params: &Params, ctx: &ToolContext) -> Result<ToolOutcome> {
        let symbol = require_str(params, "symbol")?;
        let scope = opt_str(params, "path").map(|p| project_rel(ctx, p)).transpose()?;

        let pattern = Regex::new(&format!(r"(?:^|[^\w$]){}(?:[^\w$]|$)", regex::escape(symbol)))
            .map_err(|e| LoomError::InvalidInput(format!("Invalid symbol: {}", e)))?;

        let files = ctx.storage.get_all_files(&ctx.project_name).await?;
        if files.is_empty() {
            return Err(LoomError::ToolExecution(
                "Project is not indexed; run the indexer first".to_string(),
            ));
        }

        let definitions: HashSet<(String, u32)> = ctx
            .storage
            .get_symbol_index(&ctx.project_name)
            .await?
            .and_then(|index| index.get(symbol).cloned())
            .unwrap_or_default()
            .into_iter()
            .map(|loc| (loc.path, loc.line))
            .collect();

        let mut paths: Vec<&String> = files.keys().filter(|p| within(p, scope.as_deref())).collect();
        paths.sort();

        let mut references: Vec<Value> = Vec::new();
        let mut total = 0usize;
        for path in paths {
            for (i, text) in files[path].lines.iter().enumerate() {
                if !pattern.is_match(text) {
                    continue;
                }
                total += 1;
                if references.len() < MAX_REFERENCES {
                    let line = i as u32 + 1;
                    references.push(json!({
                        "path": path,
                        "line": line,
                        "text": text.trim(),
                        "is_definition": definitions.contains(&(path.clone(), line)),
                    }));
                }
            }
        }

        Ok(ToolOutcome::Done(json!({
            "symbol": symbol,
            "count": total,
            "truncated": total > references.len(),
            "references": references,
        })))
    }
}
