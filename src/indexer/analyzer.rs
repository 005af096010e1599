// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-file metadata derived from a parsed file and the whole project.
//!
//! Complexity score formula:
//! ```text
//! score = round(30 * min(loc, 1000) / 1000
//!             + 30 * min(nesting, 10) / 10
//!             + 40 * min(cyclomatic, 50) / 50)
//! ```
//! Impact score:
//! ```text
//! impact = round(min(100, dependents / (total_files - 1) * 100)), 0 if total_files <= 1
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::graph::{build_deps_graph, DepsGraph};
use super::languages::lexer::MaskedSource;
use super::languages::{FileAst, LanguageKind, ParserRegistry};
use super::model::{Complexity, FileMeta, FileType};

/// A file with more dependents than this is a hub.
pub const HUB_THRESHOLD: usize = 5;

/// Base names (without extension) that mark an entry point.
const ENTRY_POINT_NAMES: &[&str] = &["index", "main", "app", "server", "cli", "bootstrap"];

static DECISION_KEYWORDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(if|for|while|case|catch)\b").unwrap());

static LOGICAL_OPERATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&&|\|\||\?\?").unwrap());

/// Percentage of the rest of the codebase depending on a file.
pub fn impact_score(dependent_count: usize, total_files: usize) -> u32 {
    if total_files <= 1 {
        return 0;
    }
    let pct = dependent_count as f64 / (total_files - 1) as f64 * 100.0;
    pct.min(100.0).round() as u32
}

/// Whether a file with this many dependents is a hub.
pub fn is_hub(dependent_count: usize) -> bool {
    dependent_count > HUB_THRESHOLD
}

/// Whether a file is a project entry point.
pub fn is_entry_point(path: &str, dependent_count: usize) -> bool {
    dependent_count == 0 || ENTRY_POINT_NAMES.contains(&base_stem(path).to_lowercase().as_str())
}

/// Classify a file by path and name.
pub fn classify_file_type(path: &str) -> FileType {
    let lower = path.to_lowercase();
    let file_name = lower.rsplit('/').next().unwrap_or(&lower);
    let dirs: Vec<&str> = lower.split('/').rev().skip(1).collect();

    if file_name.contains(".test.")
        || file_name.contains(".spec.")
        || dirs
            .iter()
            .any(|d| matches!(*d, "__tests__" | "test" | "tests" | "__mocks__"))
    {
        FileType::Test
    } else if file_name.ends_with(".d.ts")
        || matches!(base_stem(file_name), "types" | "typings")
        || dirs.iter().any(|d| matches!(*d, "types" | "typings" | "@types"))
    {
        FileType::Types
    } else if file_name.contains(".config.")
        || file_name.starts_with('.')
        || base_stem(file_name) == "config"
        || dirs.iter().any(|d| matches!(*d, "config" | "configs"))
    {
        FileType::Config
    } else if LanguageKind::from_path(std::path::Path::new(file_name)).is_some() {
        FileType::Source
    } else {
        FileType::Unknown
    }
}

/// File name without directories or any extension.
fn base_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// Compute complexity metrics for file content.
pub fn compute_complexity(content: &str) -> Complexity {
    let masked = MaskedSource::new(content);

    let loc = masked
        .without_comments
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count() as u32;

    let code = masked.skeleton.as_str();
    let decisions = DECISION_KEYWORDS.find_iter(code).count()
        + LOGICAL_OPERATORS.find_iter(code).count()
        + count_ternaries(code);
    let cyclomatic_complexity = 1 + decisions as u32;
    let nesting = masked.max_depth;

    Complexity {
        loc,
        nesting,
        cyclomatic_complexity,
        score: complexity_score(loc, nesting, cyclomatic_complexity),
    }
}

/// Bounded 0-100 combination of the three metrics.
pub fn complexity_score(loc: u32, nesting: u32, cyclomatic: u32) -> u32 {
    let loc_part = 30.0 * loc.min(1000) as f64 / 1000.0;
    let nesting_part = 30.0 * nesting.min(10) as f64 / 10.0;
    let cc_part = 40.0 * cyclomatic.min(50) as f64 / 50.0;
    ((loc_part + nesting_part + cc_part).round() as u32).min(100)
}

/// Count `?` used as a conditional operator (not `?.`, `??`, or `?:`).
fn count_ternaries(code: &str) -> usize {
    let bytes = code.as_bytes();
    (0..bytes.len())
        .filter(|&i| {
            bytes[i] == b'?'
                && (i == 0 || bytes[i - 1] != b'?')
                && !matches!(
                    bytes.get(i + 1),
                    Some(b'.') | Some(b'?') | Some(b':') | Some(b')') | Some(b',') | Some(b'=')
                )
        })
        .count()
}

/// Derives `FileMeta` against a fixed project graph.
#[derive(Debug, Clone)]
pub struct MetaAnalyzer<'a> {
    graph: &'a DepsGraph,
    total_files: usize,
}

impl<'a> MetaAnalyzer<'a> {
    /// Create an analyzer for a graph covering `total_files` files.
    pub fn new(graph: &'a DepsGraph, total_files: usize) -> Self {
        Self { graph, total_files }
    }

    /// Derive metadata for one file.
    pub fn analyze(&self, path: &str, ast: &FileAst, content: &str) -> FileMeta {
        let complexity = if ast.parse_error {
            Complexity::default()
        } else {
            compute_complexity(content)
        };
        self.relink(path, complexity)
    }

    /// Recompute the graph-derived fields for a file whose content is unchanged.
    pub fn relink(&self, path: &str, complexity: Complexity) -> FileMeta {
        let dependencies = self.graph.dependencies(path).to_vec();
        let dependents = self.graph.dependents(path).to_vec();

        FileMeta {
            complexity,
            is_hub: is_hub(dependents.len()),
            is_entry_point: is_entry_point(path, dependents.len()),
            file_type: classify_file_type(path),
            impact_score: impact_score(dependents.len(), self.total_files),
            transitive_dep_count: self.graph.transitive_dependencies(path).len(),
            transitive_dep_by_count: self.graph.transitive_dependents(path).len(),
            dependencies,
            dependents,
        }
    }
}

/// Derive metadata for one file given every parsed file in the project.
pub fn analyze_file(
    path: &str,
    ast: &FileAst,
    content: &str,
    all_asts: &HashMap<String, FileAst>,
    registry: &ParserRegistry,
) -> FileMeta {
    let graph = build_deps_graph(all_asts, registry);
    MetaAnalyzer::new(&graph, all_asts.len()).analyze(path, ast, content)
}
