// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Project dependency graph.
//!
//! `imports` maps each file to the files it imports; `imported_by` is kept as
//! the exact inverse. Every mutation goes through methods that update both
//! sides, and every indexed file has an entry (possibly empty) in both maps.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::languages::{FileAst, ImportKind, ParserRegistry};

/// Bidirectional file-level import relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsGraph {
    /// Files each file imports (outgoing edges).
    pub imports: BTreeMap<String, Vec<String>>,
    /// Files importing each file (incoming edges).
    pub imported_by: BTreeMap<String, Vec<String>>,
}

impl DepsGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files in the graph.
    pub fn node_count(&self) -> usize {
        self.imports.len()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.imports.values().map(Vec::len).sum()
    }

    /// Whether a file is present.
    pub fn contains(&self, path: &str) -> bool {
        self.imports.contains_key(path)
    }

    /// Ensure a node exists for a file.
    pub fn ensure_node(&mut self, path: &str) {
        self.imports.entry(path.to_string()).or_default();
        self.imported_by.entry(path.to_string()).or_default();
    }

    /// Add an edge from `from` to `to`.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.ensure_node(from);
        self.ensure_node(to);

        if let Some(deps) = self.imports.get_mut(from) {
            insert_sorted(deps, to);
        }
        if let Some(dependents) = self.imported_by.get_mut(to) {
            insert_sorted(dependents, from);
        }
    }

    /// Replace all outgoing edges of `path`.
    pub fn set_dependencies(&mut self, path: &str, dependencies: &[String]) {
        self.ensure_node(path);
        let old = self.imports.get(path).cloned().unwrap_or_default();
        for dep in &old {
            if let Some(dependents) = self.imported_by.get_mut(dep) {
                dependents.retain(|p| p != path);
            }
        }
        if let Some(deps) = self.imports.get_mut(path) {
            deps.clear();
        }
        for dep in dependencies {
            if dep != path {
                self.add_edge(path, dep);
            }
        }
    }

    /// Remove a file and every edge touching it.
    pub fn remove_file(&mut self, path: &str) {
        if let Some(deps) = self.imports.remove(path) {
            for dep in &deps {
                if let Some(dependents) = self.imported_by.get_mut(dep) {
                    dependents.retain(|p| p != path);
                }
            }
        }
        if let Some(dependents) = self.imported_by.remove(path) {
            for dependent in &dependents {
                if let Some(deps) = self.imports.get_mut(dependent) {
                    deps.retain(|p| p != path);
                }
            }
        }
    }

    /// Direct dependencies of a file.
    pub fn dependencies(&self, path: &str) -> &[String] {
        self.imports.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct dependents of a file.
    pub fn dependents(&self, path: &str) -> &[String] {
        self.imported_by.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All files reachable from `path` through imports.
    pub fn transitive_dependencies(&self, path: &str) -> HashSet<String> {
        reachable(&self.imports, path)
    }

    /// All files that reach `path` through imports.
    pub fn transitive_dependents(&self, path: &str) -> HashSet<String> {
        reachable(&self.imported_by, path)
    }

    /// Files whose metadata can change when `path` changes: the file itself
    /// plus every file one edge away, before and after the change.
    pub fn neighborhood(&self, path: &str) -> HashSet<String> {
        let mut out: HashSet<String> = HashSet::new();
        out.insert(path.to_string());
        out.extend(self.dependencies(path).iter().cloned());
        out.extend(self.dependents(path).iter().cloned());
        out
    }

    /// Check that `imported_by` is the exact inverse of `imports`.
    pub fn is_consistent(&self) -> bool {
        if self.imports.len() != self.imported_by.len() {
            return false;
        }
        let forward = self.imports.iter().all(|(from, deps)| {
            deps.iter()
                .all(|to| self.dependents(to).iter().any(|d| d == from))
        });
        let backward = self.imported_by.iter().all(|(to, dependents)| {
            dependents
                .iter()
                .all(|from| self.dependencies(from).iter().any(|d| d == to))
        });
        forward && backward
    }
}

/// Iterative traversal with a visited set; terminates on cycles.
fn reachable(edges: &BTreeMap<String, Vec<String>>, start: &str) -> HashSet<String> {
    let mut visited = HashSet::new();
    let mut stack = vec![start.to_string()];

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if let Some(next) = edges.get(&current) {
            for dep in next {
                if !visited.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }
    }

    visited.remove(start);
    visited
}

fn insert_sorted(list: &mut Vec<String>, value: &str) {
    if let Err(pos) = list.binary_search_by(|p| p.as_str().cmp(value)) {
        list.insert(pos, value.to_string());
    }
}

/// Resolved internal dependencies of one file.
pub fn resolve_dependencies(
    path: &str,
    ast: &FileAst,
    known_files: &HashSet<String>,
    registry: &ParserRegistry,
) -> Vec<String> {
    if ast.parse_error {
        return Vec::new();
    }
    let mut deps: Vec<String> = ast
        .imports
        .iter()
        .filter(|i| i.kind == ImportKind::Internal)
        .filter_map(|i| registry.resolve_import(i, path, known_files))
        .filter(|resolved| resolved != path)
        .collect();
    deps.sort();
    deps.dedup();
    deps
}

/// Build the graph over every parsed file.
pub fn build_deps_graph(asts: &HashMap<String, FileAst>, registry: &ParserRegistry) -> DepsGraph {
    let known: HashSet<String> = asts.keys().cloned().collect();
    let mut graph = DepsGraph::new();

    for path in asts.keys() {
        graph.ensure_node(path);
    }
    for (path, ast) in asts {
        for dep in resolve_dependencies(path, ast, &known, registry) {
            graph.add_edge(path, &dep);
        }
    }

    graph
}
