// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Data structures produced by the indexer and persisted per project.
//!
//! Paths are stored relative to the project root with `/` separators so the
//! same key works across platforms and in every storage hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::{content_hash, project_slug};

/// Snapshot of a file's raw content.
///
/// Two snapshots are equal iff their content hashes match; size and
/// timestamps are informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileData {
    /// Content split on `\n` (joining with `\n` restores the exact bytes).
    pub lines: Vec<String>,
    /// Hex SHA-256 of the content.
    pub hash: String,
    /// Content size in bytes.
    pub size: u64,
    /// Last modification time as reported by the filesystem.
    pub last_modified: DateTime<Utc>,
}

impl FileData {
    /// Build a snapshot from file content.
    pub fn from_content(content: &str, last_modified: DateTime<Utc>) -> Self {
        Self {
            lines: content.split('\n').map(str::to_string).collect(),
            hash: content_hash(content),
            size: content.len() as u64,
            last_modified,
        }
    }

    /// Build a snapshot from lines (as produced by an edit).
    pub fn from_lines(lines: Vec<String>, last_modified: DateTime<Utc>) -> Self {
        let content = lines.join("\n");
        Self {
            hash: content_hash(&content),
            size: content.len() as u64,
            lines,
            last_modified,
        }
    }

    /// Reassemble the full content.
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl PartialEq for FileData {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for FileData {}

/// Complexity metrics for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    /// Non-blank, non-comment lines.
    pub loc: u32,
    /// Maximum block depth.
    pub nesting: u32,
    /// 1 + decision points.
    pub cyclomatic_complexity: u32,
    /// Bounded 0-100 combination of the three.
    pub score: u32,
}

/// Coarse classification used for presentation and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Source,
    Test,
    Config,
    Types,
    #[default]
    Unknown,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Source => "source",
            FileType::Test => "test",
            FileType::Config => "config",
            FileType::Types => "types",
            FileType::Unknown => "unknown",
        }
    }
}

/// Derived metadata for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub complexity: Complexity,
    /// Resolved internal import targets.
    pub dependencies: Vec<String>,
    /// Files whose dependencies include this file.
    pub dependents: Vec<String>,
    pub is_hub: bool,
    pub is_entry_point: bool,
    pub file_type: FileType,
    /// Share of the rest of the codebase depending on this file (0-100).
    pub impact_score: u32,
    pub transitive_dep_count: usize,
    pub transitive_dep_by_count: usize,
}

/// One indexed codebase root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Deterministic slug derived from the root path.
    pub name: String,
    pub root_path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Set only when an indexing run completes.
    pub last_indexed_at: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub indexing_in_progress: bool,
}

impl Project {
    /// Create a project record for a root path.
    pub fn new(root_path: &Path) -> Self {
        Self {
            name: project_slug(&root_path.to_string_lossy()),
            root_path: root_path.to_path_buf(),
            created_at: Utc::now(),
            last_indexed_at: None,
            file_count: 0,
            indexing_in_progress: false,
        }
    }

    pub fn mark_indexing_started(&mut self) {
        self.indexing_in_progress = true;
    }

    pub fn mark_indexing_completed(&mut self, file_count: usize) {
        self.indexing_in_progress = false;
        self.file_count = file_count;
        self.last_indexed_at = Some(Utc::now());
    }

    pub fn mark_indexing_failed(&mut self) {
        self.indexing_in_progress = false;
    }

    /// Whether this project has been indexed at least once.
    pub fn is_indexed(&self) -> bool {
        self.last_indexed_at.is_some()
    }
}

/// Normalize a path into the relative, `/`-separated form used as index key.
pub fn normalize_rel_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized.trim_start_matches('/').to_string()
}
