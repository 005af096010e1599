// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bounded undo history for file mutations
//!
//! Every applied edit/create/delete records an `UndoEntry` holding the file
//! content before and after. Pushing past capacity evicts the oldest entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{LoomError, Result};
use crate::utils::resolve_project_path;

/// Default number of undo entries kept per session
pub const DEFAULT_UNDO_CAPACITY: usize = 10;

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoAction {
    Edit,
    Create,
    Delete,
}

/// A reversible mutation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Project-relative path
    pub file_path: String,
    pub action: UndoAction,
    /// Content before the mutation (`None` for a create)
    pub previous_content: Option<String>,
    /// Content after the mutation (`None` for a delete)
    pub new_content: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl UndoEntry {
    fn new(
        file_path: impl Into<String>,
        action: UndoAction,
        previous_content: Option<String>,
        new_content: Option<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            file_path: file_path.into(),
            action,
            previous_content,
            new_content,
            description: description.into(),
            tool_call_id: None,
        }
    }

    /// Record an in-place edit
    pub fn edit(
        file_path: impl Into<String>,
        previous: String,
        new: String,
        description: impl Into<String>,
    ) -> Self {
        Self::new(file_path, UndoAction::Edit, Some(previous), Some(new), description)
    }

    /// Record a file creation
    pub fn create(file_path: impl Into<String>, content: String, description: impl Into<String>) -> Self {
        Self::new(file_path, UndoAction::Create, None, Some(content), description)
    }

    /// Record a file deletion
    pub fn delete(file_path: impl Into<String>, previous: String, description: impl Into<String>) -> Self {
        Self::new(file_path, UndoAction::Delete, Some(previous), None, description)
    }

    /// Attach the originating tool call
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }
}

/// Bounded LIFO of undo entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoStack {
    /// Oldest first
    entries: Vec<UndoEntry>,
    capacity: usize,
}

impl UndoStack {
    /// Create an empty stack with the given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild from entries stored newest first
    pub fn from_newest_first(capacity: usize, newest_first: Vec<UndoEntry>) -> Self {
        let mut stack = Self::new(capacity);
        for entry in newest_first.into_iter().rev() {
            stack.push(entry);
        }
        stack
    }

    /// Push an entry, evicting the oldest when full
    pub fn push(&mut self, entry: UndoEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    /// Remove and return the most recent entry
    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop()
    }

    /// Most recent entry
    pub fn peek(&self) -> Option<&UndoEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries, newest first
    pub fn newest_first(&self) -> impl Iterator<Item = &UndoEntry> {
        self.entries.iter().rev()
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(DEFAULT_UNDO_CAPACITY)
    }
}

/// Revert one entry on disk.
///
/// Fails with `LoomError::Conflict` when the file no longer matches what the
/// entry recorded, leaving the file untouched.
pub async fn apply_undo(root: &Path, entry: &UndoEntry) -> Result<()> {
    let path = resolve_project_path(root, &entry.file_path)?;
    let current = match tokio::fs::read_to_string(&path).await {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    if current != entry.new_content {
        return Err(LoomError::Conflict(format!(
            "{} changed since '{}'; refusing to undo",
            entry.file_path, entry.description
        )));
    }

    match &entry.previous_content {
        Some(previous) => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, previous).await?;
        }
        None => tokio::fs::remove_file(&path).await?,
    }

    tracing::info!(
        "Undid {:?} of {} ({})",
        entry.action,
        entry.file_path,
        entry.description
    );
    Ok(())
}
