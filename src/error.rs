// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Loom
//!
//! This module defines all error types used throughout the crate. Outcomes
//! that are part of normal operation (parse failures on a single file,
//! truncated tool calls, declined confirmations) are carried as data on their
//! respective types instead.

use thiserror::Error;

/// Main error type for Loom operations
#[derive(Error, Debug)]
pub enum LoomError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path could not be read while scanning
    #[error("Scan error at {path}: {message}")]
    ScanIo { path: String, message: String },

    /// Storage backend unreachable after bounded retries
    #[error("Storage unreachable after {attempts} attempt(s): {message}")]
    StorageConnectivity { attempts: u32, message: String },

    /// Storage backend reported an error for an individual operation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Tool parameters failed the schema check
    #[error("Invalid parameters: {0}")]
    ParamValidation(String),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// An indexing run for this project is already in flight
    #[error("Indexing already in progress for project '{0}'")]
    IndexingInProgress(String),

    /// Session errors
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Model client errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Git repository errors
    #[error("Git error: {0}")]
    Git(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File content diverged from what an operation expected
    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Result type alias for Loom operations
pub type Result<T> = std::result::Result<T, LoomError>;

impl From<rusqlite::Error> for LoomError {
    fn from(err: rusqlite::Error) -> Self {
        LoomError::Storage(err.to_string())
    }
}

impl From<git2::Error> for LoomError {
    fn from(err: git2::Error) -> Self {
        LoomError::Git(err.message().to_string())
    }
}

impl From<reqwest::Error> for LoomError {
    fn from(err: reqwest::Error) -> Self {
        LoomError::Llm(err.to_string())
    }
}

impl LoomError {
    /// Whether retrying the same storage operation could succeed.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, LoomError::StorageConnectivity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_connectivity_message() {
        let err = LoomError::StorageConnectivity {
            attempts: 3,
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("3 attempt(s)"));
        assert!(err.to_string().contains("connection refused"));
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_param_validation_message() {
        let err = LoomError::ParamValidation("missing path".to_string());
        assert!(err.to_string().contains("Invalid parameters"));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_indexing_in_progress_names_project() {
        let err = LoomError::IndexingInProgress("projects-myapp".to_string());
        assert!(err.to_string().contains("projects-myapp"));
    }

    #[test]
    fn test_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LoomError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LoomError = json_err.into();
        assert!(matches!(err, LoomError::Json(_)));
    }

    #[test]
    fn test_from_rusqlite() {
        let err: LoomError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, LoomError::Storage(_)));
    }

    #[test]
    fn test_result_alias() {
        fn fails() -> Result<u8> {
            Err(LoomError::Conflict("changed on disk".to_string()))
        }
        assert!(fails().unwrap_err().to_string().contains("changed on disk"));
    }
}
