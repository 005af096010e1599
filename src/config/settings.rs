// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Loom
//!
//! Handles loading and saving settings from ~/.loom/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod io;
mod validation;

/// Main settings structure, stored in ~/.loom/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// File scanning and indexing
    #[serde(default)]
    pub indexer: IndexerSettings,

    /// Persistence backend
    #[serde(default)]
    pub storage: StorageSettings,

    /// Session bookkeeping
    #[serde(default)]
    pub session: SessionSettings,

    /// Model endpoint
    #[serde(default)]
    pub llm: LlmSettings,

    /// Tool execution
    #[serde(default)]
    pub tools: ToolSettings,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentSettings,
}

/// Scanner and indexer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Extensions that are indexed (without the leading dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names that are never descended into
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,

    /// Extensions that are always treated as binary
    #[serde(default = "default_binary_extensions")]
    pub binary_extensions: Vec<String>,

    /// Files larger than this are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Whether .gitignore rules are honoured
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            ignore_dirs: default_ignore_dirs(),
            binary_extensions: default_binary_extensions(),
            max_file_size: default_max_file_size(),
            respect_gitignore: true,
        }
    }
}

/// Storage backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file (defaults to ~/.loom/loom.db)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Connection attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: None,
            connect_attempts: default_connect_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Maximum number of undo entries kept per session
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,

    /// Token usage ratio above which the context needs compression
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,

    /// Context window of the model, in tokens
    #[serde(default = "default_context_window")]
    pub context_window_tokens: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            undo_capacity: default_undo_capacity(),
            compression_threshold: default_compression_threshold(),
            context_window_tokens: default_context_window(),
        }
    }
}

/// Model endpoint settings (Ollama-compatible chat API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

/// Tool execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Timeout for run_command / run_tests, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Approve every confirmation automatically
    #[serde(default)]
    pub trust_mode: bool,

    /// Extra command prefixes that run without confirmation
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Extra command prefixes that are always refused
    #[serde(default)]
    pub blocked_commands: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            trust_mode: false,
            allowed_commands: Vec::new(),
            blocked_commands: Vec::new(),
        }
    }
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model round-trips allowed per user message
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "js", "jsx", "mjs", "cjs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignore_dirs() -> Vec<String> {
    [
        "node_modules",
        ".git",
        "dist",
        "build",
        "coverage",
        ".next",
        ".nuxt",
        ".turbo",
        ".cache",
        "out",
        "target",
        "vendor",
        "__pycache__",
        ".venv",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_binary_extensions() -> Vec<String> {
    [
        "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "pdf", "zip", "tar", "gz",
        "tgz", "7z", "rar", "exe", "dll", "so", "dylib", "bin", "wasm", "woff", "woff2", "ttf",
        "otf", "eot", "mp3", "mp4", "wav", "avi", "mov", "sqlite", "db", "lock",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_undo_capacity() -> usize {
    10
}

fn default_compression_threshold() -> f64 {
    0.8
}

fn default_context_window() -> u64 {
    128_000
}

fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_llm_model() -> String {
    "qwen2.5-coder:7b-instruct".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.1
}

fn default_command_timeout() -> u64 {
    30
}

fn default_max_tool_rounds() -> usize {
    10
}
