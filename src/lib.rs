// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Loom - local coding assistant over an indexed codebase.
//!
//! This crate exposes the runtime used by the `loom` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `indexer`: scan, parse, per-file metadata, symbol index and dependency graph
//! - `storage`: key-value port with memory and SQLite adapters behind a typed gateway
//! - `tools`: the tool catalogue, confirmation flow and sequential executor
//! - `session`: conversation state, stats and the bounded undo stack
//! - `agent`: model client, response parsing and the tool loop

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod indexer;
pub mod session;
pub mod storage;
pub mod tools;
pub mod utils;

pub use error::{LoomError, Result};
