// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persistence key schema.
//!
//! ```text
//! project:{name}:files     hash: path -> FileData
//! project:{name}:ast       hash: path -> FileAst
//! project:{name}:meta      hash: path -> FileMeta
//! project:{name}:indexes   hash: symbols -> SymbolIndex, deps_graph -> DepsGraph
//! project:{name}:config    hash: key -> value (the Project record lives under "project")
//! session:{id}:data        hash: history, context, stats, input_history, ...
//! session:{id}:undo        list: UndoEntry, newest first
//! sessions:list            list: session ids, newest first
//! ```

pub const SESSIONS_LIST: &str = "sessions:list";

pub const FIELD_SYMBOLS: &str = "symbols";
pub const FIELD_DEPS_GRAPH: &str = "deps_graph";
pub const FIELD_PROJECT: &str = "project";

pub const FIELD_HISTORY: &str = "history";
pub const FIELD_CONTEXT: &str = "context";
pub const FIELD_STATS: &str = "stats";
pub const FIELD_INPUT_HISTORY: &str = "input_history";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_LAST_ACTIVITY_AT: &str = "last_activity_at";
pub const FIELD_PROJECT_NAME: &str = "project_name";

pub fn project_prefix(name: &str) -> String {
    format!("project:{}:", name)
}

pub fn project_files(name: &str) -> String {
    format!("project:{}:files", name)
}

pub fn project_ast(name: &str) -> String {
    format!("project:{}:ast", name)
}

pub fn project_meta(name: &str) -> String {
    format!("project:{}:meta", name)
}

pub fn project_indexes(name: &str) -> String {
    format!("project:{}:indexes", name)
}

pub fn project_config(name: &str) -> String {
    format!("project:{}:config", name)
}

pub fn session_data(id: &str) -> String {
    format!("session:{}:data", id)
}

pub fn session_undo(id: &str) -> String {
    format!("session:{}:undo", id)
}
