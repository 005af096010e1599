// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Persistence for project indexes and sessions
//!
//! `KvStore` is the narrow hash/list port with two adapters (`MemoryStore`,
//! `SqliteStore`). `StorageGateway` sits on top of it, owns the key schema in
//! [`keys`], connects lazily with bounded retries, and exposes typed CRUD for
//! every persisted entity.

pub mod keys;
pub mod memory;
pub mod retry;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::Result;
use crate::indexer::graph::DepsGraph;
use crate::indexer::languages::FileAst;
use crate::indexer::model::{FileData, FileMeta, Project};
use crate::indexer::symbols::SymbolIndex;
use crate::session::undo::{UndoEntry, UndoStack};
use crate::session::{ContextState, Session, SessionStats};

pub use memory::MemoryStore;
pub use retry::RetryConfig;
pub use sqlite::SqliteStore;

/// Hash and list primitives every backend provides.
///
/// Lists are ordered newest first: `lpush` prepends and `lrange` returns the
/// newest element at index 0.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Open the connection. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()>;
    /// Set several fields in one atomic write.
    async fn hset_many(&self, key: &str, entries: Vec<(String, String)>) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;
    /// Delete a key of either type.
    async fn del(&self, key: &str) -> Result<()>;

    async fn lpush(&self, key: &str, value: String) -> Result<()>;
    async fn lpop(&self, key: &str) -> Result<Option<String>>;
    async fn lrange(&self, key: &str) -> Result<Vec<String>>;
    /// Keep only the newest `len` elements.
    async fn ltrim(&self, key: &str, len: usize) -> Result<()>;
    async fn lrem(&self, key: &str, value: &str) -> Result<()>;
    /// Replace the whole list; `values` are newest first.
    async fn replace_list(&self, key: &str, values: Vec<String>) -> Result<()>;

    /// Delete every key starting with `prefix`.
    async fn del_prefix(&self, prefix: &str) -> Result<()>;
    /// Delete everything.
    async fn flush(&self) -> Result<()>;
}

/// Hex SHA-256 of file content.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

static SLUG_INVALID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").unwrap());

const ROOT_SLUG: &str = "root";

fn slugify(segment: &str) -> String {
    let lower = segment.to_lowercase();
    SLUG_INVALID
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Deterministic project name from a root path.
///
/// The last two path segments are slugified and joined with `-`; a single
/// segment yields itself and an empty or root path yields `root`.
pub fn project_slug(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let tail = &segments[segments.len().saturating_sub(2)..];

    let parts: Vec<String> = tail
        .iter()
        .map(|s| slugify(s))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        ROOT_SLUG.to_string()
    } else {
        parts.join("-")
    }
}

fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn decode<T: DeserializeOwned>(raw: Option<String>) -> Result<Option<T>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(Into::into)
}

fn decode_all<T: DeserializeOwned>(raw: HashMap<String, String>) -> Result<HashMap<String, T>> {
    raw.into_iter()
        .map(|(field, value)| Ok((field, serde_json::from_str(&value)?)))
        .collect()
}

/// Typed persistence facade shared by the indexer, the tools and the agent.
pub struct StorageGateway {
    store: Arc<dyn KvStore>,
    retry: RetryConfig,
    connect_lock: Mutex<()>,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn KvStore>, retry: RetryConfig) -> Self {
        Self {
            store,
            retry,
            connect_lock: Mutex::new(()),
        }
    }

    /// Gateway over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), RetryConfig::default())
    }

    /// Gateway over the SQLite database configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(SqliteStore::new(settings.storage_path())),
            RetryConfig::from(&settings.storage),
        )
    }

    /// Establish the connection, retrying with backoff. Idempotent.
    pub async fn connect(&self) -> Result<()> {
        if self.store.is_connected() {
            return Ok(());
        }
        let _guard = self.connect_lock.lock().await;
        if self.store.is_connected() {
            return Ok(());
        }
        let store = self.store.clone();
        retry::with_retry(
            || {
                let store = store.clone();
                async move { store.connect().await }
            },
            &self.retry,
            "storage connect",
        )
        .await?;
        tracing::debug!("Storage connected");
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        self.store.disconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Remove every project and session.
    pub async fn clear(&self) -> Result<()> {
        self.store().await?.flush().await
    }

    async fn store(&self) -> Result<&dyn KvStore> {
        self.connect().await?;
        Ok(self.store.as_ref())
    }

    async fn get_field<T: DeserializeOwned>(&self, key: &str, field: &str) -> Result<Option<T>> {
        decode(self.store().await?.hget(key, field).await?)
    }

    async fn set_field<T: Serialize>(&self, key: &str, field: &str, value: &T) -> Result<()> {
        let encoded = encode(value)?;
        self.store().await?.hset(key, field, encoded).await
    }

    async fn set_fields<T: Serialize>(&self, key: &str, values: &HashMap<String, T>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let entries = values
            .iter()
            .map(|(field, value)| Ok((field.clone(), encode(value)?)))
            .collect::<Result<Vec<_>>>()?;
        self.store().await?.hset_many(key, entries).await
    }

    // File content

    pub async fn get_file(&self, project: &str, path: &str) -> Result<Option<FileData>> {
        self.get_field(&keys::project_files(project), path).await
    }

    pub async fn set_file(&self, project: &str, path: &str, data: &FileData) -> Result<()> {
        self.set_field(&keys::project_files(project), path, data).await
    }

    pub async fn set_files(&self, project: &str, files: &HashMap<String, FileData>) -> Result<()> {
        self.set_fields(&keys::project_files(project), files).await
    }

    pub async fn get_all_files(&self, project: &str) -> Result<HashMap<String, FileData>> {
        let raw = self.store().await?.hgetall(&keys::project_files(project)).await?;
        decode_all(raw)
    }

    /// Indexed file paths, sorted.
    pub async fn list_files(&self, project: &str) -> Result<Vec<String>> {
        let raw = self.store().await?.hgetall(&keys::project_files(project)).await?;
        let mut paths: Vec<String> = raw.into_keys().collect();
        paths.sort();
        Ok(paths)
    }

    // Syntax summaries

    pub async fn get_ast(&self, project: &str, path: &str) -> Result<Option<FileAst>> {
        self.get_field(&keys::project_ast(project), path).await
    }

    pub async fn set_ast(&self, project: &str, path: &str, ast: &FileAst) -> Result<()> {
        self.set_field(&keys::project_ast(project), path, ast).await
    }

    pub async fn set_asts(&self, project: &str, asts: &HashMap<String, FileAst>) -> Result<()> {
        self.set_fields(&keys::project_ast(project), asts).await
    }

    pub async fn get_all_asts(&self, project: &str) -> Result<HashMap<String, FileAst>> {
        let raw = self.store().await?.hgetall(&keys::project_ast(project)).await?;
        decode_all(raw)
    }

    // Derived metadata

    pub async fn get_meta(&self, project: &str, path: &str) -> Result<Option<FileMeta>> {
        self.get_field(&keys::project_meta(project), path).await
    }

    pub async fn set_meta(&self, project: &str, path: &str, meta: &FileMeta) -> Result<()> {
        self.set_field(&keys::project_meta(project), path, meta).await
    }

    pub async fn set_metas(&self, project: &str, metas: &HashMap<String, FileMeta>) -> Result<()> {
        self.set_fields(&keys::project_meta(project), metas).await
    }

    pub async fn get_all_metas(&self, project: &str) -> Result<HashMap<String, FileMeta>> {
        let raw = self.store().await?.hgetall(&keys::project_meta(project)).await?;
        decode_all(raw)
    }

    /// Drop one file's content, syntax summary and metadata.
    pub async fn delete_file(&self, project: &str, path: &str) -> Result<()> {
        let store = self.store().await?;
        store.hdel(&keys::project_files(project), path).await?;
        store.hdel(&keys::project_ast(project), path).await?;
        store.hdel(&keys::project_meta(project), path).await?;
        Ok(())
    }

    // Indexes

    pub async fn get_symbol_index(&self, project: &str) -> Result<Option<SymbolIndex>> {
        self.get_field(&keys::project_indexes(project), keys::FIELD_SYMBOLS)
            .await
    }

    pub async fn get_deps_graph(&self, project: &str) -> Result<Option<DepsGraph>> {
        self.get_field(&keys::project_indexes(project), keys::FIELD_DEPS_GRAPH)
            .await
    }

    /// Write both indexes in one atomic operation so readers never see a
    /// symbol index and a graph built from different file sets.
    pub async fn write_indexes(
        &self,
        project: &str,
        symbols: &SymbolIndex,
        graph: &DepsGraph,
    ) -> Result<()> {
        let entries = vec![
            (keys::FIELD_SYMBOLS.to_string(), encode(symbols)?),
            (keys::FIELD_DEPS_GRAPH.to_string(), encode(graph)?),
        ];
        self.store()
            .await?
            .hset_many(&keys::project_indexes(project), entries)
            .await
    }

    // Project record and opaque config

    pub async fn get_project(&self, project: &str) -> Result<Option<Project>> {
        self.get_field(&keys::project_config(project), keys::FIELD_PROJECT)
            .await
    }

    pub async fn set_project(&self, project: &Project) -> Result<()> {
        self.set_field(&keys::project_config(&project.name), keys::FIELD_PROJECT, project)
            .await
    }

    pub async fn get_config(&self, project: &str, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_field(&keys::project_config(project), key).await
    }

    pub async fn set_config(&self, project: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        self.set_field(&keys::project_config(project), key, value).await
    }

    /// Remove everything stored for a project.
    pub async fn clear_project(&self, project: &str) -> Result<()> {
        self.store()
            .await?
            .del_prefix(&keys::project_prefix(project))
            .await
    }

    // Sessions

    /// Persist a session and register it in `sessions:list`.
    pub async fn save_session(&self, session: &Session) -> Result<()> {
        let entries = vec![
            (keys::FIELD_HISTORY.to_string(), encode(&session.history)?),
            (keys::FIELD_CONTEXT.to_string(), encode(&session.context)?),
            (keys::FIELD_STATS.to_string(), encode(&session.stats)?),
            (keys::FIELD_INPUT_HISTORY.to_string(), encode(&session.input_history)?),
            (keys::FIELD_CREATED_AT.to_string(), encode(&session.created_at)?),
            (keys::FIELD_LAST_ACTIVITY_AT.to_string(), encode(&session.last_activity_at)?),
            (keys::FIELD_PROJECT_NAME.to_string(), encode(&session.project_name)?),
        ];
        let undo = session
            .undo_stack
            .newest_first()
            .map(encode)
            .collect::<Result<Vec<_>>>()?;

        let store = self.store().await?;
        store.hset_many(&keys::session_data(&session.id), entries).await?;
        store.replace_list(&keys::session_undo(&session.id), undo).await?;

        let known = store.lrange(keys::SESSIONS_LIST).await?;
        if !known.iter().any(|id| id == &session.id) {
            store.lpush(keys::SESSIONS_LIST, session.id.clone()).await?;
        }
        Ok(())
    }

    /// Load a session, or `None` when nothing is stored under `id`.
    pub async fn load_session(&self, id: &str, undo_capacity: usize) -> Result<Option<Session>> {
        let store = self.store().await?;
        let mut data = store.hgetall(&keys::session_data(id)).await?;
        if data.is_empty() {
            return Ok(None);
        }

        let mut take = |field: &str| data.remove(field);
        let created_at = decode(take(keys::FIELD_CREATED_AT))?.unwrap_or_else(chrono::Utc::now);
        let last_activity_at = decode(take(keys::FIELD_LAST_ACTIVITY_AT))?.unwrap_or(created_at);
        let project_name: String = decode(take(keys::FIELD_PROJECT_NAME))?.unwrap_or_default();
        let history = decode(take(keys::FIELD_HISTORY))?.unwrap_or_default();
        let context: ContextState = decode(take(keys::FIELD_CONTEXT))?.unwrap_or_default();
        let stats: SessionStats = decode(take(keys::FIELD_STATS))?.unwrap_or_default();
        let input_history = decode(take(keys::FIELD_INPUT_HISTORY))?.unwrap_or_default();

        let undo = self.list_undo(id).await?;

        Ok(Some(Session {
            id: id.to_string(),
            project_name,
            created_at,
            last_activity_at,
            history,
            context,
            undo_stack: UndoStack::from_newest_first(undo_capacity, undo),
            stats,
            input_history,
        }))
    }

    /// Delete a session and its undo list.
    pub async fn delete_session(&self, id: &str) -> Result<()> {
        let store = self.store().await?;
        store.del(&keys::session_data(id)).await?;
        store.del(&keys::session_undo(id)).await?;
        store.lrem(keys::SESSIONS_LIST, id).await
    }

    /// Known session ids, most recently created first.
    pub async fn list_sessions(&self) -> Result<Vec<String>> {
        self.store().await?.lrange(keys::SESSIONS_LIST).await
    }

    /// Push onto a session's undo list, keeping at most `capacity` entries.
    pub async fn push_undo(&self, session_id: &str, entry: &UndoEntry, capacity: usize) -> Result<()> {
        let key = keys::session_undo(session_id);
        let store = self.store().await?;
        store.lpush(&key, encode(entry)?).await?;
        store.ltrim(&key, capacity.max(1)).await
    }

    pub async fn pop_undo(&self, session_id: &str) -> Result<Option<UndoEntry>> {
        let raw = self
            .store()
            .await?
            .lpop(&keys::session_undo(session_id))
            .await?;
        decode(raw)
    }

    /// Undo entries, newest first.
    pub async fn list_undo(&self, session_id: &str) -> Result<Vec<UndoEntry>> {
        self.store()
            .await?
            .lrange(&keys::session_undo(session_id))
            .await?
            .iter()
            .map(|raw| Ok(serde_json::from_str(raw)?))
            .collect()
    }
}
