// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File-backed `KvStore` adapter on SQLite.
//!
//! Hashes live in `kv_hash (key, field, value)`; lists live in
//! `kv_list (key, seq, value)` where the highest `seq` is the newest entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use super::KvStore;
use crate::error::{LoomError, Result};

/// SQLite-backed key-value store.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
    /// Create a store for a database file. Nothing is opened until `connect`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            conn: Mutex::new(None),
        }
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path).map_err(|e| {
            LoomError::Storage(format!(
                "Failed to open database {}: {}",
                self.path.display(),
                e
            ))
        })?;
        init_schema(&conn)?;
        Ok(conn)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| LoomError::Storage("sqlite store lock poisoned".to_string()))?;
        let conn = guard
            .as_mut()
            .ok_or_else(|| LoomError::Storage("sqlite store is not connected".to_string()))?;
        Ok(f(conn)?)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv_hash (
            key TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (key, field)
        );
        CREATE TABLE IF NOT EXISTS kv_list (
            key TEXT NOT NULL,
            seq INTEGER NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (key, seq)
        );",
    )
    .map_err(|e| LoomError::Storage(format!("Failed to create schema: {}", e)))
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| LoomError::Storage("sqlite store lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(self.open()?);
            tracing::debug!("Opened storage at {}", self.path.display());
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| LoomError::Storage("sqlite store lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, field],
                |row| row.get(0),
            )
            .optional()
        })
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)",
                params![key, field, value],
            )
            .map(|_| ())
        })
    }

    async fn hset_many(&self, key: &str, entries: Vec<(String, String)>) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO kv_hash (key, field, value) VALUES (?1, ?2, ?3)",
                )?;
                for (field, value) in &entries {
                    stmt.execute(params![key, field, value])?;
                }
            }
            tx.commit()
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT field, value FROM kv_hash WHERE key = ?1")?;
            let rows = stmt.query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_hash WHERE key = ?1 AND field = ?2",
                params![key, field],
            )
            .map(|n| n > 0)
        })
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM kv_hash WHERE key = ?1", params![key])?;
            tx.execute("DELETE FROM kv_list WHERE key = ?1", params![key])?;
            tx.commit()
        })
    }

    async fn lpush(&self, key: &str, value: String) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_list (key, seq, value)
                 VALUES (?1, (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv_list WHERE key = ?1), ?2)",
                params![key, value],
            )
            .map(|_| ())
        })
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let top: Option<(i64, String)> = tx
                .query_row(
                    "SELECT seq, value FROM kv_list WHERE key = ?1 ORDER BY seq DESC LIMIT 1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((seq, _)) = &top {
                tx.execute(
                    "DELETE FROM kv_list WHERE key = ?1 AND seq = ?2",
                    params![key, seq],
                )?;
            }
            tx.commit()?;
            Ok(top.map(|(_, value)| value))
        })
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM kv_list WHERE key = ?1 ORDER BY seq DESC")?;
            let rows = stmt.query_map(params![key], |row| row.get(0))?;
            rows.collect()
        })
    }

    async fn ltrim(&self, key: &str, len: usize) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_list WHERE key = ?1 AND seq NOT IN
                    (SELECT seq FROM kv_list WHERE key = ?1 ORDER BY seq DESC LIMIT ?2)",
                params![key, len as i64],
            )
            .map(|_| ())
        })
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM kv_list WHERE key = ?1 AND value = ?2",
                params![key, value],
            )
            .map(|_| ())
        })
    }

    async fn replace_list(&self, key: &str, values: Vec<String>) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM kv_list WHERE key = ?1", params![key])?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO kv_list (key, seq, value) VALUES (?1, ?2, ?3)")?;
                // values are newest first; the newest gets the highest seq
                let count = values.len() as i64;
                for (i, value) in values.iter().enumerate() {
                    stmt.execute(params![key, count - i as i64, value])?;
                }
            }
            tx.commit()
        })
    }

    async fn del_prefix(&self, prefix: &str) -> Result<()> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM kv_hash WHERE key LIKE ?1 ESCAPE '\\'",
                params![pattern],
            )?;
            tx.execute(
                "DELETE FROM kv_list WHERE key LIKE ?1 ESCAPE '\\'",
                params![pattern],
            )?;
            tx.commit()
        })
    }

    async fn flush(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute_batch("DELETE FROM kv_hash; DELETE FROM kv_list;"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteStore {
        let store = SqliteStore::new(dir.path().join("nested").join("loom.db"));
        store.connect().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        store.hset("k", "f", "v".into()).await.unwrap();
        store.connect().await.unwrap();
        assert_eq!(store.hget("k", "f").await.unwrap().as_deref(), Some("v"));
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_not_connected_is_error() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("loom.db"));
        assert!(!store.is_connected());
        assert!(store.hget("k", "f").await.is_err());
    }

    #[tokio::test]
    async fn test_hash_roundtrip_persists_across_reconnect() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .hset_many(
                "project:p:indexes",
                vec![
                    ("symbols".into(), "{}".into()),
                    ("deps_graph".into(), "{}".into()),
                ],
            )
            .await
            .unwrap();
        store.disconnect().await.unwrap();
        store.connect().await.unwrap();

        let all = store.hgetall("project:p:indexes").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.hdel("project:p:indexes", "symbols").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_semantics() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        for v in ["1", "2", "3", "4"] {
            store.lpush("l", v.into()).await.unwrap();
        }
        assert_eq!(store.lrange("l").await.unwrap(), vec!["4", "3", "2", "1"]);

        store.ltrim("l", 3).await.unwrap();
        assert_eq!(store.lrange("l").await.unwrap(), vec!["4", "3", "2"]);

        assert_eq!(store.lpop("l").await.unwrap().as_deref(), Some("4"));
        assert_eq!(store.lrange("l").await.unwrap(), vec!["3", "2"]);

        store
            .replace_list("l", vec!["c".into(), "b".into(), "a".into()])
            .await
            .unwrap();
        assert_eq!(store.lrange("l").await.unwrap(), vec!["c", "b", "a"]);

        store.lpush("l", "d".into()).await.unwrap();
        assert_eq!(store.lpop("l").await.unwrap().as_deref(), Some("d"));

        store.lrem("l", "b").await.unwrap();
        assert_eq!(store.lrange("l").await.unwrap(), vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_del_prefix_escapes_wildcards() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store.hset("project:a_b:files", "x", "1".into()).await.unwrap();
        store.hset("project:axb:files", "x", "1".into()).await.unwrap();

        store.del_prefix("project:a_b:").await.unwrap();

        assert!(store.hgetall("project:a_b:files").await.unwrap().is_empty());
        assert_eq!(store.hgetall("project:axb:files").await.unwrap().len(), 1);
    }
}
