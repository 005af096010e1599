// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-process `KvStore` adapter.
//!
//! Used by tests and one-shot runs. It can simulate an unreachable backend:
//! `set_available(false)` makes `connect` fail and drops the connection, and
//! `fail_next_connects(n)` makes only the next `n` connects fail.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::KvStore;
use crate::error::{LoomError, Result};

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
}

/// Memory-backed key-value store.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    connected: AtomicBool,
    available: AtomicBool,
    failing_connects: AtomicU32,
    connect_calls: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            connected: AtomicBool::new(false),
            available: AtomicBool::new(true),
            failing_connects: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.connected.store(false, Ordering::SeqCst);
        }
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Number of `connect` calls made so far.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LoomError::Storage("memory store is not connected".to_string()));
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| LoomError::Storage("memory store lock poisoned".to_string()))?;
        Ok(f(&mut inner))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(LoomError::Storage("connection refused".to_string()));
        }
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(LoomError::Storage("connection refused".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.with_inner(|inner| inner.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.with_inner(|inner| {
            inner
                .hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value);
        })
    }

    async fn hset_many(&self, key: &str, entries: Vec<(String, String)>) -> Result<()> {
        self.with_inner(|inner| {
            let hash = inner.hashes.entry(key.to_string()).or_default();
            for (field, value) in entries {
                hash.insert(field, value);
            }
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_inner(|inner| inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.with_inner(|inner| {
            inner
                .hashes
                .get_mut(key)
                .map(|h| h.remove(field).is_some())
                .unwrap_or(false)
        })
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.with_inner(|inner| {
            inner.hashes.remove(key);
            inner.lists.remove(key);
        })
    }

    async fn lpush(&self, key: &str, value: String) -> Result<()> {
        self.with_inner(|inner| {
            inner
                .lists
                .entry(key.to_string())
                .or_default()
                .push_front(value);
        })
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.with_inner(|inner| inner.lists.get_mut(key).and_then(|l| l.pop_front()))
    }

    async fn lrange(&self, key: &str) -> Result<Vec<String>> {
        self.with_inner(|inner| {
            inner
                .lists
                .get(key)
                .map(|l| l.iter().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn ltrim(&self, key: &str, len: usize) -> Result<()> {
        self.with_inner(|inner| {
            if let Some(list) = inner.lists.get_mut(key) {
                list.truncate(len);
            }
        })
    }

    async fn lrem(&self, key: &str, value: &str) -> Result<()> {
        self.with_inner(|inner| {
            if let Some(list) = inner.lists.get_mut(key) {
                list.retain(|v| v != value);
            }
        })
    }

    async fn replace_list(&self, key: &str, values: Vec<String>) -> Result<()> {
        self.with_inner(|inner| {
            if values.is_empty() {
                inner.lists.remove(key);
            } else {
                inner.lists.insert(key.to_string(), values.into_iter().collect());
            }
        })
    }

    async fn del_prefix(&self, prefix: &str) -> Result<()> {
        self.with_inner(|inner| {
            inner.hashes.retain(|k, _| !k.starts_with(prefix));
            inner.lists.retain(|k, _| !k.starts_with(prefix));
        })
    }

    async fn flush(&self) -> Result<()> {
        self.with_inner(|inner| {
            inner.hashes.clear();
            inner.lists.clear();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_require_connection() {
        let store = MemoryStore::new();
        assert!(store.hget("k", "f").await.is_err());
        store.connect().await.unwrap();
        assert!(store.hget("k", "f").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        store.hset("h", "a", "1".into()).await.unwrap();
        store
            .hset_many("h", vec![("b".into(), "2".into()), ("c".into(), "3".into())])
            .await
            .unwrap();

        assert_eq!(store.hget("h", "b").await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.hgetall("h").await.unwrap().len(), 3);
        assert!(store.hdel("h", "a").await.unwrap());
        assert!(!store.hdel("h", "a").await.unwrap());

        store.del("h").await.unwrap();
        assert!(store.hgetall("h").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_operations_newest_first() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();

        for v in ["1", "2", "3"] {
            store.lpush("l", v.into()).await.unwrap();
        }
        assert_eq!(store.lrange("l").await.unwrap(), vec!["3", "2", "1"]);

        store.ltrim("l", 2).await.unwrap();
        assert_eq!(store.lrange("l").await.unwrap(), vec!["3", "2"]);

        assert_eq!(store.lpop("l").await.unwrap().as_deref(), Some("3"));
        store.lrem("l", "2").await.unwrap();
        assert!(store.lrange("l").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_del_prefix() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();
        store.hset("project:a:files", "x", "1".into()).await.unwrap();
        store.hset("project:b:files", "x", "1".into()).await.unwrap();

        store.del_prefix("project:a:").await.unwrap();

        assert!(store.hgetall("project:a:files").await.unwrap().is_empty());
        assert_eq!(store.hgetall("project:b:files").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_simulated_outage() {
        let store = MemoryStore::new();
        store.connect().await.unwrap();
        store.set_available(false);

        assert!(!store.is_connected());
        assert!(store.connect().await.is_err());

        store.set_available(true);
        store.fail_next_connects(1);
        assert!(store.connect().await.is_err());
        assert!(store.connect().await.is_ok());
        assert_eq!(store.connect_calls(), 4);
    }
}
