// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Project indexing
//!
//! The pipeline runs scan, parse, analyze, build indexes, persist:
//!
//! - [`scanner`] walks the tree and filters paths
//! - [`languages`] turns content into a [`FileAst`]
//! - [`analyzer`] derives [`FileMeta`] once every file has been parsed
//! - [`graph`] and [`symbols`] aggregate the parsed set
//!
//! # Usage
//!
//! ```no_run
//! use loom::indexer::Indexer;
//! use loom::storage::StorageGateway;
//! use loom::config::IndexerSettings;
//! use std::sync::Arc;
//!
//! # async fn example() -> loom::Result<()> {
//! let storage = Arc::new(StorageGateway::in_memory());
//! let indexer = Indexer::new("/path/to/project", storage, &IndexerSettings::default());
//! let stats = indexer.index_project(|p| println!("{:?} {}/{}", p.phase, p.current, p.total)).await?;
//! println!("{} files parsed", stats.files_parsed);
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod graph;
pub mod languages;
pub mod model;
pub mod scanner;
pub mod symbols;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::IndexerSettings;
use crate::error::{LoomError, Result};
use crate::storage::{content_hash, StorageGateway};

pub use analyzer::MetaAnalyzer;
pub use graph::{build_deps_graph, DepsGraph};
pub use languages::{FileAst, LanguageKind, ParserRegistry};
pub use model::{normalize_rel_path, Complexity, FileData, FileMeta, FileType, Project};
pub use scanner::{EntryKind, ScanEntry, ScanOptions, Scanner};
pub use symbols::{build_symbol_index, SymbolIndex, SymbolLocation};

/// Stage of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPhase {
    Scanning,
    Parsing,
    Analyzing,
    Indexing,
}

/// Progress report passed to the indexing callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingProgress {
    pub current: usize,
    pub total: usize,
    pub current_file: String,
    pub phase: IndexPhase,
}

/// Summary of a full indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_parsed: usize,
    pub parse_errors: usize,
    pub time_ms: u64,
}

/// Indexes one project root into the storage gateway.
///
/// Full runs and incremental updates share one lock; a second operation
/// started while one is in flight fails with `LoomError::IndexingInProgress`.
pub struct Indexer {
    root: PathBuf,
    project_name: String,
    storage: Arc<StorageGateway>,
    registry: ParserRegistry,
    options: ScanOptions,
    lock: Mutex<()>,
}

impl Indexer {
    pub fn new(root: impl AsRef<Path>, storage: Arc<StorageGateway>, settings: &IndexerSettings) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            project_name: Project::new(&root).name,
            root,
            storage,
            registry: ParserRegistry::new(),
            options: ScanOptions::from(settings),
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn storage(&self) -> &Arc<StorageGateway> {
        &self.storage
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .try_lock()
            .map_err(|_| LoomError::IndexingInProgress(self.project_name.clone()))
    }

    async fn load_project(&self) -> Result<Project> {
        Ok(self
            .storage
            .get_project(&self.project_name)
            .await?
            .unwrap_or_else(|| Project::new(&self.root)))
    }

    /// Scan, parse, analyze and persist the whole project.
    pub async fn index_project<F>(&self, mut on_progress: F) -> Result<IndexStats>
    where
        F: FnMut(&IndexingProgress) + Send,
    {
        let _guard = self.acquire()?;

        let mut project = self.load_project().await?;
        project.mark_indexing_started();
        self.storage.set_project(&project).await?;
        tracing::info!("Indexing {} ({})", project.name, self.root.display());

        match self.run_full_index(&mut on_progress).await {
            Ok((stats, file_count)) => {
                project.mark_indexing_completed(file_count);
                self.storage.set_project(&project).await?;
                tracing::info!(
                    "Indexed {} files ({} parse errors) in {}ms",
                    stats.files_parsed,
                    stats.parse_errors,
                    stats.time_ms
                );
                Ok(stats)
            }
            Err(e) => {
                project.mark_indexing_failed();
                if let Err(save_err) = self.storage.set_project(&project).await {
                    tracing::warn!("Failed to record indexing failure: {}", save_err);
                }
                Err(e)
            }
        }
    }

    async fn run_full_index(
        &self,
        on_progress: &mut (dyn FnMut(&IndexingProgress) + Send),
    ) -> Result<(IndexStats, usize)> {
        let started = Instant::now();
        let mut stats = IndexStats::default();

        // Scan
        let mut entries = Vec::new();
        for entry in Scanner::new(&self.root, self.options.clone()).scan() {
            if entry.kind != EntryKind::File {
                continue;
            }
            stats.files_scanned += 1;
            on_progress(&IndexingProgress {
                current: stats.files_scanned,
                total: stats.files_scanned,
                current_file: entry.path.clone(),
                phase: IndexPhase::Scanning,
            });
            entries.push(entry);
        }

        // Parse
        let total = entries.len();
        let mut files: HashMap<String, FileData> = HashMap::new();
        let mut asts: HashMap<String, FileAst> = HashMap::new();
        for (i, entry) in entries.iter().enumerate() {
            on_progress(&IndexingProgress {
                current: i + 1,
                total,
                current_file: entry.path.clone(),
                phase: IndexPhase::Parsing,
            });
            let Some(content) = read_text(&self.root.join(&entry.path)) else {
                continue;
            };
            if let Some(ast) = self.registry.parse_path(Path::new(&entry.path), &content) {
                stats.files_parsed += 1;
                if ast.parse_error {
                    stats.parse_errors += 1;
                    tracing::debug!(
                        "Parse error in {}: {}",
                        entry.path,
                        ast.parse_error_message.as_deref().unwrap_or("unknown")
                    );
                }
                asts.insert(entry.path.clone(), ast);
            }
            files.insert(
                entry.path.clone(),
                FileData::from_content(&content, entry.last_modified),
            );
        }

        // Analyze
        let graph = build_deps_graph(&asts, &self.registry);
        let symbols = build_symbol_index(&asts);
        let analyzer = MetaAnalyzer::new(&graph, asts.len());
        let mut metas: HashMap<String, FileMeta> = HashMap::new();
        let mut paths: Vec<&String> = asts.keys().collect();
        paths.sort();
        for (i, path) in paths.iter().enumerate() {
            on_progress(&IndexingProgress {
                current: i + 1,
                total: paths.len(),
                current_file: path.to_string(),
                phase: IndexPhase::Analyzing,
            });
            let content = files.get(*path).map(FileData::content).unwrap_or_default();
            metas.insert(path.to_string(), analyzer.analyze(path, &asts[*path], &content));
        }

        // Persist
        on_progress(&IndexingProgress {
            current: 1,
            total: 1,
            current_file: String::new(),
            phase: IndexPhase::Indexing,
        });
        let stale: Vec<String> = self
            .storage
            .list_files(&self.project_name)
            .await?
            .into_iter()
            .filter(|p| !files.contains_key(p))
            .collect();
        for path in &stale {
            self.storage.delete_file(&self.project_name, path).await?;
        }
        self.storage.set_files(&self.project_name, &files).await?;
        self.storage.set_asts(&self.project_name, &asts).await?;
        self.storage.set_metas(&self.project_name, &metas).await?;
        self.storage
            .write_indexes(&self.project_name, &symbols, &graph)
            .await?;

        stats.time_ms = started.elapsed().as_millis() as u64;
        Ok((stats, files.len()))
    }

    /// Re-index one file from new content.
    ///
    /// Returns `false` when the stored content already has the same hash.
    pub async fn update_file(&self, path: &str, content: &str) -> Result<bool> {
        let _guard = self.acquire()?;
        self.apply_update(&normalize_rel_path(path), content, Utc::now())
            .await
    }

    async fn apply_update(
        &self,
        path: &str,
        content: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<bool> {
        let name = &self.project_name;
        let previous = self.storage.get_file(name, path).await?;
        if previous
            .as_ref()
            .is_some_and(|p| p.hash == content_hash(content))
        {
            return Ok(false);
        }

        let data = FileData::from_content(content, last_modified);
        self.storage.set_file(name, path, &data).await?;
        if previous.is_none() {
            self.record_file_count().await?;
        }

        let Some(ast) = self.registry.parse_path(Path::new(path), content) else {
            tracing::debug!("Stored {} without parsing (unsupported kind)", path);
            return Ok(true);
        };

        let mut asts = self.storage.get_all_asts(name).await?;
        let old_graph = match self.storage.get_deps_graph(name).await? {
            Some(graph) => graph,
            None => build_deps_graph(&asts, &self.registry),
        };
        let old_count = asts.len();
        asts.insert(path.to_string(), ast.clone());
        self.storage.set_ast(name, path, &ast).await?;

        let graph = build_deps_graph(&asts, &self.registry);
        let mut complexities = HashMap::new();
        complexities.insert(
            path.to_string(),
            if ast.parse_error {
                Complexity::default()
            } else {
                analyzer::compute_complexity(content)
            },
        );

        let affected = if asts.len() != old_count {
            asts.keys().cloned().collect()
        } else {
            affected_files(path, &old_graph, &graph)
        };
        self.relink_and_persist(&asts, &graph, affected, complexities)
            .await?;
        tracing::debug!("Updated index for {}", path);
        Ok(true)
    }

    /// Drop one file from the index. Returns `false` if it was not indexed.
    pub async fn remove_file(&self, path: &str) -> Result<bool> {
        let _guard = self.acquire()?;
        self.apply_remove(&normalize_rel_path(path)).await
    }

    async fn apply_remove(&self, path: &str) -> Result<bool> {
        let name = &self.project_name;
        if self.storage.get_file(name, path).await?.is_none() {
            return Ok(false);
        }
        self.storage.delete_file(name, path).await?;

        let mut asts = self.storage.get_all_asts(name).await?;
        asts.remove(path);
        let graph = build_deps_graph(&asts, &self.registry);
        let affected: HashSet<String> = asts.keys().cloned().collect();
        self.relink_and_persist(&asts, &graph, affected, HashMap::new())
            .await?;

        self.record_file_count().await?;
        tracing::debug!("Removed {} from index", path);
        Ok(true)
    }

    /// Re-derive metadata for `affected` and write it with fresh indexes.
    ///
    /// Complexity is carried over from stored metadata unless supplied.
    async fn relink_and_persist(
        &self,
        asts: &HashMap<String, FileAst>,
        graph: &DepsGraph,
        affected: HashSet<String>,
        mut complexities: HashMap<String, Complexity>,
    ) -> Result<()> {
        let name = &self.project_name;
        let stored = self.storage.get_all_metas(name).await?;
        let analyzer = MetaAnalyzer::new(graph, asts.len());

        let mut metas = HashMap::new();
        for path in affected.iter().filter(|p| asts.contains_key(*p)) {
            let complexity = match complexities.remove(path) {
                Some(c) => c,
                None => match stored.get(path) {
                    Some(meta) => meta.complexity,
                    None => self.complexity_from_storage(path, &asts[path]).await?,
                },
            };
            metas.insert(path.clone(), analyzer.relink(path, complexity));
        }

        self.storage.set_metas(name, &metas).await?;
        self.storage
            .write_indexes(name, &build_symbol_index(asts), graph)
            .await
    }

    async fn complexity_from_storage(&self, path: &str, ast: &FileAst) -> Result<Complexity> {
        if ast.parse_error {
            return Ok(Complexity::default());
        }
        Ok(self
            .storage
            .get_file(&self.project_name, path)
            .await?
            .map(|data| analyzer::compute_complexity(&data.content()))
            .unwrap_or_default())
    }

    async fn record_file_count(&self) -> Result<()> {
        let mut project = self.load_project().await?;
        project.file_count = self.storage.list_files(&self.project_name).await?.len();
        self.storage.set_project(&project).await
    }

    /// Re-read a path from disk and update or remove it accordingly.
    pub async fn refresh_path(&self, path: &str) -> Result<bool> {
        let _guard = self.acquire()?;
        let rel = normalize_rel_path(path);
        let absolute = self.root.join(&rel);

        let readable = absolute.is_file()
            && self.options.accepts_file(&absolute)
            && scanner::is_text_file(&absolute).unwrap_or(false);
        match readable.then(|| read_text(&absolute)).flatten() {
            Some(content) => {
                let modified = std::fs::metadata(&absolute)
                    .and_then(|m| m.modified())
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                self.apply_update(&rel, &content, modified).await
            }
            None => self.apply_remove(&rel).await,
        }
    }

    /// Whether the on-disk content differs from what is indexed.
    pub async fn needs_reindex(&self, path: &str) -> Result<bool> {
        let rel = normalize_rel_path(path);
        let stored = self.storage.get_file(&self.project_name, &rel).await?;
        match (read_text(&self.root.join(&rel)), stored) {
            (Some(content), Some(data)) => Ok(content_hash(&content) != data.hash),
            (None, None) => Ok(false),
            _ => Ok(true),
        }
    }
}

/// Files whose graph-derived metadata can change when `path`'s edges change.
fn affected_files(path: &str, before: &DepsGraph, after: &DepsGraph) -> HashSet<String> {
    let mut affected = HashSet::new();
    affected.insert(path.to_string());
    for graph in [before, after] {
        affected.extend(graph.transitive_dependencies(path));
        affected.extend(graph.transitive_dependents(path));
    }
    affected
}

fn read_text(path: &Path) -> Option<String> {
    match scanner::is_text_file(path) {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("Skipping binary file {}", path.display());
            return None;
        }
        Err(e) => {
            tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
            return None;
        }
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn three_file_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.ts", "import { b } from './b';\nexport const a = b;\n");
        write(dir.path(), "src/b.ts", "export function b() {\n  return 1;\n}\n");
        write(dir.path(), "src/c.ts", "import { b } from './b';\nexport const c = b();\n");
        dir
    }

    fn indexer(dir: &TempDir) -> Indexer {
        Indexer::new(
            dir.path(),
            Arc::new(StorageGateway::in_memory()),
            &IndexerSettings::default(),
        )
    }

    async fn meta(indexer: &Indexer, path: &str) -> FileMeta {
        indexer
            .storage()
            .get_meta(indexer.project_name(), path)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_index_three_file_project() {
        let dir = three_file_project();
        let indexer = indexer(&dir);

        let stats = indexer.index_project(|_| {}).await.unwrap();
        assert_eq!(stats.files_scanned, 3);
        assert_eq!(stats.files_parsed, 3);
        assert_eq!(stats.parse_errors, 0);

        let b = meta(&indexer, "src/b.ts").await;
        assert_eq!(b.dependents, vec!["src/a.ts", "src/c.ts"]);
        assert!(!b.is_hub);
        assert_eq!(b.impact_score, 100);
        assert_eq!(b.transitive_dep_by_count, 2);

        let a = meta(&indexer, "src/a.ts").await;
        assert_eq!(a.dependencies, vec!["src/b.ts"]);
        assert!(a.is_entry_point);

        let project = indexer
            .storage()
            .get_project(indexer.project_name())
            .await
            .unwrap()
            .unwrap();
        assert!(project.is_indexed());
        assert!(!project.indexing_in_progress);
        assert_eq!(project.file_count, 3);
    }

    #[tokio::test]
    async fn test_index_reports_phases_in_order() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        let mut phases = Vec::new();

        indexer
            .index_project(|p| {
                if phases.last() != Some(&p.phase) {
                    phases.push(p.phase);
                }
            })
            .await
            .unwrap();

        assert_eq!(
            phases,
            vec![
                IndexPhase::Scanning,
                IndexPhase::Parsing,
                IndexPhase::Analyzing,
                IndexPhase::Indexing
            ]
        );
    }

    #[tokio::test]
    async fn test_parse_error_keeps_file_indexed() {
        let dir = three_file_project();
        write(dir.path(), "src/broken.ts", "export function broken() {\n");
        let indexer = indexer(&dir);

        let stats = indexer.index_project(|_| {}).await.unwrap();
        assert_eq!(stats.parse_errors, 1);

        let storage = indexer.storage();
        let ast = storage
            .get_ast(indexer.project_name(), "src/broken.ts")
            .await
            .unwrap()
            .unwrap();
        assert!(ast.parse_error);
        assert!(ast.functions.is_empty());
        assert!(storage
            .get_meta(indexer.project_name(), "src/broken.ts")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let dir = three_file_project();
        let indexer = indexer(&dir);

        let _held = indexer.acquire().unwrap();
        let err = indexer.update_file("src/a.ts", "x").await.unwrap_err();
        assert!(matches!(err, LoomError::IndexingInProgress(_)));
    }

    #[tokio::test]
    async fn test_update_same_content_is_noop() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();

        let content = fs::read_to_string(dir.path().join("src/b.ts")).unwrap();
        assert!(!indexer.update_file("src/b.ts", &content).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_file_rewires_graph() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();

        assert!(indexer
            .update_file("src/c.ts", "export const c = 3;\n")
            .await
            .unwrap());

        let b = meta(&indexer, "src/b.ts").await;
        assert_eq!(b.dependents, vec!["src/a.ts"]);
        assert_eq!(b.impact_score, 50);

        let c = meta(&indexer, "src/c.ts").await;
        assert!(c.dependencies.is_empty());

        let graph = indexer
            .storage()
            .get_deps_graph(indexer.project_name())
            .await
            .unwrap()
            .unwrap();
        assert!(graph.is_consistent());
        assert_eq!(graph.dependents("src/b.ts"), ["src/a.ts".to_string()]);
    }

    #[tokio::test]
    async fn test_new_file_recomputes_impact_for_all() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();

        indexer
            .update_file("src/d.ts", "export const d = 4;\n")
            .await
            .unwrap();

        let b = meta(&indexer, "src/b.ts").await;
        assert_eq!(b.impact_score, 67);
        let symbols = indexer
            .storage()
            .get_symbol_index(indexer.project_name())
            .await
            .unwrap()
            .unwrap();
        assert!(symbols.contains_key("d"));
    }

    #[tokio::test]
    async fn test_remove_file_updates_dependents() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();

        assert!(indexer.remove_file("src/a.ts").await.unwrap());
        assert!(!indexer.remove_file("src/a.ts").await.unwrap());

        let b = meta(&indexer, "src/b.ts").await;
        assert_eq!(b.dependents, vec!["src/c.ts"]);
        assert_eq!(b.impact_score, 100);
        assert!(indexer
            .storage()
            .get_meta(indexer.project_name(), "src/a.ts")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_refresh_path_and_needs_reindex() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();
        assert!(!indexer.needs_reindex("src/a.ts").await.unwrap());

        write(dir.path(), "src/a.ts", "export const a = 1;\n");
        assert!(indexer.needs_reindex("src/a.ts").await.unwrap());
        assert!(indexer.refresh_path("src/a.ts").await.unwrap());
        assert!(!indexer.needs_reindex("src/a.ts").await.unwrap());

        fs::remove_file(dir.path().join("src/c.ts")).unwrap();
        assert!(indexer.refresh_path("src/c.ts").await.unwrap());
        let b = meta(&indexer, "src/b.ts").await;
        assert!(b.dependents.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_drops_deleted_files() {
        let dir = three_file_project();
        let indexer = indexer(&dir);
        indexer.index_project(|_| {}).await.unwrap();

        fs::remove_file(dir.path().join("src/c.ts")).unwrap();
        indexer.index_project(|_| {}).await.unwrap();

        let files = indexer
            .storage()
            .list_files(indexer.project_name())
            .await
            .unwrap();
        assert_eq!(files, vec!["src/a.ts", "src/b.ts"]);
    }

    #[test]
    fn test_affected_files_covers_both_directions() {
        let mut before = DepsGraph::default();
        before.add_edge("a.ts", "b.ts");
        before.add_edge("b.ts", "c.ts");
        before.ensure_node("d.ts");
        let mut after = before.clone();
        after.set_dependencies("b.ts", &[]);

        let affected = affected_files("b.ts", &before, &after);
        assert!(affected.contains("a.ts"));
        assert!(affected.contains("b.ts"));
        assert!(affected.contains("c.ts"));
        assert!(!affected.contains("d.ts"));
    }
}
