// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end indexing and persistence flows through the public API.

use std::path::Path;
use std::sync::Arc;

use loom::config::Settings;
use loom::indexer::{IndexPhase, Indexer};
use loom::storage::StorageGateway;
use loom::LoomError;
use tempfile::TempDir;

fn write(root: &Path, path: &str, content: &str) {
    let full = root.join(path);
    std::fs::create_dir_all(full.parent().unwrap()).unwrap();
    std::fs::write(full, content).unwrap();
}

fn three_file_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/a.ts", "import { b } from './b';\nexport const a = b + 1;\n");
    write(dir.path(), "src/b.ts", "export const b = 1;\n");
    write(dir.path(), "src/c.ts", "import { b } from './b';\nexport function c() {\n  return b;\n}\n");
    dir
}

fn indexer_for(dir: &TempDir, storage: Arc<StorageGateway>) -> Indexer {
    Indexer::new(dir.path(), storage, &Settings::default().indexer)
}

#[tokio::test]
async fn test_three_file_project_metadata() {
    let dir = three_file_project();
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = indexer_for(&dir, storage.clone());

    let mut phases = Vec::new();
    let stats = indexer
        .index_project(|p| {
            if phases.last() != Some(&p.phase) {
                phases.push(p.phase);
            }
        })
        .await
        .unwrap();

    assert_eq!(stats.files_scanned, 3);
    assert_eq!(stats.files_parsed, 3);
    assert_eq!(stats.parse_errors, 0);
    assert_eq!(phases.first(), Some(&IndexPhase::Scanning));

    let project = indexer.project_name();
    let b = storage.get_meta(project, "src/b.ts").await.unwrap().unwrap();
    assert_eq!(b.dependents, vec!["src/a.ts".to_string(), "src/c.ts".to_string()]);
    assert!(!b.is_hub);
    assert_eq!(b.impact_score, 100);
    assert!(!b.is_entry_point);

    let a = storage.get_meta(project, "src/a.ts").await.unwrap().unwrap();
    assert_eq!(a.dependencies, vec!["src/b.ts".to_string()]);
    assert!(a.is_entry_point);
    assert_eq!(a.impact_score, 0);

    let graph = storage.get_deps_graph(project).await.unwrap().unwrap();
    for (from, targets) in &graph.imports {
        for to in targets {
            assert!(graph.imported_by[to].contains(from));
        }
    }

    let symbols = storage.get_symbol_index(project).await.unwrap().unwrap();
    assert_eq!(symbols["c"][0].path, "src/c.ts");

    let record = storage.get_project(project).await.unwrap().unwrap();
    assert_eq!(record.file_count, 3);
    assert!(record.last_indexed_at.is_some());
    assert!(!record.indexing_in_progress);
}

#[tokio::test]
async fn test_incremental_update_and_remove() {
    let dir = three_file_project();
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = indexer_for(&dir, storage.clone());
    indexer.index_project(|_| {}).await.unwrap();
    let project = indexer.project_name().to_string();

    // c stops importing b
    let changed = indexer
        .update_file("src/c.ts", "export function c() {\n  return 2;\n}\n")
        .await
        .unwrap();
    assert!(changed);
    let b = storage.get_meta(&project, "src/b.ts").await.unwrap().unwrap();
    assert_eq!(b.dependents, vec!["src/a.ts".to_string()]);
    assert_eq!(b.impact_score, 50);

    // identical content is a no-op
    let unchanged = indexer
        .update_file("src/c.ts", "export function c() {\n  return 2;\n}\n")
        .await
        .unwrap();
    assert!(!unchanged);

    assert!(indexer.remove_file("src/a.ts").await.unwrap());
    let b = storage.get_meta(&project, "src/b.ts").await.unwrap().unwrap();
    assert!(b.dependents.is_empty());
    assert!(b.is_entry_point);
    assert!(storage.get_file(&project, "src/a.ts").await.unwrap().is_none());

    let graph = storage.get_deps_graph(&project).await.unwrap().unwrap();
    assert!(!graph.contains("src/a.ts"));
}

#[tokio::test]
async fn test_bad_file_does_not_abort_indexing() {
    let dir = three_file_project();
    write(dir.path(), "src/broken.ts", "export function broken() {\n  if (x) {\n");
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = indexer_for(&dir, storage.clone());

    let stats = indexer.index_project(|_| {}).await.unwrap();
    assert_eq!(stats.files_scanned, 4);
    assert_eq!(stats.parse_errors, 1);

    let ast = storage
        .get_ast(indexer.project_name(), "src/broken.ts")
        .await
        .unwrap()
        .unwrap();
    assert!(ast.parse_error);
    assert!(ast.functions.is_empty());
}

#[tokio::test]
async fn test_regex_literals_keep_dependency_edges() {
    let dir = three_file_project();
    write(
        dir.path(),
        "src/d.ts",
        "import { b } from './b';\nconst braces = /[{(]/;\nexport function d(s: string) {\n  if (s.match(/'/)) {\n    return b;\n  }\n  return braces.test(s) ? 1 : 0;\n}\n",
    );
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = indexer_for(&dir, storage.clone());

    let stats = indexer.index_project(|_| {}).await.unwrap();
    assert_eq!(stats.parse_errors, 0);

    let b = storage.get_meta(indexer.project_name(), "src/b.ts").await.unwrap().unwrap();
    assert_eq!(
        b.dependents,
        vec!["src/a.ts".to_string(), "src/c.ts".to_string(), "src/d.ts".to_string()]
    );
    let symbols = storage.get_symbol_index(indexer.project_name()).await.unwrap().unwrap();
    assert_eq!(symbols["d"][0].path, "src/d.ts");
}

#[tokio::test]
async fn test_external_change_detected_and_refreshed() {
    let dir = three_file_project();
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = indexer_for(&dir, storage.clone());
    indexer.index_project(|_| {}).await.unwrap();

    assert!(!indexer.needs_reindex("src/b.ts").await.unwrap());
    write(dir.path(), "src/b.ts", "export const b = 2;\n");
    assert!(indexer.needs_reindex("src/b.ts").await.unwrap());

    assert!(indexer.refresh_path("src/b.ts").await.unwrap());
    assert!(!indexer.needs_reindex("src/b.ts").await.unwrap());

    std::fs::remove_file(dir.path().join("src/b.ts")).unwrap();
    assert!(indexer.refresh_path("src/b.ts").await.unwrap());
    let a = storage.get_meta(indexer.project_name(), "src/a.ts").await.unwrap().unwrap();
    assert!(a.dependencies.is_empty());
}

#[tokio::test]
async fn test_index_persists_in_sqlite() {
    let dir = three_file_project();
    let db_dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.storage.path = Some(db_dir.path().join("loom.db"));

    {
        let storage = Arc::new(StorageGateway::from_settings(&settings));
        storage.connect().await.unwrap();
        let indexer = Indexer::new(dir.path(), storage.clone(), &settings.indexer);
        indexer.index_project(|_| {}).await.unwrap();
        storage.disconnect().await.unwrap();
    }

    let storage = Arc::new(StorageGateway::from_settings(&settings));
    let indexer = Indexer::new(dir.path(), storage.clone(), &settings.indexer);
    let files = storage.list_files(indexer.project_name()).await.unwrap();
    assert_eq!(files, vec!["src/a.ts", "src/b.ts", "src/c.ts"]);
    assert!(storage.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_index_rejected() {
    let dir = three_file_project();
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = Arc::new(indexer_for(&dir, storage));

    let slow = indexer.clone();
    let (started_tx, started_rx) = tokio::sync::oneshot::channel();
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let mut started_tx = Some(started_tx);

    let handle = tokio::spawn(async move {
        slow.index_project(move |_| {
            if let Some(tx) = started_tx.take() {
                let _ = tx.send(());
                let _ = release_rx.recv();
            }
        })
        .await
    });

    started_rx.await.unwrap();
    let err = indexer.update_file("src/b.ts", "export const b = 3;\n").await.unwrap_err();
    assert!(matches!(err, LoomError::IndexingInProgress(_)));

    release_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
