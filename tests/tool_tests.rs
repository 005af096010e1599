// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use loom::config::{Settings, ToolSettings};
use loom::indexer::Indexer;
use loom::session::{apply_undo, UndoAction};
use loom::storage::StorageGateway;
use loom::tools::{
    confirmation_channel, Params, Tool, ToolCall, ToolCategory, ToolContext, ToolExecutor,
    ToolRegistry, ToolResult,
};

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

async fn project(settings: ToolSettings) -> (TempDir, ToolContext) {
    let dir = TempDir::new().unwrap();
    let files = [
        ("src/math.ts", "export function add(a: number, b: number) {\n  return a + b;\n}\n\nexport class Calc {\n  total = 0;\n  push(n: number) {\n    // TODO: overflow check\n    this.total = add(this.total, n);\n  }\n}\n"),
        ("src/index.ts", "import { add, Calc } from './math';\nconsole.log(add(1, 2), new Calc());\n"),
    ];
    for (path, content) in files {
        let full = dir.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }
    let storage = Arc::new(StorageGateway::in_memory());
    let indexer = Arc::new(Indexer::new(dir.path(), storage, &Settings::default().indexer));
    indexer.index_project(|_| {}).await.unwrap();
    (dir, ToolContext::for_indexer(indexer, settings))
}

async fn run(registry: &ToolRegistry, ctx: &ToolContext, name: &str, args: Value) -> ToolResult {
    registry.execute(&ToolCall::new("t1", name, params(args)), ctx).await
}

#[test]
fn test_registry_catalogue() {
    let registry = ToolRegistry::with_builtins();
    assert_eq!(registry.len(), 18);
    for name in [
        "get_lines", "get_function", "get_class", "get_structure", "edit_lines", "create_file",
        "delete_file", "find_references", "find_definition", "get_dependencies",
        "get_dependents", "get_complexity", "get_todos", "git_status", "git_diff", "git_commit",
        "run_command", "run_tests",
    ] {
        assert!(registry.has(name), "missing {}", name);
    }
    assert_eq!(registry.by_category(ToolCategory::Read).len(), 4);
    assert_eq!(registry.by_category(ToolCategory::Git).len(), 3);
    for tool in registry.by_category(ToolCategory::Read) {
        assert!(!tool.requires_confirmation());
    }
}

#[tokio::test]
async fn test_read_and_search_tools() {
    let (_dir, ctx) = project(ToolSettings::default()).await;
    let registry = ToolRegistry::with_builtins();

    let result = run(&registry, &ctx, "get_function", json!({"path": "src/math.ts", "name": "add"})).await;
    assert!(result.success, "{:?}", result.error);
    assert!(result.data.unwrap().to_string().contains("return a + b;"));

    let result = run(&registry, &ctx, "find_definition", json!({"symbol": "Calc"})).await;
    assert_eq!(result.data.unwrap()["definitions"][0]["path"], "src/math.ts");

    let result = run(&registry, &ctx, "get_dependents", json!({"path": "src/math.ts"})).await;
    assert!(result.data.unwrap().to_string().contains("src/index.ts"));

    let result = run(&registry, &ctx, "get_todos", json!({})).await;
    let data = result.data.unwrap();
    assert_eq!(data["by_type"]["TODO"], 1);
}

#[tokio::test]
async fn test_validation_fails_before_execution() {
    let (dir, ctx) = project(ToolSettings { trust_mode: true, ..ToolSettings::default() }).await;
    let registry = ToolRegistry::with_builtins();

    let result = run(&registry, &ctx, "create_file", json!({"path": "src/new.ts"})).await;
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Invalid parameters"));
    assert!(!dir.path().join("src/new.ts").exists());

    let result = run(&registry, &ctx, "get_lines", json!({"path": "../outside.ts"})).await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_edit_requires_confirmation_and_undo_restores() {
    let (dir, ctx) = project(ToolSettings::default()).await;
    let (sender, mut requests) = confirmation_channel();
    let ctx = ctx.with_confirmations(sender);
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::with_builtins()), ctx);

    let answer = tokio::spawn(async move {
        let request = requests.recv().await.unwrap();
        assert_eq!(request.tool_name, "edit_lines");
        let diff = request.diff.clone().unwrap();
        assert_eq!(diff.file_path, "src/math.ts");
        assert_eq!(diff.old_lines, vec!["  return a + b;".to_string()]);
        request.approve();
    });

    let call = ToolCall::new(
        "e1",
        "edit_lines",
        params(json!({"path": "src/math.ts", "start": 2, "end": 2, "content": "  return b + a;"})),
    );
    let result = executor.execute(&call).await;
    answer.await.unwrap();

    assert!(result.success, "{:?}", result.error);
    let path = dir.path().join("src/math.ts");
    assert!(std::fs::read_to_string(&path).unwrap().contains("return b + a;"));

    let entry = result.undo_entry.unwrap();
    assert_eq!(entry.action, UndoAction::Edit);
    assert_eq!(entry.tool_call_id.as_deref(), Some("e1"));

    apply_undo(dir.path(), &entry).await.unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("return a + b;"));
}

#[tokio::test]
async fn test_declined_edit_leaves_file_untouched() {
    let (dir, ctx) = project(ToolSettings::default()).await;
    let (sender, mut requests) = confirmation_channel();
    let ctx = ctx.with_confirmations(sender);
    let registry = ToolRegistry::with_builtins();

    let answer = tokio::spawn(async move {
        requests.recv().await.unwrap().decline();
    });
    let before = std::fs::read_to_string(dir.path().join("src/index.ts")).unwrap();
    let result = run(&registry, &ctx, "delete_file", json!({"path": "src/index.ts"})).await;
    answer.await.unwrap();

    assert!(result.declined);
    assert!(result.undo_entry.is_none());
    assert_eq!(std::fs::read_to_string(dir.path().join("src/index.ts")).unwrap(), before);
}

#[tokio::test]
async fn test_create_then_find_in_index() {
    let (dir, ctx) = project(ToolSettings { trust_mode: true, ..ToolSettings::default() }).await;
    let registry = ToolRegistry::with_builtins();

    let result = run(
        &registry,
        &ctx,
        "create_file",
        json!({"path": "src/util/format.ts", "content": "import { add } from '../math';\nexport function fmt() {\n  return String(add(1, 1));\n}\n"}),
    )
    .await;
    assert!(result.success, "{:?}", result.error);
    assert!(Path::new(&dir.path().join("src/util/format.ts")).exists());

    let result = run(&registry, &ctx, "find_definition", json!({"symbol": "fmt"})).await;
    assert_eq!(result.data.unwrap()["definitions"][0]["path"], "src/util/format.ts");

    let result = run(&registry, &ctx, "get_dependents", json!({"path": "src/math.ts"})).await;
    let text = result.data.unwrap().to_string();
    assert!(text.contains("src/util/format.ts"));
}

#[tokio::test]
async fn test_run_command_policy() {
    let (_dir, ctx) = project(ToolSettings { trust_mode: true, ..ToolSettings::default() }).await;
    let registry = ToolRegistry::with_builtins();

    let result = run(&registry, &ctx, "run_command", json!({"command": "echo hello"})).await;
    assert!(result.success, "{:?}", result.error);
    assert!(result.data.unwrap().to_string().contains("hello"));

    // blocked even in trust mode
    let result = run(&registry, &ctx, "run_command", json!({"command": "rm -rf /"})).await;
    assert!(!result.success);
    assert!(!result.declined);
}

#[tokio::test]
async fn test_results_message_format() {
    let calls = vec![
        ToolCall::new("c1", "get_lines", Params::new()),
        ToolCall::new("c2", "create_file", Params::new()),
    ];
    let results = vec![
        ToolResult::success("c1", json!({"lines": 3}), 2),
        ToolResult::declined("c2", "User declined", 0),
    ];
    let message = ToolExecutor::results_to_message(&calls, results);
    assert!(message.content.contains("<tool_result name=\"get_lines\" id=\"c1\" status=\"success\">"));
    assert!(message.content.contains("status=\"declined\""));
    assert_eq!(message.tool_results.len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_cannot_escape_root() {
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("secret.ts"), "export const token = 'x';\n").unwrap();
    let (dir, ctx) = project(ToolSettings { trust_mode: true, ..ToolSettings::default() }).await;
    std::os::unix::fs::symlink(outside.path(), dir.path().join("vendor")).unwrap();
    let registry = ToolRegistry::with_builtins();

    let result = run(&registry, &ctx, "get_lines", json!({"path": "vendor/secret.ts"})).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("outside the project root"));

    let result = run(
        &registry,
        &ctx,
        "create_file",
        json!({"path": "vendor/planted.ts", "content": "export {};\n"}),
    )
    .await;
    assert!(!result.success);
    assert!(!outside.path().join("planted.ts").exists());

    let result = run(&registry, &ctx, "delete_file", json!({"path": "vendor/secret.ts"})).await;
    assert!(!result.success);
    assert!(outside.path().join("secret.ts").exists());
}
