// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use loom::config::Settings;
use tempfile::TempDir;

#[test]
fn test_settings_default_values() {
    let settings = Settings::default();

    assert_eq!(settings.session.undo_capacity, 10);
    assert!((settings.session.compression_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(settings.session.context_window_tokens, 128_000);
    assert_eq!(settings.llm.base_url, "http://localhost:11434");
    assert_eq!(settings.llm.model, "qwen2.5-coder:7b-instruct");
    assert_eq!(settings.llm.timeout_secs, 120);
    assert!((settings.llm.temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(settings.tools.command_timeout_secs, 30);
    assert!(!settings.tools.trust_mode);
    assert_eq!(settings.agent.max_tool_rounds, 10);
}

#[test]
fn test_storage_retry_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.storage.connect_attempts, 3);
    assert_eq!(settings.storage.base_delay_ms, 100);
    assert_eq!(settings.storage.max_delay_ms, 1000);
    assert!(settings.storage.path.is_none());
}

#[test]
fn test_indexer_defaults_cover_typescript() {
    let settings = Settings::default();
    for ext in ["ts", "tsx", "js", "jsx"] {
        assert!(settings.indexer.extensions.iter().any(|e| e == ext));
    }
    assert!(settings.indexer.ignore_dirs.iter().any(|d| d == "node_modules"));
    assert!(settings.indexer.respect_gitignore);
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("settings.json");

    let mut settings = Settings::default();
    settings.llm.model = "codellama:13b".to_string();
    settings.session.undo_capacity = 25;
    settings.tools.blocked_commands = vec!["curl".to_string()];
    settings.save_to(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.llm.model, "codellama:13b");
    assert_eq!(loaded.session.undo_capacity, 25);
    assert_eq!(loaded.tools.blocked_commands, vec!["curl".to_string()]);
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"agent": {"max_tool_rounds": 4}, "tools": {"trust_mode": true}}"#).unwrap();

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.agent.max_tool_rounds, 4);
    assert!(settings.tools.trust_mode);
    assert_eq!(settings.tools.command_timeout_secs, 30);
    assert_eq!(settings.session.undo_capacity, 10);
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
    assert_eq!(settings.agent.max_tool_rounds, 10);
}

#[test]
fn test_invalid_values_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"session": {"compression_threshold": 1.5}}"#).unwrap();

    let err = Settings::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("compression_threshold"));
}

#[test]
fn test_malformed_json_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(Settings::load_from(&path).is_err());
}

#[test]
fn test_storage_path_override() {
    let dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.storage.path = Some(dir.path().join("custom.db"));
    assert_eq!(settings.storage_path(), dir.path().join("custom.db"));
}
