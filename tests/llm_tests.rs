// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model client and agent loop against a mock Ollama server.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use loom::agent::{coerce_value, Agent, LlmClient, OllamaClient, ResponseParser};
use loom::config::{Settings, ToolSettings};
use loom::indexer::Indexer;
use loom::session::{ChatMessage, Role};
use loom::storage::StorageGateway;
use loom::tools::{ToolContext, ToolExecutor, ToolRegistry};

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "test",
        "message": {"role": "assistant", "content": content},
        "done": true,
        "prompt_eval_count": 1200,
        "eval_count": 40,
    }))
}

async fn agent_for(server: &MockServer, dir: &TempDir, storage: Arc<StorageGateway>) -> Agent {
    let mut settings = Settings::default();
    settings.tools = ToolSettings {
        trust_mode: true,
        ..ToolSettings::default()
    };
    let indexer = Arc::new(Indexer::new(dir.path(), storage, &settings.indexer));
    indexer.index_project(|_| {}).await.unwrap();

    let ctx = ToolContext::for_indexer(indexer, settings.tools.clone());
    let executor = ToolExecutor::new(Arc::new(ToolRegistry::with_builtins()), ctx);
    let llm = Arc::new(OllamaClient::new(server.uri(), "test"));
    Agent::new(llm, executor, &settings)
}

#[tokio::test]
async fn test_ollama_client_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply("Hello from the model"))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri(), "test");
    let response = client
        .chat(&[
            ChatMessage::new(Role::System, "be brief"),
            ChatMessage::user("hi"),
        ])
        .await
        .unwrap();

    assert_eq!(response.content, "Hello from the model");
    assert_eq!(response.prompt_tokens, 1200);
    assert_eq!(response.total_tokens(), 1240);
}

#[tokio::test]
async fn test_ollama_server_error_surfaces() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "out of memory"})))
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri(), "test");
    let err = client.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
    assert!(err.to_string().contains("out of memory"));
}

#[tokio::test]
async fn test_agent_reads_file_then_answers() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(
        dir.path().join("src/greet.ts"),
        "export function greet(name: string) {\n  return `hi ${name}`;\n}\n",
    )
    .unwrap();

    let server = MockServer::start().await;
    // second round: the function body has been fed back
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_string_contains("hi ${name}"))
        .respond_with(reply("greet returns a template string."))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(reply(
            "Let me look.\n<tool_call name=\"get_function\">\n<param name=\"path\">src/greet.ts</param>\n<param name=\"name\">greet</param>\n</tool_call>",
        ))
        .mount(&server)
        .await;

    let storage = Arc::new(StorageGateway::in_memory());
    let agent = agent_for(&server, &dir, storage.clone()).await;
    let mut session = agent.new_session();

    let outcome = agent
        .handle_message(&mut session, "What does greet return?")
        .await
        .unwrap();

    assert_eq!(outcome.rounds, 2);
    assert_eq!(outcome.text, "greet returns a template string.");
    assert_eq!(outcome.tool_results.len(), 1);
    assert!(outcome.tool_results[0].success);
    assert_eq!(session.stats.tool_calls, 1);
    assert!(session.context.files_in_context.contains(&"src/greet.ts".to_string()));

    let stored = storage
        .load_session(&session.id, 10)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.history.len(), session.history.len());
}

#[tokio::test]
async fn test_agent_persists_user_message_when_model_down() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("index.ts"), "export const x = 1;\n").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "model 'test' not found"})))
        .mount(&server)
        .await;

    let storage = Arc::new(StorageGateway::in_memory());
    let agent = agent_for(&server, &dir, storage.clone()).await;
    let mut session = agent.new_session();

    let err = agent.handle_message(&mut session, "hello").await.unwrap_err();
    assert!(err.to_string().contains("Model not found"));

    let stored = storage.load_session(&session.id, 10).await.unwrap().unwrap();
    assert_eq!(stored.history.len(), 1);
    assert_eq!(stored.history[0].content, "hello");
}

#[test]
fn test_parser_public_api() {
    let parser = ResponseParser::new("turn");
    let parsed = parser.parse(
        "Checking.\n<tool_call name=\"get_lines\">\n<param name=\"path\">a.ts</param>\n<param name=\"start\">3</param>\n</tool_call>\nDone.",
    );
    assert_eq!(parsed.tool_calls.len(), 1);
    assert_eq!(parsed.tool_calls[0].id, "turn_1");
    assert_eq!(parsed.tool_calls[0].params["start"], json!(3));
    assert!(!parsed.incomplete_tool_call);
    assert!(parsed.text.contains("Checking."));
    assert!(parsed.text.contains("Done."));
    assert!(!parsed.text.contains("tool_call"));
}

#[test]
fn test_coerce_value_public_api() {
    assert_eq!(coerce_value("true"), Some(json!(true)));
    assert_eq!(coerce_value("-7"), Some(json!(-7)));
    assert_eq!(coerce_value("2.5"), Some(json!(2.5)));
    assert_eq!(coerce_value("[1, 2]"), Some(json!([1, 2])));
    assert_eq!(coerce_value("undefined"), None);
    assert_eq!(coerce_value("src/a.ts"), Some(json!("src/a.ts")));
}
