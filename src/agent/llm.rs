// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Language model client port
//!
//! The agent only needs one capability from a model: take the conversation and
//! return the next assistant text. `OllamaClient` speaks the Ollama-compatible
//! `/api/chat` endpoint without streaming.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmSettings;
use crate::error::{LoomError, Result};
use crate::session::{ChatMessage, Role};

/// One model reply
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Anything that can continue a conversation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Produce the next assistant message for `messages`.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse>;
}

/// Client for an Ollama-compatible chat endpoint
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature: None,
        }
    }

    /// Build from settings, applying the request timeout.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: Some(settings.temperature),
        })
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Check that the server answers.
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => Err(self.map_send_error(e)),
        }
    }

    fn map_send_error(&self, err: reqwest::Error) -> LoomError {
        if err.is_connect() {
            LoomError::Llm(format!(
                "Model server at {} is not running. Start Ollama or run 'ollama serve'",
                self.base_url
            ))
        } else if err.is_timeout() {
            LoomError::Llm("Model request timed out".to_string())
        } else {
            LoomError::from(err)
        }
    }

    fn build_request(&self, messages: &[ChatMessage]) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: messages.iter().map(convert_message).collect(),
            stream: false,
            options: self.temperature.map(|t| OllamaOptions {
                temperature: Some(t),
            }),
        }
    }
}

/// Tool results travel back as user turns; the protocol is plain text.
fn convert_message(message: &ChatMessage) -> OllamaMessage {
    let role = match message.role {
        Role::System => "system",
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    };
    OllamaMessage {
        role: role.to_string(),
        content: message.content.clone(),
    }
}

fn parse_error(status: u16, body: &str) -> LoomError {
    let message = serde_json::from_str::<OllamaError>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());
    if message.contains("model") && message.contains("not found") {
        LoomError::Llm(format!("Model not found: {}", message))
    } else {
        LoomError::Llm(format!("Model server returned {}: {}", status, message))
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<LlmResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_request(messages);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &body));
        }

        let api_response: OllamaResponse = response.json().await?;
        tracing::debug!(
            model = %self.model,
            prompt_tokens = ?api_response.prompt_eval_count,
            completion_tokens = ?api_response.eval_count,
            "model reply received"
        );

        Ok(LlmResponse {
            content: api_response.message.content,
            prompt_tokens: api_response.prompt_eval_count.unwrap_or(0).max(0) as u64,
            completion_tokens: api_response.eval_count.unwrap_or(0).max(0) as u64,
        })
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    prompt_eval_count: Option<i64>,
    #[serde(default)]
    eval_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}
