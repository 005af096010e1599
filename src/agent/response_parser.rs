// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-call extraction from model output
//!
//! The model requests tools with tagged blocks embedded in prose:
//!
//! ```text
//! <tool_call name="get_lines">
//! <param name="path">src/app.ts</param>
//! <param name="start">10</param>
//! </tool_call>
//! ```
//!
//! Parameter text is coerced to JSON in this order: `true`/`false`, `null`,
//! `undefined` (parameter dropped), integer, decimal, JSON array or object,
//! then plain string.

use regex::Regex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use crate::tools::{Params, ToolCall};

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<tool_call\s+name\s*=\s*"([^"]*)"\s*>"#).unwrap());

static CLOSE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</tool_call\s*>").unwrap());

static PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<param\s+name\s*=\s*"([^"]*)"\s*>(.*?)</param\s*>"#).unwrap()
});

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").unwrap());

static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());

static EXTRA_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Result of parsing one model response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedResponse {
    /// Prose with every complete call removed
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// The response ends inside an unclosed call
    pub incomplete_tool_call: bool,
}

/// Extracts tool calls; ids come from a per-instance counter.
#[derive(Debug)]
pub struct ResponseParser {
    prefix: String,
    counter: AtomicU64,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new("call")
    }
}

impl ResponseParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", self.prefix, n)
    }

    /// Parse raw model output.
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let last_open = OPEN_TAG.find_iter(raw).last().map(|m| m.start());
        let last_close = CLOSE_TAG.find_iter(raw).last().map(|m| m.start());
        let incomplete_tool_call = match (last_open, last_close) {
            (Some(open), Some(close)) => open > close,
            (Some(_), None) => true,
            _ => false,
        };

        let mut tool_calls = Vec::new();
        let mut text = String::with_capacity(raw.len());
        let mut cursor = 0;

        while let Some(open) = OPEN_TAG.captures_at(raw, cursor) {
            let (Some(tag), Some(name)) = (open.get(0), open.get(1)) else {
                break;
            };
            let Some(close) = CLOSE_TAG.find_at(raw, tag.end()) else {
                break;
            };
            // An open tag followed by another open before any close never completes.
            if let Some(next_open) = OPEN_TAG.find_at(raw, tag.end()) {
                if next_open.start() < close.start() {
                    text.push_str(&raw[cursor..next_open.start()]);
                    cursor = next_open.start();
                    continue;
                }
            }

            text.push_str(&raw[cursor..tag.start()]);
            tool_calls.push(ToolCall::new(
                self.next_id(),
                name.as_str().trim(),
                parse_params(&raw[tag.end()..close.start()]),
            ));
            cursor = close.end();
        }
        text.push_str(&raw[cursor..]);

        if let Some(dangling) = OPEN_TAG.find(&text) {
            text.truncate(dangling.start());
        }
        let text = EXTRA_NEWLINES.replace_all(&text, "\n\n").trim().to_string();

        ParsedResponse {
            text,
            tool_calls,
            incomplete_tool_call,
        }
    }
}

/// Every parameter in a call body, in document order.
fn parse_params(body: &str) -> Params {
    let mut params = Params::new();
    for caps in PARAM.captures_iter(body) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        if let Some(value) = coerce_value(value.as_str()) {
            params.insert(name.as_str().trim().to_string(), value);
        }
    }
    params
}

/// Coerce parameter text to a JSON value; `None` for `undefined`.
pub fn coerce_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        "null" => return Some(Value::Null),
        "undefined" => return None,
        _ => {}
    }

    if INTEGER.is_match(trimmed) {
        if let Ok(n) = trimmed.parse::<i64>() {
            return Some(Value::from(n));
        }
    }
    if INTEGER.is_match(trimmed) || DECIMAL.is_match(trimmed) {
        if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return Some(Value::Number(n));
        }
    }
    if (trimmed.starts_with('[') && trimmed.ends_with(']'))
        || (trimmed.starts_with('{') && trimmed.ends_with('}'))
    {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Some(value);
        }
    }

    Some(Value::String(strip_edge_newline(raw).to_string()))
}

/// Drop the single newline that usually follows `>` and precedes `</param>`.
fn strip_edge_newline(raw: &str) -> &str {
    let raw = raw
        .strip_prefix("\r\n")
        .or_else(|| raw.strip_prefix('\n'))
        .unwrap_or(raw);
    raw.strip_suffix("\r\n")
        .or_else(|| raw.strip_suffix('\n'))
        .unwrap_or(raw)
}
