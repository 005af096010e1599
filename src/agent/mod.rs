// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversational agent
//!
//! Ties a language model to the tool registry: the model answers in free
//! text with embedded tool calls, the calls are executed, and their results
//! are fed back until the model stops asking for tools.

pub mod engine;
pub mod llm;
pub mod prompt;
pub mod response_parser;

pub use engine::{Agent, TurnOutcome};
pub use llm::{LlmClient, LlmResponse, OllamaClient};
pub use prompt::build_system_prompt;
pub use response_parser::{coerce_value, ParsedResponse, ResponseParser};
