// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! System prompt construction

use crate::indexer::Project;
use crate::session::ContextState;
use crate::tools::ToolRegistry;

const PREAMBLE: &str = "You are Loom, a coding assistant working inside a local project. \
You can inspect and change the project only through the tools listed below. \
Read before you edit: fetch the exact lines you intend to change first, \
because edits are applied by line number.";

const CALL_SYNTAX: &str = r#"## Calling tools

Request a tool with a tagged block. Put each parameter in its own tag:

<tool_call name="get_lines">
<param name="path">src/index.ts</param>
<param name="start">1</param>
<param name="end">40</param>
</tool_call>

Rules:
- Paths are relative to the project root.
- Numbers, true/false and JSON arrays are written bare; everything else is text.
- You may request several tools in one reply. They run in order.
- Results come back in <tool_result> blocks. Wait for them before relying on their content.
- Edits, file creation, deletion, commits and unlisted commands need the user's approval. A declined call is final for that request; do not retry it unchanged.
- When you have nothing left to call, answer in plain prose without any tool_call tags."#;

/// Build the full system prompt for one turn.
pub fn build_system_prompt(
    registry: &ToolRegistry,
    project: Option<&Project>,
    context: &ContextState,
) -> String {
    let mut prompt = String::from(PREAMBLE);

    if let Some(project) = project {
        prompt.push_str("\n\n## Project\n");
        prompt.push_str(&format!("Root: {}\n", project.root_path.display()));
        prompt.push_str(&format!("Indexed files: {}", project.file_count));
        match project.last_indexed_at {
            Some(at) => prompt.push_str(&format!(" (indexed {})\n", at.format("%Y-%m-%d %H:%M UTC"))),
            None => prompt.push_str(" (index never completed)\n"),
        }
    }

    if !context.files_in_context.is_empty() {
        prompt.push_str("\n## Files already read this session\n");
        for path in &context.files_in_context {
            prompt.push_str(&format!("- {}\n", path));
        }
    }

    prompt.push_str("\n\n");
    prompt.push_str(CALL_SYNTAX);
    prompt.push_str("\n\n## Tools\n\n");
    prompt.push_str(&registry.schema_description());
    prompt
}
