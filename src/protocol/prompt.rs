//! Conversation flattening.
//!
//! The vendor accepts one prompt string per request, so the OpenAI message
//! list is rendered into role-labelled turns. Earlier tool calls and their
//! results are rendered in the same markup the tool preamble teaches, so the
//! model sees its own invocations the way it is asked to write them.

use std::collections::HashMap;

use crate::blocks::render_invocation;
use crate::protocol::openai_chat::OpenAiMessage;

const TURN_SEPARATOR: &str = "\n\n";

/// Vendor prompt plus the image URLs found in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenedPrompt {
    pub prompt: String,
    pub images: Vec<String>,
}

/// Flatten `messages` into a single vendor prompt.
///
/// `tool_preamble` is placed before every turn as a system section. A lone
/// user message without a preamble is passed through unlabelled.
#[must_use]
pub fn flatten_messages(messages: &[OpenAiMessage], tool_preamble: Option<&str>) -> FlattenedPrompt {
    let images: Vec<String> = messages.iter().flat_map(OpenAiMessage::image_urls).collect();

    if tool_preamble.is_none() {
        if let [only] = messages {
            if only.role == "user" {
                return FlattenedPrompt {
                    prompt: only.text(),
                    images,
                };
            }
        }
    }

    let tool_names = tool_names_by_call_id(messages);
    let mut turns: Vec<String> = Vec::with_capacity(messages.len() + 1);
    if let Some(preamble) = tool_preamble.map(str::trim).filter(|p| !p.is_empty()) {
        turns.push(format!("System: {preamble}"));
    }

    for message in messages {
        match message.role.as_str() {
            "tool" => turns.push(render_tool_result(message, &tool_names)),
            "assistant" => {
                if let Some(turn) = render_assistant(message) {
                    turns.push(turn);
                }
            }
            role => {
                let text = message.text();
                if !text.is_empty() {
                    turns.push(format!("{}: {text}", role_label(role)));
                }
            }
        }
    }

    FlattenedPrompt {
        prompt: turns.join(TURN_SEPARATOR),
        images,
    }
}

fn role_label(role: &str) -> &str {
    match role {
        "system" | "developer" => "System",
        "user" => "User",
        "assistant" => "Assistant",
        other => other,
    }
}

fn render_assistant(message: &OpenAiMessage) -> Option<String> {
    let mut body = message.text();
    for call in message.tool_calls.iter().flatten() {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str(&render_invocation(&call.function.name, &call.function.arguments));
    }
    (!body.is_empty()).then(|| format!("Assistant: {body}"))
}

fn render_tool_result(message: &OpenAiMessage, tool_names: &HashMap<&str, &str>) -> String {
    let tool_name = message
        .tool_call_id
        .as_deref()
        .and_then(|id| tool_names.get(id).copied())
        .or(message.name.as_deref())
        .unwrap_or("unknown");
    format!(
        "<tool_result tool=\"{tool_name}\">\n{}\n</tool_result>",
        message.text()
    )
}

fn tool_names_by_call_id(messages: &[OpenAiMessage]) -> HashMap<&str, &str> {
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter().flatten())
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect()
}
