//! Translate Anthropic Messages API requests into Ollama chat requests.
//!
//! Each wire message becomes exactly one backend message whose content is the
//! message's text flattened into a single string. Tool uses from earlier turns
//! ride along as backend tool calls; tool results stand in for the text.

use serde_json::Value;

use super::anthropic_types::{ContentBlock, Message, MessagesRequest};
use super::ollama_types::{ChatMessage, ChatOptions, ChatRequest, ToolCall};
use super::tools::convert_tools;
use crate::config::TranslationConfig;
use crate::error::{ProxyError, Result};

pub const MODEL_REQUIRED: &str = "Model is required";

/// Translate an Anthropic Messages API request into an Ollama chat request.
///
/// # Errors
/// Returns `ProxyError::Validation` when the request names no model.
pub fn anthropic_to_ollama(req: &MessagesRequest, config: &TranslationConfig) -> Result<ChatRequest> {
    let wire_model = req
        .model_name()
        .ok_or_else(|| ProxyError::validation(MODEL_REQUIRED))?;

    let mut messages = Vec::with_capacity(req.messages.len() + 1);

    if let Some(system) = req
        .system
        .as_ref()
        .and_then(|s| s.first_text())
        .filter(|s| !s.is_empty())
    {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
            tool_calls: None,
        });
    }

    messages.extend(
        req.messages
            .iter()
            .filter_map(|msg| translate_message(msg, config.echo_tool_calls)),
    );

    Ok(ChatRequest {
        model: config.backend_model(wire_model).to_string(),
        messages,
        stream: req.is_streaming(),
        tools: convert_tools(req.tools.as_deref()),
        options: ChatOptions {
            num_predict: req.max_tokens.unwrap_or(config.default_max_tokens),
            temperature: req.temperature,
            num_ctx: config.num_ctx,
        },
    })
}

/// Messages without a role are skipped.
fn translate_message(msg: &Message, echo_tool_calls: bool) -> Option<ChatMessage> {
    let role = msg.role.as_deref()?.to_lowercase();

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_result: Option<String> = None;
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in msg.content.blocks() {
        match block {
            ContentBlock::Text { text } => text_parts.push(text),
            ContentBlock::ToolUse { name, input, .. } => {
                if echo_tool_calls && !name.is_empty() {
                    tool_calls.push(ToolCall::new(name.clone(), input.clone()));
                }
            }
            ContentBlock::ToolResult { content, .. } => {
                tool_result = Some(tool_result_text(content.as_ref()));
            }
            ContentBlock::Image { .. } | ContentBlock::Unsupported => {}
        }
    }

    let content = tool_result.unwrap_or_else(|| text_parts.join("\n"));

    Some(ChatMessage {
        role,
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    })
}

fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.as_str()),
                Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("text") => {
                    obj.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}
