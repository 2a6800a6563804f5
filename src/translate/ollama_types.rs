//! Type definitions for the [Ollama chat API](https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-chat-completion).
//!
//! These types represent both the request we send to `/api/chat` and the
//! newline-delimited JSON chunks the backend sends back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Request types (what we send TO the backend)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub num_predict: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String, // always "function"
    pub function: ToolFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub parameters_type: String, // always "object"
    pub required: Vec<String>,
    pub properties: BTreeMap<String, ToolProperty>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolProperty {
    #[serde(rename = "type")]
    pub property_type: String,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFunction {
    #[serde(default)]
    pub name: String,
    /// Usually a JSON object; some backends send a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

// ---------------------------------------------------------------------------
// Response types (what we receive FROM the backend)
// ---------------------------------------------------------------------------

/// One line of a `/api/chat` reply. Non-streaming replies are a single chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub message: ChunkMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    /// A chunk carrying only a text delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: ChunkMessage {
                role: "assistant".to_string(),
                content: content.into(),
                tool_calls: Vec::new(),
            },
            ..Self::default()
        }
    }

    /// A chunk carrying only tool calls.
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            message: ChunkMessage {
                role: "assistant".to_string(),
                content: String::new(),
                tool_calls: calls,
            },
            ..Self::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.message.tool_calls.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.message.content.is_empty()
    }
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            function: ToolCallFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_decodes_with_tool_calls() {
        let chunk: ChatResponse = serde_json::from_value(json!({
            "model": "qwen2.5-coder:14b",
            "created_at": "2024-11-01T10:00:00Z",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "get_weather", "arguments": {"city": "Paris"}}}]
            },
            "done": false
        }))
        .unwrap();

        assert!(chunk.has_tool_calls());
        assert!(!chunk.has_text());
        assert_eq!(chunk.message.tool_calls[0].function.arguments["city"], "Paris");
    }

    #[test]
    fn test_final_chunk_decodes_without_message() {
        let chunk: ChatResponse =
            serde_json::from_value(json!({"model": "m", "done": true, "done_reason": "stop"})).unwrap();
        assert!(chunk.done);
        assert!(!chunk.has_text());
    }

    #[test]
    fn test_request_omits_unset_options() {
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            stream: false,
            tools: None,
            options: ChatOptions {
                num_predict: 256,
                temperature: None,
                num_ctx: None,
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["options"], json!({"num_predict": 256}));
        assert!(value.get("tools").is_none());
    }
}
