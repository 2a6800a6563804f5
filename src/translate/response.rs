use super::anthropic_types::{MessagesResponse, ResponseContentBlock, Usage};
use super::new_id;
use super::ollama_types::{ChatResponse, ToolCall};
use super::tools::tool_calls_to_content;

/// Every completed reply ends its turn; length and tool stops are not detected.
pub const STOP_REASON: &str = "end_turn";

/// Usage reported on non-streaming replies. The backend's own token counts are
/// not consulted, so these are placeholders rather than measurements.
pub const ESTIMATED_INPUT_TOKENS: u64 = 100;
pub const ESTIMATED_OUTPUT_TOKENS: u64 = 100;

/// Collects a complete backend reply and turns it into one Anthropic message.
#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    text: String,
    tool_calls: Vec<ToolCall>,
    chunks: usize,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &ChatResponse) {
        self.chunks += 1;
        self.text.push_str(&chunk.message.content);
        self.tool_calls.extend(chunk.message.tool_calls.iter().cloned());
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// Build the response. `model` is the model the client asked for.
    ///
    /// Reported tool calls take precedence over text: when any were seen the
    /// accumulated text is discarded.
    pub fn finish(self, model: &str) -> MessagesResponse {
        let content = if !self.tool_calls.is_empty() {
            tool_calls_to_content(&self.tool_calls)
        } else if !self.text.is_empty() {
            vec![ResponseContentBlock::Text { text: self.text }]
        } else {
            Vec::new()
        };

        MessagesResponse {
            id: new_id("msg_"),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: model.to_string(),
            stop_reason: Some(STOP_REASON.to_string()),
            stop_sequence: None,
            usage: Usage {
                input_tokens: ESTIMATED_INPUT_TOKENS,
                output_tokens: ESTIMATED_OUTPUT_TOKENS,
                cache_creation_input_tokens: None,
                cache_read_input_tokens: None,
            },
        }
    }
}
