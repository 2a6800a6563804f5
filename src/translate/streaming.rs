//! State machine for translating Ollama chat chunks into Anthropic SSE events.
//!
//! The [`StreamTranslator`] consumes backend chunks one at a time and emits the
//! Anthropic event sequence:
//!
//! ```text
//! message_start
//! content_block_start   (index 0, text or tool_use)
//! ping
//! content_block_delta*  (at most one error event among them)
//! content_block_stop
//! message_delta
//! message_stop
//! ```
//!
//! Exactly one content block is ever opened. Its kind depends on what the
//! backend says first, so chunks are held in a small lookahead buffer until a
//! chunk carrying text or a tool call arrives; the buffered chunks are then
//! replayed through the same delta logic as everything that follows.

use serde::Serialize;

use super::anthropic_types::{
    Delta, DeltaUsage, ErrorBody, MessageDeltaBody, MessagesResponse, ResponseContentBlock,
    StreamEvent, ToolUseDelta, Usage,
};
use super::new_id;
use super::ollama_types::ChatResponse;
use super::response::STOP_REASON;
use super::tools::decode_arguments;

/// Chunks buffered while deciding the block kind before settling on text.
pub const LOOKAHEAD_LIMIT: usize = 8;

const BLOCK_INDEX: usize = 0;
const PLACEHOLDER_INPUT_TOKENS: u64 = 15;
const PLACEHOLDER_OUTPUT_TOKENS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse,
}

#[derive(Debug)]
enum State {
    Idle,
    MessageStarted { lookahead: Vec<ChatResponse> },
    BlockOpen(BlockKind),
    BlockClosed,
    Finished,
}

/// Translates one backend chunk stream into Anthropic stream events.
///
/// Usage:
///   let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
///   send(translator.start());
///   for chunk in backend_chunks {
///       send(translator.process_chunk(&chunk));
///   }
///   // on backend failure: send(translator.fail(&err.to_string()));
///   send(translator.finish());
#[derive(Debug)]
pub struct StreamTranslator {
    model: String,
    msg_id: String,
    state: State,
    output_tokens: u64,
    failed: bool,
}

impl StreamTranslator {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            msg_id: new_id("msg_"),
            state: State::Idle,
            output_tokens: 0,
            failed: false,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.msg_id
    }

    /// Estimated output tokens: one per chunk received.
    pub fn output_tokens(&self) -> u64 {
        self.output_tokens
    }

    /// Kind of the currently open content block.
    pub fn block_kind(&self) -> Option<BlockKind> {
        match self.state {
            State::BlockOpen(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Emit `message_start`. Calling it again is a no-op.
    pub fn start(&mut self) -> Vec<StreamEvent> {
        if !matches!(self.state, State::Idle) {
            return Vec::new();
        }
        self.state = State::MessageStarted {
            lookahead: Vec::new(),
        };
        vec![self.make_message_start()]
    }

    /// Process a single backend chunk, returning zero or more events.
    pub fn process_chunk(&mut self, chunk: &ChatResponse) -> Vec<StreamEvent> {
        if self.failed {
            return Vec::new();
        }

        let mut events = self.start();

        match &mut self.state {
            State::MessageStarted { lookahead } => {
                self.output_tokens += 1;
                lookahead.push(chunk.clone());

                let decided = if chunk.has_tool_calls() {
                    Some(BlockKind::ToolUse)
                } else if chunk.has_text() {
                    Some(BlockKind::Text)
                } else if lookahead.len() >= LOOKAHEAD_LIMIT {
                    Some(BlockKind::Text)
                } else {
                    None
                };

                if let Some(kind) = decided {
                    events.append(&mut self.open_block(kind));
                }
            }
            State::BlockOpen(_) => {
                self.output_tokens += 1;
                events.append(&mut chunk_deltas(chunk));
            }
            State::Idle | State::BlockClosed | State::Finished => {}
        }

        events
    }

    /// Report a backend failure: one `error` event, after which further chunks
    /// are ignored. The block is opened first if the backend failed before
    /// saying anything, so the error always sits inside the block.
    pub fn fail(&mut self, message: &str) -> Vec<StreamEvent> {
        if self.failed || matches!(self.state, State::BlockClosed | State::Finished) {
            return Vec::new();
        }
        self.failed = true;

        let mut events = self.start();
        if matches!(self.state, State::MessageStarted { .. }) {
            events.append(&mut self.open_block(BlockKind::Text));
        }

        events.push(StreamEvent::Error {
            error: ErrorBody::new("server_error", message),
        });
        events
    }

    /// Close the block and the message. Safe to call more than once.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.is_finished() {
            return Vec::new();
        }

        let mut events = self.start();
        if matches!(self.state, State::MessageStarted { .. }) {
            events.append(&mut self.open_block(BlockKind::Text));
        }

        if matches!(self.state, State::BlockOpen(_)) {
            events.push(StreamEvent::ContentBlockStop { index: BLOCK_INDEX });
            self.state = State::BlockClosed;
        }

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(STOP_REASON.to_string()),
                stop_sequence: None,
            },
            usage: DeltaUsage {
                output_tokens: self.output_tokens,
            },
        });
        events.push(StreamEvent::MessageStop);
        self.state = State::Finished;

        events
    }

    /// MessageStarted -> BlockOpen: block start, ping, then the buffered chunks.
    fn open_block(&mut self, kind: BlockKind) -> Vec<StreamEvent> {
        let lookahead = match std::mem::replace(&mut self.state, State::BlockOpen(kind)) {
            State::MessageStarted { lookahead } => lookahead,
            other => {
                self.state = other;
                return Vec::new();
            }
        };

        let content_block = match kind {
            BlockKind::Text => ResponseContentBlock::Text {
                text: String::new(),
            },
            BlockKind::ToolUse => {
                let first_call = lookahead
                    .iter()
                    .flat_map(|c| c.message.tool_calls.iter())
                    .next();
                ResponseContentBlock::ToolUse {
                    id: new_id("toolu_"),
                    name: first_call
                        .map(|c| c.function.name.clone())
                        .unwrap_or_default(),
                    input: first_call
                        .map(|c| decode_arguments(&c.function.arguments))
                        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
                }
            }
        };

        let mut events = vec![
            StreamEvent::ContentBlockStart {
                index: BLOCK_INDEX,
                content_block,
            },
            StreamEvent::Ping,
        ];
        for chunk in &lookahead {
            events.append(&mut chunk_deltas(chunk));
        }
        events
    }

    fn make_message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessagesResponse {
                id: self.msg_id.clone(),
                response_type: "message".to_string(),
                role: "assistant".to_string(),
                content: Vec::new(),
                model: self.model.clone(),
                stop_reason: None,
                stop_sequence: None,
                usage: Usage {
                    input_tokens: PLACEHOLDER_INPUT_TOKENS,
                    output_tokens: PLACEHOLDER_OUTPUT_TOKENS,
                    cache_creation_input_tokens: Some(0),
                    cache_read_input_tokens: Some(0),
                },
            },
        }
    }
}

/// Deltas for one chunk. Tool-call fragments win over text; fragments without
/// a function name are skipped.
fn chunk_deltas(chunk: &ChatResponse) -> Vec<StreamEvent> {
    if chunk.has_tool_calls() {
        return chunk
            .message
            .tool_calls
            .iter()
            .filter(|call| !call.function.name.is_empty())
            .map(|call| StreamEvent::ContentBlockDelta {
                index: BLOCK_INDEX,
                delta: Delta::ToolUseDelta {
                    tool_use: ToolUseDelta {
                        name: call.function.name.clone(),
                        input: call.function.arguments.clone(),
                    },
                },
            })
            .collect();
    }

    if chunk.has_text() {
        return vec![StreamEvent::ContentBlockDelta {
            index: BLOCK_INDEX,
            delta: Delta::TextDelta {
                text: chunk.message.content.clone(),
            },
        }];
    }

    Vec::new()
}

// ---------------------------------------------------------------------------
// SSE encoding
// ---------------------------------------------------------------------------

/// A serialized event ready to be written as `event: <event>\ndata: <data>\n\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

impl SseEvent {
    /// Serialize a stream event. An event that fails to serialize is dropped
    /// (logged at warn) instead of ending the stream.
    pub fn encode(event: &StreamEvent) -> Option<Self> {
        Self::from_payload(event.event_name(), event)
    }

    pub fn from_payload<T: Serialize>(event: &str, payload: &T) -> Option<Self> {
        match serde_json::to_string(payload) {
            Ok(data) => Some(Self {
                event: event.to_string(),
                data,
            }),
            Err(e) => {
                tracing::warn!(event, error = %e, "Dropping SSE event that failed to serialize");
                None
            }
        }
    }

    pub fn to_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Encode a batch of events, skipping any that fail to serialize.
pub fn encode_events(events: Vec<StreamEvent>) -> impl Iterator<Item = SseEvent> {
    events.into_iter().filter_map(|e| SseEvent::encode(&e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::ollama_types::ToolCall;
    use serde_json::json;

    fn run(chunks: &[ChatResponse]) -> Vec<StreamEvent> {
        let mut translator = StreamTranslator::new("test-model");
        let mut events = translator.start();
        for chunk in chunks {
            events.extend(translator.process_chunk(chunk));
        }
        events.extend(translator.finish());
        events
    }

    fn names(events: &[StreamEvent]) -> Vec<&'static str> {
        events.iter().map(StreamEvent::event_name).collect()
    }

    fn text_of(event: &StreamEvent) -> Option<&str> {
        match event {
            StreamEvent::ContentBlockDelta {
                delta: Delta::TextDelta { text },
                ..
            } => Some(text),
            _ => None,
        }
    }

    #[test]
    fn test_simple_text_stream() {
        let events = run(&[ChatResponse::text("He"), ChatResponse::text("llo")]);

        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert_eq!(text_of(&events[3]), Some("He"));
        assert_eq!(text_of(&events[4]), Some("llo"));
        assert!(matches!(
            &events[1],
            StreamEvent::ContentBlockStart {
                index: 0,
                content_block: ResponseContentBlock::Text { .. }
            }
        ));
    }

    #[test]
    fn test_message_start_skeleton() {
        let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
        let events = translator.start();
        let StreamEvent::MessageStart { message } = &events[0] else {
            panic!("Expected message_start");
        };
        assert_eq!(message.id, translator.message_id());
        assert!(message.id.starts_with("msg_"));
        assert_eq!(message.model, "claude-sonnet-4-20250514");
        assert!(message.content.is_empty());
        assert_eq!(message.stop_reason, None);

        assert!(translator.start().is_empty());
    }

    #[test]
    fn test_empty_leading_chunks_are_buffered() {
        let mut translator = StreamTranslator::new("m");
        translator.start();

        assert!(translator.process_chunk(&ChatResponse::text("")).is_empty());
        assert_eq!(translator.block_kind(), None);

        let events = translator.process_chunk(&ChatResponse::text("hi"));
        assert_eq!(
            names(&events),
            vec!["content_block_start", "ping", "content_block_delta"]
        );
        assert_eq!(translator.block_kind(), Some(BlockKind::Text));
        assert_eq!(translator.output_tokens(), 2);
    }

    #[test]
    fn test_lookahead_limit_defaults_to_text() {
        let mut translator = StreamTranslator::new("m");
        translator.start();
        let mut events = Vec::new();
        for _ in 0..LOOKAHEAD_LIMIT {
            events.extend(translator.process_chunk(&ChatResponse::default()));
        }
        assert_eq!(names(&events), vec!["content_block_start", "ping"]);
        assert_eq!(translator.block_kind(), Some(BlockKind::Text));
    }

    #[test]
    fn test_tool_call_opens_tool_use_block() {
        let events = run(&[ChatResponse::tool_calls(vec![
            ToolCall::new("get_weather", json!({"city": "Paris"})),
            ToolCall::new("", json!({})),
        ])]);

        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        match &events[1] {
            StreamEvent::ContentBlockStart {
                content_block: ResponseContentBlock::ToolUse { id, name, input },
                ..
            } => {
                assert!(id.starts_with("toolu_"));
                assert_eq!(name, "get_weather");
                assert_eq!(input, &json!({"city": "Paris"}));
            }
            other => panic!("Expected tool_use block start, got {other:?}"),
        }

        match &events[3] {
            StreamEvent::ContentBlockDelta {
                delta: Delta::ToolUseDelta { tool_use },
                ..
            } => {
                assert_eq!(tool_use.name, "get_weather");
                assert_eq!(tool_use.input["city"], "Paris");
            }
            other => panic!("Expected tool_use_delta, got {other:?}"),
        }
    }

    #[test]
    fn test_raw_string_arguments_are_decoded_for_block_start() {
        let events = run(&[ChatResponse::tool_calls(vec![ToolCall::new(
            "search",
            json!("{\"q\":\"rust\"}"),
        )])]);
        let StreamEvent::ContentBlockStart {
            content_block: ResponseContentBlock::ToolUse { input, .. },
            ..
        } = &events[1]
        else {
            panic!("Expected tool_use block start");
        };
        assert_eq!(input["q"], "rust");
    }

    #[test]
    fn test_text_after_block_open_stays_in_same_block() {
        let events = run(&[
            ChatResponse::text("Checking"),
            ChatResponse::tool_calls(vec![ToolCall::new("ls", json!({}))]),
        ]);
        let starts = names(&events)
            .iter()
            .filter(|n| **n == "content_block_start")
            .count();
        assert_eq!(starts, 1);
        assert!(matches!(
            &events[1],
            StreamEvent::ContentBlockStart {
                content_block: ResponseContentBlock::Text { .. },
                ..
            }
        ));
        assert!(matches!(
            &events[4],
            StreamEvent::ContentBlockDelta {
                delta: Delta::ToolUseDelta { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_failure_mid_stream() {
        let mut translator = StreamTranslator::new("m");
        let mut events = translator.start();
        events.extend(translator.process_chunk(&ChatResponse::text("partial")));
        events.extend(translator.fail("connection reset"));
        events.extend(translator.process_chunk(&ChatResponse::text("ignored")));
        events.extend(translator.fail("second failure"));
        events.extend(translator.finish());

        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_delta",
                "error",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        match &events[4] {
            StreamEvent::Error { error } => {
                assert_eq!(error.error_type, "server_error");
                assert_eq!(error.message, "connection reset");
            }
            other => panic!("Expected error event, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_before_any_chunk_still_brackets_error() {
        let mut translator = StreamTranslator::new("m");
        let mut events = translator.fail("connection refused");
        events.extend(translator.finish());
        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "error",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
    }

    #[test]
    fn test_finish_without_chunks() {
        let mut translator = StreamTranslator::new("m");
        let events = translator.finish();
        assert_eq!(
            names(&events),
            vec![
                "message_start",
                "content_block_start",
                "ping",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        assert!(translator.is_finished());
        assert!(translator.finish().is_empty());
        assert!(translator.process_chunk(&ChatResponse::text("late")).is_empty());
    }

    #[test]
    fn test_message_delta_counts_every_chunk() {
        let events = run(&[
            ChatResponse::text("a"),
            ChatResponse::default(),
            ChatResponse::text("b"),
        ]);
        let usage = events.iter().find_map(|e| match e {
            StreamEvent::MessageDelta { delta, usage } => Some((delta, usage)),
            _ => None,
        });
        let (delta, usage) = usage.unwrap();
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(delta.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(delta.stop_sequence, None);
    }

    #[test]
    fn test_buffered_chunks_replay_in_order() {
        let events = run(&[
            ChatResponse::default(),
            ChatResponse::text("one"),
            ChatResponse::text("two"),
        ]);
        let texts: Vec<&str> = events.iter().filter_map(text_of).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_sse_frame_format() {
        let event = SseEvent::encode(&StreamEvent::Ping).unwrap();
        assert_eq!(event.to_frame(), "event: ping\ndata: {\"type\":\"ping\"}\n\n");

        let stop = SseEvent::encode(&StreamEvent::ContentBlockStop { index: 0 }).unwrap();
        assert_eq!(stop.event, "content_block_stop");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&stop.data).unwrap(),
            json!({"type": "content_block_stop", "index": 0})
        );
    }

    #[test]
    fn test_unserializable_event_is_dropped() {
        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("refusing to serialize"))
            }
        }

        assert_eq!(SseEvent::from_payload("ping", &Unserializable), None);
    }

    #[test]
    fn test_encode_events_preserves_order() {
        let mut translator = StreamTranslator::new("m");
        let encoded: Vec<SseEvent> = encode_events(translator.finish()).collect();
        let names: Vec<&str> = encoded.iter().map(|e| e.event.as_str()).collect();
        assert_eq!(names.first(), Some(&"message_start"));
        assert_eq!(names.last(), Some(&"message_stop"));
    }
}
