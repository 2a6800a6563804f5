//! The chat backend the proxy forwards to.
//!
//! [`ChatBackend`] is the seam between the HTTP layer and the inference
//! server; [`OllamaClient`] speaks Ollama's `/api/chat`. Replies arrive as a
//! pull-based chunk stream so that a slow client throttles the backend, and
//! dropping the stream (e.g. when the client disconnects) closes the
//! backend connection.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde_json::Value;

use crate::config::BackendConfig;
use crate::error::{ProxyError, Result};
use crate::translate::ollama_types::{ChatErrorResponse, ChatRequest, ChatResponse};

/// Backend reply, one item per chunk. An `Err` item ends the reply.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatResponse>> + Send>>;

/// Abstraction over the chat backend.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`. `chat` is called exactly once per inbound request.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChunkStream>;
}

/// Client for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OllamaClient {
    /// # Errors
    /// Returns `ProxyError::Http` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self::with_client(client, &config.endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = self.chat_url();
        tracing::debug!(%url, model = %request.model, stream = request.stream, "Calling backend");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProxyError::backend(format!("Request failed: {e}")))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(status, error = %e, "Failed to read backend error body");
                    String::new()
                }
            };
            let message = serde_json::from_str::<ChatErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("Backend returned status {status}: {}", truncate(&body, 300)));
            return Err(ProxyError::backend(message));
        }

        Ok(Box::pin(ndjson_chunks(response.bytes_stream())))
    }
}

/// Split a newline-delimited JSON byte stream into chat chunks.
fn ndjson_chunks(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<ChatResponse>> + Send + 'static {
    async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        let mut failed = false;

        tokio::pin!(byte_stream);

        'read: while let Some(next) = byte_stream.next().await {
            let bytes = match next {
                Ok(b) => b,
                Err(e) => {
                    yield Err(ProxyError::backend(format!("Backend stream interrupted: {e}")));
                    failed = true;
                    break 'read;
                }
            };

            buffer.extend_from_slice(&bytes);

            while let Some(newline_pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
                match parse_line(&line) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        failed = true;
                        break 'read;
                    }
                }
            }
        }

        // A reply that does not end with a newline still carries a final chunk.
        if !failed {
            match parse_line(&buffer) {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    }
}

/// Parse one NDJSON line. Blank lines yield `None`; an `{"error": ...}` line
/// or a line that is not a chat chunk is a backend failure.
fn parse_line(line: &[u8]) -> Result<Option<ChatResponse>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text).map_err(|e| {
        tracing::debug!(error = %e, line = truncate(text, 300), "Malformed backend line");
        ProxyError::backend(format!("Malformed backend line: {e}"))
    })?;

    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return Err(ProxyError::backend(message));
    }

    serde_json::from_value::<ChatResponse>(value)
        .map(Some)
        .map_err(|e| ProxyError::backend(format!("Malformed backend line: {e}")))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
