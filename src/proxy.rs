use crate::backend::ChatBackend;
use crate::config::TranslationConfig;
use crate::error::Result;
use crate::logging::{LogLevel, SharedLogger};
use crate::translate::anthropic_types::{MessagesRequest, MessagesResponse};
use crate::translate::new_id;
use crate::translate::ollama_types::ChatRequest;
use crate::translate::request::anthropic_to_ollama;
use crate::translate::response::ResponseAccumulator;
use crate::translate::streaming::{encode_events, SseEvent, StreamTranslator};

use futures::stream::Stream;
use futures::StreamExt;
use serde_json::json;
use std::pin::Pin;
use std::sync::Arc;

/// Outcome of proxying a streaming request: the encoded Anthropic events.
pub type SseStream = Pin<Box<dyn Stream<Item = SseEvent> + Send>>;

/// Forward a non-streaming request and assemble the complete reply.
///
/// # Errors
/// `ProxyError::Validation` if the request cannot be translated (the backend is
/// not called), or the backend error that ended the reply.
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    config: &TranslationConfig,
    backend: &dyn ChatBackend,
    logger: &SharedLogger,
) -> Result<MessagesResponse> {
    let chat_req = anthropic_to_ollama(req, config)?;
    let wire_model = req.model_name().unwrap_or_default();
    let request_id = new_id("req_");

    log_forwarding(logger, &request_id, wire_model, &chat_req);

    let mut acc = ResponseAccumulator::new();
    let collected: Result<()> = async {
        let mut chunks = backend.chat(&chat_req).await?;
        while let Some(item) = chunks.next().await {
            acc.push(&item?);
        }
        Ok(())
    }
    .await;

    if let Err(e) = collected {
        tracing::warn!(%request_id, error = %e, "Backend call failed");
        logger.request(
            LogLevel::Error,
            &request_id,
            "Backend call failed",
            json!({ "error": e.to_string(), "chunks": acc.chunk_count() }),
        );
        return Err(e);
    }

    let chunks = acc.chunk_count();
    let response = acc.finish(wire_model);

    tracing::info!(%request_id, chunks, blocks = response.content.len(), "Completed");
    logger.request(
        LogLevel::Info,
        &request_id,
        "Completed",
        json!({ "chunks": chunks, "content_blocks": response.content.len() }),
    );

    Ok(response)
}

/// Forward a streaming request, returning the Anthropic SSE events.
///
/// Translation happens before anything is streamed so that a bad request is
/// still answered with a plain HTTP error. The backend is only contacted once
/// the returned stream is first polled.
///
/// # Errors
/// `ProxyError::Validation` if the request cannot be translated.
pub fn proxy_streaming(
    req: &MessagesRequest,
    config: &TranslationConfig,
    backend: Arc<dyn ChatBackend>,
    logger: SharedLogger,
) -> Result<SseStream> {
    let chat_req = anthropic_to_ollama(req, config)?;
    let wire_model = req.model_name().unwrap_or_default().to_string();
    let request_id = new_id("req_");

    log_forwarding(&logger, &request_id, &wire_model, &chat_req);

    Ok(Box::pin(translate_stream(
        backend, chat_req, wire_model, request_id, logger,
    )))
}

/// Drive the backend chunk stream through a [`StreamTranslator`].
fn translate_stream(
    backend: Arc<dyn ChatBackend>,
    chat_req: ChatRequest,
    model: String,
    request_id: String,
    logger: SharedLogger,
) -> impl Stream<Item = SseEvent> + Send + 'static {
    async_stream::stream! {
        let mut translator = StreamTranslator::new(&model);
        let mut failure: Option<String> = None;

        for event in encode_events(translator.start()) {
            yield event;
        }

        match backend.chat(&chat_req).await {
            Ok(mut chunks) => {
                while let Some(item) = chunks.next().await {
                    match item {
                        Ok(chunk) => {
                            for event in encode_events(translator.process_chunk(&chunk)) {
                                yield event;
                            }
                        }
                        Err(e) => {
                            failure = Some(e.to_string());
                            break;
                        }
                    }
                }
            }
            Err(e) => failure = Some(e.to_string()),
        }

        if let Some(message) = &failure {
            tracing::warn!(%request_id, error = %message, "Backend stream failed");
            for event in encode_events(translator.fail(message)) {
                yield event;
            }
        }

        for event in encode_events(translator.finish()) {
            yield event;
        }

        let level = if failure.is_some() { LogLevel::Error } else { LogLevel::Info };
        tracing::info!(
            %request_id,
            message_id = translator.message_id(),
            output_tokens = translator.output_tokens(),
            "Stream completed"
        );
        logger.request(
            level,
            &request_id,
            "Stream completed",
            json!({
                "message_id": translator.message_id(),
                "output_tokens": translator.output_tokens(),
                "error": failure,
            }),
        );
    }
}

fn log_forwarding(logger: &SharedLogger, request_id: &str, wire_model: &str, chat_req: &ChatRequest) {
    tracing::info!(
        %request_id,
        model = wire_model,
        backend_model = %chat_req.model,
        stream = chat_req.stream,
        messages = chat_req.messages.len(),
        "Forwarding request"
    );
    logger.request(
        LogLevel::Info,
        request_id,
        "Forwarding request",
        json!({
            "model": wire_model,
            "backend_model": chat_req.model,
            "stream": chat_req.stream,
            "messages": chat_req.messages.len(),
            "tools": chat_req.tools.as_ref().map_or(0, Vec::len),
        }),
    );
}
