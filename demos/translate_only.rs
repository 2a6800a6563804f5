//! Demonstrate using the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use anthropic_ollama_proxy::config::TranslationConfig;
use anthropic_ollama_proxy::translate::anthropic_types::MessagesRequest;
use anthropic_ollama_proxy::translate::ollama_types::{ChatResponse, ToolCall};
use anthropic_ollama_proxy::translate::request::anthropic_to_ollama;
use anthropic_ollama_proxy::translate::response::ResponseAccumulator;
use anthropic_ollama_proxy::translate::streaming::{encode_events, StreamTranslator};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    // An Anthropic Messages API request, as a client would send it
    let anthropic_req: MessagesRequest = serde_json::from_value(json!({
        "model": "claude-sonnet-4-20250514",
        "max_tokens": 1024,
        "stream": true,
        "system": [{"type": "text", "text": "You are a geography expert. Be concise."}],
        "messages": [
            {"role": "user", "content": "What is the capital of France?"},
            {"role": "assistant", "content": [{"type": "text", "text": "The capital of France is Paris."}]},
            {"role": "user", "content": "And Germany?"}
        ],
        "tools": [{
            "name": "lookup_capital",
            "description": "Look up the capital city of a country",
            "input_schema": {
                "type": "object",
                "properties": {"country": {"type": "string", "description": "Country name"}},
                "required": ["country"]
            }
        }]
    }))?;

    let mut config = TranslationConfig::default();
    config
        .models
        .insert("claude-sonnet-4-20250514".to_string(), "llama3.1:8b".to_string());

    let chat_req = anthropic_to_ollama(&anthropic_req, &config)?;

    println!("=== Translated Request (Ollama /api/chat) ===");
    println!("{}", serde_json::to_string_pretty(&chat_req)?);

    // A complete reply assembled from backend chunks
    let mut acc = ResponseAccumulator::new();
    for chunk in [
        ChatResponse::text("The capital of "),
        ChatResponse::text("Germany is Berlin."),
    ] {
        acc.push(&chunk);
    }

    println!();
    println!("=== Assembled Response (Anthropic format) ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&acc.finish("claude-sonnet-4-20250514"))?
    );

    // The same exchange as a stream, this time answered with a tool call
    println!();
    println!("=== Streaming Translation Demo ===");

    let mut translator = StreamTranslator::new("claude-sonnet-4-20250514");
    let chunks = [
        ChatResponse::text(""),
        ChatResponse::tool_calls(vec![ToolCall::new(
            "lookup_capital",
            json!({"country": "Germany"}),
        )]),
    ];

    let mut events = translator.start();
    for chunk in &chunks {
        events.extend(translator.process_chunk(chunk));
    }
    events.extend(translator.finish());

    for event in encode_events(events) {
        print!("{}", event.to_frame());
    }

    println!("Done! The translation layer works without any network calls.");
    Ok(())
}
