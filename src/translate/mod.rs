//! API translation between the Anthropic Messages format and the Ollama chat format.
//!
//! The core of the proxy: converts requests, responses, streaming events and
//! tool schemas between the two API formats. Nothing in here performs I/O.

pub mod anthropic_types;
pub mod ollama_types;
pub mod request;
pub mod response;
pub mod streaming;
pub mod tools;

/// Fresh identifier with the given prefix, e.g. `msg_` or `toolu_`.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}
