use crate::backend::ChatBackend;
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::logging::SharedLogger;
use crate::proxy;
use crate::translate::anthropic_types::{ErrorResponse, MessagesRequest};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const BACKEND_FAILURE: &str = "Failed to generate response from backend";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub backend: Arc<dyn ChatBackend>,
    pub logger: SharedLogger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            state
                .logger
                .warn("server", format!("Failed to parse request: {}", e));
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {}", e));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    tracing::debug!(
        model = req.model_name().unwrap_or("<none>"),
        stream = req.is_streaming(),
        messages = req.messages.len(),
        "Received messages request"
    );

    if req.is_streaming() {
        handle_streaming(state, &req)
    } else {
        handle_non_streaming(state, &req).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    match proxy::proxy_non_streaming(
        req,
        &state.config.translation,
        state.backend.as_ref(),
        &state.logger,
    )
    .await
    {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => failure_response(&state, e),
    }
}

fn handle_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    let sse_stream = match proxy::proxy_streaming(
        req,
        &state.config.translation,
        Arc::clone(&state.backend),
        state.logger.clone(),
    ) {
        Ok(s) => s,
        Err(e) => return failure_response(&state, e),
    };

    let event_stream = sse_stream.map(|sse_event| -> std::result::Result<Event, Infallible> {
        Ok(Event::default().event(sse_event.event).data(sse_event.data))
    });

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(event_stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

/// Client errors answer 400 with the bare message; anything else is a backend
/// failure and answers 500.
fn failure_response(state: &AppState, err: ProxyError) -> Response {
    if err.is_client_error() {
        let body = serde_json::json!({ "error": err.to_string() });
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    }

    state.logger.error("server", format!("{}: {}", BACKEND_FAILURE, err));
    let body = serde_json::json!({
        "error": BACKEND_FAILURE,
        "details": err.to_string(),
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
