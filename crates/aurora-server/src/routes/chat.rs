//! Chat routes: one-shot replies and the SSE adapter.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use aurora_chat::relay::RATE_LIMITED_NOTICE;
use aurora_chat::{ChatChunk, ChatInput, ChunkKind};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::ClientId;
use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Chunks buffered between the relay task and the response body.
const CHUNK_BUFFER: usize = 32;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/stream", post(stream_chat))
}

fn chunk_event(chunk: &ChatChunk) -> Event {
    let data = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
    Event::default().event("chunk").data(data)
}

// ---------------------------------------------------------------
// Non-streaming chat
// ---------------------------------------------------------------

/// POST /api/chat: whole reply in one JSON body.
async fn chat(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Json(input): Json<ChatInput>,
) -> Response {
    let request = input.into_request(&client_id);

    if !state.rate_limiter.allow(&client_id) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "requestId": request.id,
                "reply": RATE_LIMITED_NOTICE,
                "kind": ChunkKind::RateLimited,
            })),
        )
            .into_response();
    }

    match state.engine.complete(request).await {
        Ok(reply) => {
            debug!("One-shot {} ended {}", reply.request_id, reply.state);
            Json(reply).into_response()
        }
        Err(e) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------
// Streaming chat (SSE)
// ---------------------------------------------------------------

/// POST /api/chat/stream: one `chunk` event per chunk until `isFinal`.
///
/// Dropping the response body (client disconnect) closes the channel and
/// cancels the relay.
async fn stream_chat(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    Json(input): Json<ChatInput>,
) -> Response {
    let request = input.into_request(&client_id);

    if !state.rate_limiter.allow(&client_id) {
        let chunk = ChatChunk::terminal(&request.id, RATE_LIMITED_NOTICE, ChunkKind::RateLimited);
        let stream: SseStream = Box::pin(tokio_stream::once(Ok(chunk_event(&chunk))));
        return Sse::new(stream).into_response();
    }

    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
    let engine = state.engine.clone();
    tokio::spawn(async move {
        let request_id = request.id.clone();
        match engine.run(request, tx).await {
            Ok(end) => debug!("SSE request {} ended {}", request_id, end),
            Err(e) => warn!("SSE request {} rejected: {}", request_id, e),
        }
    });

    let stream: SseStream =
        Box::pin(ReceiverStream::new(rx).map(|chunk| Ok::<_, Infallible>(chunk_event(&chunk))));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
