//! WebSocket adapter.
//!
//! Each connection gets a writer task fed by a channel, so relay output and
//! ticker pushes never interleave mid-frame. At most one chat request per
//! connection is in flight; closing the socket aborts it.

use std::sync::Arc;

use aurora_chat::relay::{BUSY_NOTICE, RATE_LIMITED_NOTICE};
use aurora_chat::{ChatChunk, ChatInput, ChunkKind, ProviderKind};
use aurora_market::QuoteSnapshot;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Frames buffered for one connection's writer.
const OUTBOUND_BUFFER: usize = 64;
/// Chunks buffered between a relay and the connection.
const CHUNK_BUFFER: usize = 32;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

/// Client to server frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Chat(ChatInput),
    Subscribe,
    Unsubscribe,
    Ping,
}

/// Server to client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Hello {
        #[serde(rename = "clientId")]
        client_id: String,
        provider: Option<ProviderKind>,
    },
    Chunk(ChatChunk),
    Quotes(QuoteSnapshot),
    Error {
        message: String,
    },
    Pong,
}

/// Tagged frames, bare `{"text": ...}` objects and plain text are all
/// accepted as input.
pub fn parse_inbound(raw: &str) -> Result<Inbound, serde_json::Error> {
    if !raw.trim_start().starts_with('{') {
        return Ok(Inbound::Chat(ChatInput {
            text: raw.to_string(),
            provider_hint: None,
        }));
    }
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.get("type").is_some() {
        return serde_json::from_value(value);
    }
    serde_json::from_value(value).map(Inbound::Chat)
}

/// GET /ws: upgrade; `?clientId=` keeps a stable identity across reconnects.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let client_id = query
        .client_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id))
}

/// Per-connection state owned by the read loop.
struct Connection {
    state: Arc<AppState>,
    client_id: String,
    out: mpsc::Sender<Outbound>,
    relay: Option<JoinHandle<()>>,
    ticker: Option<broadcast::Receiver<QuoteSnapshot>>,
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, client_id: String) {
    let _guard = state.track_connection();
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    info!("WebSocket connected: {}", client_id);
    let mut conn = Connection {
        state: state.clone(),
        client_id,
        out: out_tx,
        relay: None,
        ticker: None,
    };

    let _ = conn
        .out
        .send(Outbound::Hello {
            client_id: conn.client_id.clone(),
            provider: state.engine.default_provider(),
        })
        .await;

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => conn.handle_text(&text).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            snapshot = next_snapshot(&mut conn.ticker) => match snapshot {
                Ok(snapshot) => {
                    let _ = conn.out.send(Outbound::Quotes(snapshot)).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Ticker lagged by {} for {}", skipped, conn.client_id);
                }
                Err(broadcast::error::RecvError::Closed) => conn.ticker = None,
            },
        }
    }

    if let Some(relay) = conn.relay.take() {
        relay.abort();
    }
    writer.abort();
    info!("WebSocket closed: {}", conn.client_id);
}

async fn next_snapshot(
    ticker: &mut Option<broadcast::Receiver<QuoteSnapshot>>,
) -> Result<QuoteSnapshot, broadcast::error::RecvError> {
    match ticker {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Connection {
    async fn send(&self, frame: Outbound) {
        let _ = self.out.send(frame).await;
    }

    fn is_busy(&self) -> bool {
        self.relay.as_ref().is_some_and(|relay| !relay.is_finished())
    }

    async fn handle_text(&mut self, raw: &str) {
        let frame = match parse_inbound(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Bad frame from {}: {}", self.client_id, e);
                self.send(Outbound::Error {
                    message: "Unrecognized message.".into(),
                })
                .await;
                return;
            }
        };

        match frame {
            Inbound::Ping => self.send(Outbound::Pong).await,
            Inbound::Subscribe => {
                if self.ticker.is_none() {
                    self.ticker = Some(self.state.ticker.subscribe());
                }
                self.send(Outbound::Quotes(self.state.quotes.read())).await;
            }
            Inbound::Unsubscribe => self.ticker = None,
            Inbound::Chat(input) => self.start_chat(input).await,
        }
    }

    async fn start_chat(&mut self, input: ChatInput) {
        let request = input.into_request(&self.client_id);

        if self.is_busy() {
            self.send(Outbound::Chunk(ChatChunk::terminal(
                &request.id,
                BUSY_NOTICE,
                ChunkKind::Notice,
            )))
            .await;
            return;
        }
        if !self.state.rate_limiter.allow(&self.client_id) {
            self.send(Outbound::Chunk(ChatChunk::terminal(
                &request.id,
                RATE_LIMITED_NOTICE,
                ChunkKind::RateLimited,
            )))
            .await;
            return;
        }

        let engine = self.state.engine.clone();
        let out = self.out.clone();
        self.relay = Some(tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(CHUNK_BUFFER);
            let request_id = request.id.clone();

            let forward = async move {
                while let Some(chunk) = rx.recv().await {
                    if out.send(Outbound::Chunk(chunk)).await.is_err() {
                        break;
                    }
                }
            };
            let (result, ()) = tokio::join!(engine.run(request, tx), forward);

            match result {
                Ok(end) => debug!("WebSocket request {} ended {}", request_id, end),
                Err(e) => warn!("WebSocket request {} rejected: {}", request_id, e),
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inbound_variants() {
        assert!(matches!(
            parse_inbound(r#"{"type":"chat","text":"hi","providerHint":"groq"}"#).unwrap(),
            Inbound::Chat(ChatInput { ref text, .. }) if text == "hi"
        ));
        assert!(matches!(parse_inbound(r#"{"type":"subscribe"}"#).unwrap(), Inbound::Subscribe));
        assert!(matches!(parse_inbound(r#"{"type":"ping"}"#).unwrap(), Inbound::Ping));
        assert!(matches!(
            parse_inbound(r#"{"message":"legacy"}"#).unwrap(),
            Inbound::Chat(ChatInput { ref text, .. }) if text == "legacy"
        ));
        assert!(matches!(
            parse_inbound("btc").unwrap(),
            Inbound::Chat(ChatInput { ref text, .. }) if text == "btc"
        ));
        assert!(parse_inbound("{broken").is_err());
    }

    #[test]
    fn test_outbound_wire_shape() {
        let hello = serde_json::to_value(Outbound::Hello {
            client_id: "c1".into(),
            provider: Some(ProviderKind::Gemini),
        })
        .unwrap();
        assert_eq!(hello["type"], "hello");
        assert_eq!(hello["clientId"], "c1");
        assert_eq!(hello["provider"], "gemini");

        let chunk = serde_json::to_value(Outbound::Chunk(ChatChunk::terminal(
            "r1",
            "done",
            ChunkKind::Text,
        )))
        .unwrap();
        assert_eq!(chunk["type"], "chunk");
        assert_eq!(chunk["requestId"], "r1");
        assert_eq!(chunk["isFinal"], true);
    }
}
