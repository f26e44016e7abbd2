//! HTTP surface tests: drive the router directly with `oneshot`.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use aurora_chat::relay::{RATE_LIMITED_NOTICE, UPSTREAM_FAILED_NOTICE};
use aurora_chat::{ChatChunk, ChunkKind, ProviderKind};
use aurora_server::build_router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use common::{fixture, ScriptedProvider};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn post_json(uri: &str, client_id: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-client-id", client_id)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Chunks carried in an SSE body, in arrival order.
fn sse_chunks(body: &str) -> Vec<ChatChunk> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_banner_names_default_provider() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["hi"]);
    let app = build_router(fixture(&[gemini], Duration::ZERO).state);

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["provider"], "gemini");
    assert_eq!(json["model"], "mock-model");
}

#[tokio::test]
async fn test_health_shape() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["hi"]);
    let app = build_router(fixture(&[gemini], Duration::ZERO).state);

    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["defaultProvider"], "gemini");
    assert_eq!(json["providers"][0]["name"], "gemini");
    assert_eq!(json["providers"][0]["configured"], true);
    assert_eq!(json["quotes"]["stale"], true);
    assert_eq!(json["connections"], 0);
    assert_eq!(json["inFlight"], 0);
}

#[tokio::test]
async fn test_sse_stream_orders_chunks_and_closes() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["Hello", " **world**"]);
    let app = build_router(fixture(&[gemini], Duration::ZERO).state);

    let (status, body) = send(
        &app,
        post_json("/api/chat/stream", "sse-1", serde_json::json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: chunk"));

    let chunks = sse_chunks(&body);
    assert!(!chunks.is_empty());
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.sequence, i as u64);
        assert_eq!(chunk.is_final, i == chunks.len() - 1);
        assert_eq!(chunk.request_id, chunks[0].request_id);
    }
    let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text, "Hello world");
}

#[tokio::test]
async fn test_sse_fails_over_to_fallback() {
    let gemini = ScriptedProvider::failing(ProviderKind::Gemini);
    let openai = ScriptedProvider::replying(ProviderKind::OpenAI, &["backup"]);
    let app = build_router(fixture(&[gemini.clone(), openai.clone()], Duration::ZERO).state);

    let (_, body) = send(
        &app,
        post_json("/api/chat/stream", "sse-2", serde_json::json!({"text": "hi"})),
    )
    .await;
    let text: String = sse_chunks(&body).iter().map(|c| c.text.as_str()).collect();
    assert_eq!(text, "backup");
    assert_eq!(gemini.calls(), 1);
    assert_eq!(openai.calls(), 1);
}

#[tokio::test]
async fn test_sse_rate_limited_gets_single_chunk() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["hi"]);
    let app = build_router(fixture(&[gemini.clone()], Duration::from_secs(60)).state);
    let body = serde_json::json!({"text": "hi"});

    send(&app, post_json("/api/chat/stream", "busy", body.clone())).await;
    let (status, second) = send(&app, post_json("/api/chat/stream", "busy", body)).await;
    assert_eq!(status, StatusCode::OK);

    let chunks = sse_chunks(&second);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].kind, ChunkKind::RateLimited);
    assert_eq!(chunks[0].text, RATE_LIMITED_NOTICE);
    assert!(chunks[0].is_final);
    assert_eq!(gemini.calls(), 1);
}

#[tokio::test]
async fn test_one_shot_reply_and_429() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["One ", "shot"]);
    let app = build_router(fixture(&[gemini], Duration::from_secs(60)).state);
    let body = serde_json::json!({"message": "hi"});

    let (status, first) = send(&app, post_json("/api/chat", "one-shot", body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(json["reply"], "One shot");
    assert_eq!(json["kind"], "text");
    assert_eq!(json["provider"], "gemini");
    assert!(json["requestId"].is_string());

    let (status, second) = send(&app, post_json("/api/chat", "one-shot", body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let json: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(json["kind"], "rate_limited");

    // Other clients are unaffected.
    let (status, _) = send(&app, post_json("/api/chat", "someone-else", body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_one_shot_exhausted_is_user_safe() {
    let gemini = ScriptedProvider::failing(ProviderKind::Gemini);
    let openai = ScriptedProvider::failing(ProviderKind::OpenAI);
    let app = build_router(fixture(&[gemini, openai], Duration::ZERO).state);

    let (status, body) = send(
        &app,
        post_json("/api/chat", "c", serde_json::json!({"text": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["reply"], UPSTREAM_FAILED_NOTICE);
    assert_eq!(json["kind"], "error");
    assert!(json.get("provider").is_none());
}

#[tokio::test]
async fn test_quotes_read_and_fresh() {
    let f = fixture(&[], Duration::ZERO);
    let app = build_router(f.state.clone());

    let (_, body) = send(&app, get("/api/quotes")).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["records"].as_array().unwrap().len(), 0);
    assert_eq!(json["stale"], true);
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 0);

    let (_, body) = send(&app, get("/api/quotes?fresh=true")).await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["records"][0]["symbol"], "BTC");
    assert_eq!(json["records"][0]["price"], 68000.0);
    assert_eq!(json["stale"], false);
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_price_question_skips_providers() {
    let gemini = ScriptedProvider::replying(ProviderKind::Gemini, &["model"]);
    let f = fixture(&[gemini.clone()], Duration::ZERO);
    f.state.quotes.refresh().await.unwrap();
    let app = build_router(f.state);

    let (_, body) = send(
        &app,
        post_json("/api/chat", "c", serde_json::json!({"text": "btc"})),
    )
    .await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(json["reply"].as_str().unwrap().contains("$68,000.00"));
    assert_eq!(gemini.calls(), 0);
    assert_eq!(f.fetcher.calls.load(Ordering::SeqCst), 1);
}
