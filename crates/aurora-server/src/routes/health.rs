//! Service banner and health routes.

use std::sync::Arc;

use aurora_core::ProviderKind;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// GET /: which provider answers by default.
pub async fn banner(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let provider = state.engine.default_provider();
    let model = provider
        .and_then(|p| state.engine.registry().get(p))
        .map(|client| client.model().to_string());

    Json(serde_json::json!({
        "ok": true,
        "provider": provider,
        "model": model,
    }))
}

/// GET /api/health: provider availability, quote freshness, connections.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let registry = state.engine.registry();
    let providers: Vec<serde_json::Value> = ProviderKind::all()
        .iter()
        .filter(|kind| registry.contains(**kind))
        .map(|kind| {
            serde_json::json!({
                "name": kind,
                "configured": registry.is_configured(*kind),
            })
        })
        .collect();

    let snapshot = state.quotes.read();

    Json(serde_json::json!({
        "status": "ok",
        "defaultProvider": state.config.relay.default_provider,
        "fallbackProvider": state.config.relay.fallback_provider,
        "providers": providers,
        "quotes": {
            "symbols": state.quotes.symbols(),
            "records": snapshot.records.len(),
            "fetchedAt": snapshot.fetched_at,
            "stale": snapshot.stale,
        },
        "connections": state.connections(),
        "inFlight": state.engine.in_flight(),
    }))
}
