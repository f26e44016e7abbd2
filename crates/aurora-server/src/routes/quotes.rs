//! Quote snapshot route.

use std::sync::Arc;

use aurora_market::QuoteSnapshot;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/quotes", get(get_quotes))
}

#[derive(Debug, Default, Deserialize)]
struct QuotesQuery {
    #[serde(default)]
    fresh: bool,
}

/// GET /api/quotes: latest snapshot; `?fresh=true` refreshes first,
/// bounded by the on-demand timeout.
async fn get_quotes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuotesQuery>,
) -> Json<QuoteSnapshot> {
    let snapshot = if query.fresh {
        state
            .quotes
            .read_or_refresh(state.config.quotes.on_demand_timeout)
            .await
    } else {
        state.quotes.read()
    };
    Json(snapshot)
}
