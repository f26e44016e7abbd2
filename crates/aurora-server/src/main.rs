//! Aurora: realtime chat relay server.

use std::net::SocketAddr;
use std::sync::Arc;

use aurora_chat::{ProviderRegistry, ProviderSettings};
use aurora_market::{HttpQuoteFetcher, QuoteCache};
use aurora_server::{build_router, ticker, AppState};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = aurora_core::AuroraConfig::from_env()?;
    let port = config.port;

    let provider_settings = ProviderSettings::load(&config.provider_config_path);
    let registry = ProviderRegistry::from_settings(&provider_settings, config.relay.provider_timeout);

    let fetcher = Arc::new(HttpQuoteFetcher::from_settings(&config.quotes));
    let quotes = Arc::new(QuoteCache::from_settings(fetcher, &config.quotes));

    info!(
        "Default provider {} (fallback: {:?})",
        config.relay.default_provider, config.relay.fallback_provider
    );

    let state = Arc::new(AppState::new(config, registry, quotes));

    // Background workers run until shutdown
    let (stop_tx, stop_rx) = watch::channel(false);
    let quote_worker = ticker::start_quote_worker(state.clone(), stop_rx.clone());
    let eviction_worker =
        ticker::start_eviction_worker(state.clone(), stop_rx, ticker::EVICTION_INTERVAL);

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Aurora server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down background workers");
    let _ = stop_tx.send(true);
    let _ = tokio::join!(quote_worker, eviction_worker);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
