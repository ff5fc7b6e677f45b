//! `matchcore-server`: wires configuration, the durable store, the event
//! bus, and the engine together and serves the HTTP/WebSocket adapter.
//!
//! Grounded on `lukewaehner-HFT-Ledger`'s `exchange-service/src/main.rs`
//! (`tracing_subscriber::fmt::init()`, `axum::serve` over a `TcpListener`),
//! with `clap::Parser::parse()` added for configuration the way
//! `cooprefr-bettersys`'s probe binary does.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use matchcore::adapter;
use matchcore::config::{Cli, Config};
use matchcore::engine::Engine;
use matchcore::events::EventBus;
use matchcore::store::DurableStore;
use matchcore::store::InMemoryStore;

#[cfg(feature = "journal")]
use matchcore::store::file_journal::JournalBackedStore;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match Config::resolve(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("matchcore-server: {err}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    let store: Arc<dyn DurableStore> = build_store(&config);
    let events = Arc::new(EventBus::new());
    let engine = match Engine::start(
        config.symbols.clone(),
        store,
        events,
        config.retry_max_attempts,
    ) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            eprintln!("matchcore-server: failed to start engine: {err}");
            return ExitCode::FAILURE;
        }
    };

    let app = adapter::router(engine);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("matchcore-server: failed to bind {}: {err}", config.bind_addr);
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %config.bind_addr, symbols = ?config.symbols, "matchcore-server starting");
    info!("  POST   /symbols/:symbol/orders");
    info!("  DELETE /symbols/:symbol/orders/:order_id?user_id=...");
    info!("  GET    /symbols/:symbol/orderbook?depth=...");
    info!("  GET    /symbols/:symbol/trades?limit=...");
    info!("  WS     /symbols/:symbol/stream");

    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("matchcore-server: server error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "journal")]
fn build_store(config: &Config) -> Arc<dyn DurableStore> {
    match &config.journal_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using journal-backed durable store");
            Arc::new(JournalBackedStore::new(
                dir.clone(),
                config.journal_segment_bytes as usize,
            ))
        }
        None => {
            info!("using process-lifetime in-memory store");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[cfg(not(feature = "journal"))]
fn build_store(_config: &Config) -> Arc<dyn DurableStore> {
    Arc::new(InMemoryStore::new())
}
