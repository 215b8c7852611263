// =============================================================================
// breakout-engine — main entry point
// =============================================================================
//
// Thin shell: load configuration, wire sinks and persistence, spawn the
// admin/ingest API, and wait for shutdown. All domain logic lives in the
// library crate.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use breakout_engine::admin_api::{self, SharedEngine};
use breakout_engine::config::GlobalConfig;
use breakout_engine::engine::Engine;
use breakout_engine::persistence::SignalStore;
use breakout_engine::signal::emitter::{Emitter, EmitterConfig};
use breakout_engine::signal::sink::{FileSink, HttpSink, Sink, StdoutSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("breakout-engine starting up");

    let global_config = std::env::var("BREAKOUT_CONFIG_PATH")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|body| serde_json::from_str(&body).ok())
        .unwrap_or_else(|| {
            warn!("no BREAKOUT_CONFIG_PATH set or failed to parse, using built-in defaults");
            GlobalConfig::default()
        });

    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if let Ok(url) = std::env::var("BREAKOUT_HTTP_SINK_URL") {
        info!(url, "HTTP signal sink configured");
        sinks.push(Arc::new(HttpSink::new(url, std::time::Duration::from_secs(10))));
    }
    if let Ok(path) = std::env::var("BREAKOUT_FILE_SINK_PATH") {
        info!(path, "file signal sink configured");
        let max_bytes = std::env::var("BREAKOUT_FILE_SINK_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok());
        sinks.push(Arc::new(FileSink::new(path, max_bytes)?));
    }
    if sinks.is_empty() || std::env::var("BREAKOUT_STDOUT_SINK").is_ok() {
        sinks.push(Arc::new(StdoutSink));
    }

    let signal_store = match std::env::var("BREAKOUT_SIGNAL_DB_PATH") {
        Ok(path) => Some(Arc::new(SignalStore::open(path)?)),
        Err(_) => {
            warn!("no BREAKOUT_SIGNAL_DB_PATH set, signal persistence/cross-session dedup disabled");
            None
        }
    };

    let emitter = Arc::new(Emitter::new(sinks, signal_store, EmitterConfig::default()));
    let engine: SharedEngine = Arc::new(RwLock::new(Engine::new(global_config, emitter)));

    let bind_addr = std::env::var("BREAKOUT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let app = admin_api::router(engine.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "admin API listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "admin API server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received");
    server.abort();

    info!("breakout-engine shut down complete");
    Ok(())
}
