//! `cadence-gateway`: thin HTTP observability surface over a running
//! engine. Exposes `/healthz` (process liveness) and `/metrics` (a JSON
//! snapshot from the metric collector, C10) only — the full task,
//! payload, and monitoring-algorithm CRUD surface the original REST API
//! exposed is explicitly out of scope here (see the Non-goals in the
//! specification this crate follows).
//!
//! Runs its own `cadence_engine::Engine` instance, the same way the
//! teacher's `server` binary ran independently of `agent` but against the
//! same `shared` domain types — the gateway is a read/observe surface
//! over engine state, not a remote control plane for it.

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cadence_engine::broker::in_process_channel;
use cadence_engine::metrics::MetricSnapshot;
use cadence_engine::Engine;
use cadence_shared::config::EngineConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cadence-gateway")]
#[command(about = "Observability surface exposing engine health and metric snapshots", long_about = None)]
struct CliArgs {
    /// Path to the engine configuration file (engine.toml).
    #[arg(value_name = "CONFIG_FILE")]
    config_file: PathBuf,

    /// Address to bind the HTTP surface to.
    #[arg(long = "listen-address", value_name = "ADDRESS", default_value = "127.0.0.1:8080")]
    listen_address: String,
}

struct GatewayState {
    engine: Engine,
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn metrics(State(state): State<Arc<GatewayState>>) -> Json<MetricSnapshot> {
    let snapshot = state.engine.metrics.snapshot(chrono::Utc::now()).await;
    Json(snapshot)
}

fn load_config(path: &PathBuf) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: EngineConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid engine configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args.config_file)?;
    let listen_address: SocketAddr = args
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address '{}'", args.listen_address))?;

    let engine = Engine::new(config.clone()).context("building engine")?;
    let (producer, mut outbound_rx, _inbound_tx, consumer) =
        in_process_channel(config.channel_buffer_size);
    tokio::spawn(async move { while outbound_rx.recv().await.is_some() {} });
    let running = engine.start(Arc::new(producer), Arc::new(consumer));

    let state = Arc::new(GatewayState { engine });
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!(address = %listen_address, "starting cadence-gateway");
    let listener = tokio::net::TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("binding {listen_address}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving gateway")?;

    running.stop().await;
    Ok(())
}
