//! Headless entry point for `cadence-engine`: loads configuration, wires
//! the periodic runner, and runs until terminated. The dispatcher's
//! outbound side and the ingestor's inbound side are backed by the
//! in-process broker channel for this standalone binary — an operator who
//! wants a real worker fleet plugs an `OutboundProducer`/`InboundConsumer`
//! pair backed by an actual message broker into the `cadence_engine::Engine`
//! library API instead of running this binary directly.

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use cadence_engine::broker::in_process_channel;
use cadence_engine::Engine;
use cadence_shared::config::EngineConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cadence-engine")]
#[command(about = "Task-run lifecycle state machine and adaptive batch dispatcher", long_about = None)]
struct CliArgs {
    /// Path to the engine configuration file (engine.toml).
    #[arg(value_name = "CONFIG_FILE")]
    config_file: PathBuf,

    /// Override the configured sqlite path.
    #[arg(long = "sqlite-path", value_name = "PATH")]
    sqlite_path: Option<String>,
}

fn load_config(args: &CliArgs) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(&args.config_file)
        .with_context(|| format!("reading {}", args.config_file.display()))?;
    let mut config: EngineConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", args.config_file.display()))?;
    if let Some(sqlite_path) = &args.sqlite_path {
        config.sqlite_path = Some(sqlite_path.clone());
    }
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
    let config = load_config(&args)?;
    info!(config = ?config, "starting cadence-engine");

    let engine = Engine::new(config.clone()).context("building engine")?;
    let (producer, mut outbound_rx, _inbound_tx, consumer) =
        in_process_channel(config.channel_buffer_size);

    // No real worker attached in standalone mode: just drain and log
    // dispatched commands so the queue never backs up. `_inbound_tx` stays
    // alive in `main`'s scope so `consumer.recv()` doesn't see a closed
    // channel and return early.
    tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            info!(task_run_id = command.task_run.id, "dispatched command (no worker attached)");
        }
    });

    let running = engine.start(Arc::new(producer), Arc::new(consumer));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping periodic runner");
    running.stop().await;
    Ok(())
}
