use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand};
use engine::{BarFeed, Engine, OrderExecutor};
use paper::PaperClient;
use strategy::{StrategyFileConfig, StrategyRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading environment config")?;
    info!(bars = %cfg.bars_path, strategies = %cfg.strategy_config_path, "SigBot starting");

    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
    let registry = StrategyRegistry::from_config(&strategy_file).context("building strategies")?;
    if registry.is_empty() {
        warn!("No strategies configured; bars will be replayed without trading");
    }

    let feed = BarFeed::from_csv(&cfg.bars_path)
        .with_context(|| format!("reading bars from {}", cfg.bars_path))?;

    // ── Execution ─────────────────────────────────────────────────────────────
    let client = Arc::new(PaperClient::new(cfg.paper_slippage_bps));
    let executor = OrderExecutor::new(client, Duration::from_millis(cfg.execution_timeout_ms));

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(registry, executor);
    let (bar_tx, bar_rx) = mpsc::channel(cfg.feed_buffer);
    tokio::spawn(feed.run(bar_tx));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping engine");
            handle.send(EngineCommand::Stop).await;
        }
    });

    let summary = engine.run(bar_rx).await.context("engine run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
