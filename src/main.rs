mod config;
mod core;
mod error;
mod notifications;
mod rpc;
mod signals;

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::ScanKind;
use crate::core::pipeline::{Monitor, Outbound, run_dispatcher};
use crate::notifications::{AlertSink, Notifier};
use crate::rpc::{GeckoTerminalClient, MarketData};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("poolradar=info".parse()?))
        .init();

    tracing::info!("🔭 poolradar starting...");

    // Load configuration
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let mut config = Config::load(&path);
    config.apply_env();
    config.validate().context("configuration rejected")?;
    tracing::info!(
        networks = ?config.monitor.networks,
        rate_limit = config.provider.rate_limit_calls,
        "Config ready"
    );

    let market: Arc<dyn MarketData> = Arc::new(
        GeckoTerminalClient::new(&config.provider).context("building market-data client")?,
    );
    let sink: Arc<dyn AlertSink> = Arc::new(Notifier::from_config(&config.notifications));

    // Scan tasks -> dispatcher channel
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (stop_tx, stop_rx) = watch::channel(false);

    let monitor = Arc::new(Monitor::new(config, market, out_tx));
    let dispatcher = tokio::spawn(run_dispatcher(out_rx, sink));

    let tasks = vec![
        tokio::spawn(monitor.clone().run_scan_loop(ScanKind::Moonshot, stop_rx.clone())),
        tokio::spawn(monitor.clone().run_scan_loop(ScanKind::Rug, stop_rx.clone())),
        tokio::spawn(monitor.clone().run_status_reporter(stop_rx.clone())),
        tokio::spawn(monitor.clone().run_idle_broadcaster(stop_rx)),
    ];
    tracing::info!("Scanner tasks started");

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    stop_tx.send(true).ok();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!("task ended abnormally: {e}");
        }
    }
    let status = monitor.rate_limiter_status();
    tracing::info!(
        remaining_calls = status.remaining_calls,
        max_calls = status.max_calls_per_window,
        "Scanners stopped"
    );

    // Dispatcher exits once the last sender is dropped.
    drop(monitor);
    dispatcher.await.context("dispatcher task")?;
    tracing::info!("poolradar stopped");
    Ok(())
}
