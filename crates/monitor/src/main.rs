//! Device fleet monitor binary

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use monitor_lib::alert::{AlertDispatcher, FanoutDispatcher, LogDispatcher};
use monitor_lib::models::Device;
use monitor_lib::poller::{LiveStatusTable, PollLoopBuilder, StreakTracker};
use monitor_lib::probe::TcpProber;
use monitor_lib::scoring::{BaselineConfig, BaselineLoop, ForestConfig, ScoringConfig, ScoringLoop};
use monitor_lib::store::{MemoryStore, TelemetryStore};

use crate::config::MonitorConfig;

/// Load the device registry from a JSON file. A missing file is not fatal;
/// the monitor starts with an empty fleet and polls nothing.
fn load_devices(path: &str) -> Result<Vec<Device>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let devices: Vec<Device> = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse device registry {path}"))?;
            Ok(devices)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path, "Device registry not found, starting with empty fleet");
            Ok(Vec::new())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read device registry {path}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting device fleet monitor");

    let config = MonitorConfig::load()?;
    info!(?config, "Configuration loaded");

    let devices = load_devices(&config.devices_file)?;
    info!(devices = devices.len(), "Device registry loaded");

    let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::with_devices(devices));
    let dispatcher: Arc<dyn AlertDispatcher> = Arc::new(FanoutDispatcher::new(vec![
        Arc::new(LogDispatcher) as Arc<dyn AlertDispatcher>,
    ]));
    let status = Arc::new(LiveStatusTable::new());
    let streaks = Arc::new(StreakTracker::new());

    let (shutdown_tx, _) = broadcast::channel(1);

    let poll_loop = PollLoopBuilder::new()
        .prober(Arc::new(TcpProber::new(Duration::from_millis(
            config.probe_timeout_ms,
        ))))
        .store(Arc::clone(&store))
        .dispatcher(Arc::clone(&dispatcher))
        .status(Arc::clone(&status))
        .streaks(Arc::clone(&streaks))
        .cycle_interval(Duration::from_secs(config.poll_interval_secs))
        .batch_size(config.batch_size)
        .batch_pause(Duration::from_secs(config.batch_pause_secs))
        .alert_streak_threshold(config.alert_streak_threshold)
        .build()?;

    let scoring_loop = ScoringLoop::new(
        Arc::clone(&store),
        Arc::clone(&dispatcher),
        ScoringConfig {
            period: Duration::from_secs(config.scoring_period_secs),
            window_mins: config.scoring_window_mins,
            forest: ForestConfig {
                contamination: config.contamination,
                seed: config.random_seed,
                ..ForestConfig::default()
            },
        },
    );

    let baseline_loop = BaselineLoop::new(
        Arc::clone(&store),
        BaselineConfig {
            period: Duration::from_secs(config.baseline_period_secs),
            window_mins: config.baseline_window_mins,
            retention_days: config.retention_days,
        },
    );

    let poll_handle = tokio::spawn(poll_loop.run(shutdown_tx.subscribe()));
    let scoring_handle = tokio::spawn(scoring_loop.run(shutdown_tx.subscribe()));
    let baseline_handle = tokio::spawn(baseline_loop.run(shutdown_tx.subscribe()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping loops");
    let _ = shutdown_tx.send(());

    let _ = poll_handle.await;
    let _ = scoring_handle.await;
    let _ = baseline_handle.await;

    info!("Monitor stopped");
    Ok(())
}
