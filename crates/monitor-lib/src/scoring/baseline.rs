//! Rolling baseline refresh
//!
//! Recomputes the long-window per-device latency baseline on its own slow
//! timer, keeping a reference distinct from the fast scoring window, and
//! prunes telemetry older than the retention horizon.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::features::extract_features;
use crate::store::TelemetryStore;

/// Configuration for the baseline loop
#[derive(Debug, Clone)]
pub struct BaselineConfig {
    /// Period between refreshes (default: 5 minutes)
    pub period: Duration,
    /// Lookback window in minutes (default: 60)
    pub window_mins: i64,
    /// Probe results older than this are pruned (default: 15 days)
    pub retention_days: i64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5 * 60),
            window_mins: 60,
            retention_days: 15,
        }
    }
}

/// Baseline loop that periodically refreshes the slow-moving reference
pub struct BaselineLoop {
    store: Arc<dyn TelemetryStore>,
    config: BaselineConfig,
}

impl BaselineLoop {
    pub fn new(store: Arc<dyn TelemetryStore>, config: BaselineConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            period_secs = self.config.period.as_secs(),
            window_mins = self.config.window_mins,
            "Starting baseline loop"
        );

        let mut ticker = interval(self.config.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down baseline loop");
                    break;
                }
            }
        }
    }

    /// One baseline refresh plus retention pruning
    pub async fn run_cycle(&self) {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.config.window_mins);
        match self.store.fetch_results_since(cutoff).await {
            Ok(results) if results.is_empty() => {
                warn!("No recent results for baseline refresh");
            }
            Ok(results) => {
                let features = extract_features(&results);
                for f in &features {
                    if let Err(e) = self
                        .store
                        .upsert_baseline(f.device_id, f.mean_latency_ms, f.std_dev_latency_ms)
                        .await
                    {
                        warn!(device_id = f.device_id, error = %e, "Failed to persist baseline");
                    }
                }
                info!(devices = features.len(), "Device baselines refreshed");
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch baseline window");
            }
        }

        let horizon = Utc::now() - ChronoDuration::days(self.config.retention_days);
        match self.store.prune_results_before(horizon).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned expired probe results"),
            Err(e) => warn!(error = %e, "Failed to prune probe results"),
        }
    }
}
