//! Device polling loop
//!
//! Runs the unending probe cycle: fetch the registry, dedupe by address,
//! probe in bounded-concurrency batches, then update streaks, live
//! status, and the telemetry log, alerting when a failure streak crosses
//! the threshold.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{LiveStatusTable, StreakTracker};
use crate::alert::{AlertDispatcher, IssueKind};
use crate::models::{Device, ProbeStatus};
use crate::probe::{ProbeOutcome, Prober};
use crate::store::TelemetryStore;

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between full cycles (default: 2 seconds)
    pub cycle_interval: Duration,
    /// Devices probed concurrently per batch (default: 50)
    pub batch_size: usize,
    /// Pause between batches within a cycle (default: 2 seconds)
    pub batch_pause: Duration,
    /// Consecutive DOWNs before a DeviceDown alert (default: 5)
    pub alert_streak_threshold: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(2),
            batch_size: 50,
            batch_pause: Duration::from_secs(2),
            alert_streak_threshold: 5,
        }
    }
}

/// Poll loop that probes every registered device each cycle
pub struct PollLoop {
    prober: Arc<dyn Prober>,
    store: Arc<dyn TelemetryStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    status: Arc<LiveStatusTable>,
    streaks: Arc<StreakTracker>,
    config: PollConfig,
}

impl PollLoop {
    pub fn new(
        prober: Arc<dyn Prober>,
        store: Arc<dyn TelemetryStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
        status: Arc<LiveStatusTable>,
        streaks: Arc<StreakTracker>,
        config: PollConfig,
    ) -> Self {
        Self {
            prober,
            store,
            dispatcher,
            status,
            streaks,
            config,
        }
    }

    /// Run until shutdown. Interruptible at the inter-cycle sleep.
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting poll loop"
        );

        loop {
            self.run_cycle().await;

            tokio::select! {
                _ = sleep(self.config.cycle_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop");
                    break;
                }
            }
        }
    }

    /// One full pass over the registry
    pub async fn run_cycle(&self) {
        let devices = match self.store.fetch_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Failed to fetch device registry");
                return;
            }
        };

        if devices.is_empty() {
            warn!("Device registry is empty, nothing to probe");
            return;
        }

        let unique = dedupe_by_address(devices);
        debug!(devices = unique.len(), "Starting probe cycle");

        let batch_count = unique.chunks(self.config.batch_size).count();
        for (index, batch) in unique.chunks(self.config.batch_size).enumerate() {
            self.probe_batch(batch).await;
            debug!(batch = index + 1, batches = batch_count, "Batch complete");

            if index + 1 < batch_count {
                sleep(self.config.batch_pause).await;
            }
        }
    }

    /// Probe one batch concurrently and apply every outcome
    async fn probe_batch(&self, batch: &[Device]) {
        let mut tasks = JoinSet::new();
        for device in batch {
            let prober = Arc::clone(&self.prober);
            let device = device.clone();
            tasks.spawn(async move {
                let outcome = prober.probe(&device.address).await;
                (device, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device, outcome)) => self.apply_outcome(&device, outcome).await,
                Err(e) => warn!(error = %e, "Probe task failed to complete"),
            }
        }
    }

    async fn apply_outcome(&self, device: &Device, outcome: ProbeOutcome) {
        match outcome.status {
            ProbeStatus::Down => {
                let streak = self.streaks.record_down(device.id);
                if self
                    .streaks
                    .should_alert(device.id, self.config.alert_streak_threshold)
                {
                    warn!(
                        device = %device.name,
                        address = %device.address,
                        streak,
                        "Consecutive-failure threshold reached, dispatching alert"
                    );
                    if let Err(e) = self
                        .dispatcher
                        .notify(&device.name, &device.address, IssueKind::DeviceDown)
                        .await
                    {
                        // Dedup flag stays set: no retry until the next
                        // distinct streak.
                        warn!(device = %device.name, error = %e, "Alert dispatch failed");
                    }
                }
            }
            ProbeStatus::Up => self.streaks.record_up(device.id),
        }

        self.status
            .update(device.id, outcome.status, outcome.latency_ms);

        debug!(
            device = %device.name,
            address = %device.address,
            status = %outcome.status,
            latency_ms = ?outcome.latency_ms,
            "Probe result"
        );

        if let Err(e) = self
            .store
            .append_result(device.id, outcome.latency_ms.unwrap_or(0.0), outcome.status)
            .await
        {
            warn!(device = %device.name, error = %e, "Failed to persist probe result");
        }
    }
}

/// First registry occurrence wins when rows share an address
fn dedupe_by_address(devices: Vec<Device>) -> Vec<Device> {
    let mut seen = HashSet::new();
    devices
        .into_iter()
        .filter(|d| seen.insert(d.address.clone()))
        .collect()
}

/// Builder for creating the poll loop
pub struct PollLoopBuilder {
    prober: Option<Arc<dyn Prober>>,
    store: Option<Arc<dyn TelemetryStore>>,
    dispatcher: Option<Arc<dyn AlertDispatcher>>,
    status: Option<Arc<LiveStatusTable>>,
    streaks: Option<Arc<StreakTracker>>,
    config: PollConfig,
}

impl PollLoopBuilder {
    pub fn new() -> Self {
        Self {
            prober: None,
            store: None,
            dispatcher: None,
            status: None,
            streaks: None,
            config: PollConfig::default(),
        }
    }

    pub fn prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn store(mut self, store: Arc<dyn TelemetryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn AlertDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn status(mut self, status: Arc<LiveStatusTable>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn streaks(mut self, streaks: Arc<StreakTracker>) -> Self {
        self.streaks = Some(streaks);
        self
    }

    pub fn cycle_interval(mut self, interval: Duration) -> Self {
        self.config.cycle_interval = interval;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size.max(1);
        self
    }

    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.config.batch_pause = pause;
        self
    }

    pub fn alert_streak_threshold(mut self, threshold: u32) -> Self {
        self.config.alert_streak_threshold = threshold;
        self
    }

    pub fn build(self) -> Result<PollLoop> {
        let prober = self
            .prober
            .ok_or_else(|| anyhow::anyhow!("Prober is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| anyhow::anyhow!("Dispatcher is required"))?;
        let status = self.status.unwrap_or_else(|| Arc::new(LiveStatusTable::new()));
        let streaks = self.streaks.unwrap_or_else(|| Arc::new(StreakTracker::new()));

        Ok(PollLoop::new(
            prober, store, dispatcher, status, streaks, self.config,
        ))
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
