//! Risk scoring cycle
//!
//! Recomputes every device's risk score from the recent telemetry
//! window: rule-based overrides first, then the isolation forest over the
//! per-device feature matrix, min-max normalized to [0, 1]. Each cycle is
//! independent and idempotent for a fixed window and seed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::features::{extract_features, group_by_recency, valid_latency};
use super::forest::{contamination_cutoff, normalize_scores, ForestConfig, IsolationForest};
use crate::alert::{AlertDispatcher, IssueKind};
use crate::models::{Device, DeviceFeatures, ProbeResult};
use crate::store::TelemetryStore;

/// How many most-recent DOWNs force a critical score
const SUSTAINED_DOWN_RUN: usize = 5;
/// Spike rule: length of the recent head that must be elevated
const SPIKE_RECENT_LEN: usize = 5;
/// Spike rule: every recent latency must exceed this
const SPIKE_LATENCY_FLOOR_MS: f64 = 15.0;
/// Spike rule: comparison window is the next ten results after the head
const SPIKE_COMPARISON_LEN: usize = 10;
/// Spike rule: minimum valid samples required in the comparison window
const SPIKE_MIN_COMPARISON_SAMPLES: usize = 5;
/// Spike rule: comparison-window mean must land in this healthy band (ms)
const SPIKE_HEALTHY_BAND_MS: (f64, f64) = (3.0, 6.0);

/// Configuration for the scoring loop
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Period between scoring cycles (default: 60 seconds)
    pub period: Duration,
    /// Lookback window in minutes (default: 5)
    pub window_mins: i64,
    pub forest: ForestConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            window_mins: 5,
            forest: ForestConfig::default(),
        }
    }
}

/// Scoring loop that periodically rescores the whole device set
pub struct ScoringLoop {
    store: Arc<dyn TelemetryStore>,
    dispatcher: Arc<dyn AlertDispatcher>,
    config: ScoringConfig,
}

impl ScoringLoop {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        dispatcher: Arc<dyn AlertDispatcher>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            period_secs = self.config.period.as_secs(),
            window_mins = self.config.window_mins,
            "Starting scoring loop"
        );

        let mut ticker = interval(self.config.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scoring loop");
                    break;
                }
            }
        }
    }

    /// One scoring pass over the lookback window
    pub async fn run_cycle(&self) {
        let cutoff = Utc::now() - ChronoDuration::minutes(self.config.window_mins);
        let results = match self.store.fetch_results_since(cutoff).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Failed to fetch scoring window");
                return;
            }
        };

        if results.is_empty() {
            warn!("No recent results in scoring window, skipping cycle");
            return;
        }

        let features = extract_features(&results);
        self.persist_baselines(&features).await;

        let critical = sustained_down_devices(&results);
        for device_id in &critical {
            error!(device_id, "Device DOWN five times consecutively, marked critical");
        }

        self.dispatch_spike_alerts(&results).await;

        let scores = score_features(&features, &critical, &self.config.forest);

        for (device_id, score) in &scores {
            debug!(
                device_id,
                score,
                critical = critical.contains(device_id),
                "Risk score"
            );
            if let Err(e) = self.store.upsert_risk_score(*device_id, *score).await {
                warn!(device_id, error = %e, "Failed to persist risk score");
            }
        }

        info!(
            devices = scores.len(),
            critical = critical.len(),
            "Risk scores updated"
        );
    }

    async fn persist_baselines(&self, features: &[DeviceFeatures]) {
        for f in features {
            if let Err(e) = self
                .store
                .upsert_baseline(f.device_id, f.mean_latency_ms, f.std_dev_latency_ms)
                .await
            {
                warn!(device_id = f.device_id, error = %e, "Failed to persist baseline");
            }
        }
    }

    /// Latency-spike notifications are fired every cycle the pattern
    /// holds; they never feed back into the score.
    async fn dispatch_spike_alerts(&self, results: &[ProbeResult]) {
        let spiking = latency_spike_devices(results);
        if spiking.is_empty() {
            return;
        }

        let registry: HashMap<i64, Device> = match self.store.fetch_devices().await {
            Ok(devices) => devices.into_iter().map(|d| (d.id, d)).collect(),
            Err(e) => {
                warn!(error = %e, "Failed to resolve devices for spike alerts");
                return;
            }
        };

        for device_id in spiking {
            let Some(device) = registry.get(&device_id) else {
                continue;
            };
            error!(
                device = %device.name,
                address = %device.address,
                "Very unstable device, high latency spike"
            );
            if let Err(e) = self
                .dispatcher
                .notify(&device.name, &device.address, IssueKind::LatencySpike)
                .await
            {
                warn!(device = %device.name, error = %e, "Spike alert dispatch failed");
            }
        }
    }
}

/// Devices whose five most recent window results are all DOWN.
///
/// Requires exactly a full run: fewer than five results never qualifies.
pub(crate) fn sustained_down_devices(results: &[ProbeResult]) -> HashSet<i64> {
    group_by_recency(results)
        .into_iter()
        .filter_map(|(device_id, rows)| {
            let head = &rows[..rows.len().min(SUSTAINED_DOWN_RUN)];
            (head.len() == SUSTAINED_DOWN_RUN && head.iter().all(|r| !r.status.is_up()))
                .then_some(device_id)
        })
        .collect()
}

/// Devices whose latency broke away from a healthy baseline: the five
/// most recent readings are all valid and above the floor while the ten
/// results before them average inside the healthy band. A single missing
/// reading in the head disarms the rule for the cycle.
pub(crate) fn latency_spike_devices(results: &[ProbeResult]) -> Vec<i64> {
    group_by_recency(results)
        .into_iter()
        .filter_map(|(device_id, rows)| {
            if rows.len() < SPIKE_RECENT_LEN {
                return None;
            }
            let recent: Vec<f64> = rows[..SPIKE_RECENT_LEN]
                .iter()
                .map(|r| valid_latency(r.latency_ms))
                .collect::<Option<Vec<f64>>>()?;
            if !recent.iter().all(|v| *v > SPIKE_LATENCY_FLOOR_MS) {
                return None;
            }

            let comparison: Vec<f64> = rows
                .iter()
                .skip(SPIKE_RECENT_LEN)
                .take(SPIKE_COMPARISON_LEN)
                .filter_map(|r| valid_latency(r.latency_ms))
                .collect();
            if comparison.len() < SPIKE_MIN_COMPARISON_SAMPLES {
                return None;
            }

            let avg = comparison.iter().sum::<f64>() / comparison.len() as f64;
            let (low, high) = SPIKE_HEALTHY_BAND_MS;
            (low <= avg && avg <= high).then_some(device_id)
        })
        .collect()
}

/// Forest scoring with rule overrides merged in. Device ids travel with
/// their rows, so no positional alignment with a feature table is ever
/// assumed.
pub(crate) fn score_features(
    features: &[DeviceFeatures],
    critical: &HashSet<i64>,
    config: &ForestConfig,
) -> Vec<(i64, f64)> {
    let rows: Vec<[f64; 3]> = features.iter().map(DeviceFeatures::row).collect();
    let forest = IsolationForest::fit(&rows, config);
    let raw = forest.scores(&rows);

    let cutoff = contamination_cutoff(&raw, config.contamination);
    let flagged = raw.iter().filter(|s| **s >= cutoff).count();
    debug!(flagged, cutoff, "Outlier model fitted");

    let normalized = normalize_scores(&raw);
    features
        .iter()
        .zip(normalized)
        .map(|(f, score)| {
            let final_score = if critical.contains(&f.device_id) {
                1.0
            } else {
                score
            };
            (f.device_id, final_score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProbeResult, ProbeStatus};
    use crate::store::MemoryStore;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingDispatcher {
        events: Mutex<Vec<(String, IssueKind)>>,
    }

    impl RecordingDispatcher {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn spikes(&self) -> usize {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, issue)| *issue == IssueKind::LatencySpike)
                .count()
        }
    }

    #[async_trait]
    impl AlertDispatcher for RecordingDispatcher {
        async fn notify(&self, device_name: &str, _address: &str, issue: IssueKind) -> AnyResult<()> {
            self.events
                .lock()
                .unwrap()
                .push((device_name.to_string(), issue));
            Ok(())
        }
    }

    fn result(device_id: i64, seconds_ago: i64, latency_ms: Option<f64>, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            device_id,
            timestamp: Utc::now() - ChronoDuration::seconds(seconds_ago),
            latency_ms,
            status,
        }
    }

    fn device(id: i64, name: &str, address: &str) -> Device {
        Device {
            id,
            name: name.to_string(),
            address: address.to_string(),
            contact: None,
            device_type: None,
        }
    }

    /// Recent-first latency sequence helper: index 0 is the most recent
    fn latency_series(device_id: i64, latencies: &[Option<f64>]) -> Vec<ProbeResult> {
        latencies
            .iter()
            .enumerate()
            .map(|(i, latency)| {
                let status = if latency.is_some() {
                    ProbeStatus::Up
                } else {
                    ProbeStatus::Down
                };
                result(device_id, (i as i64 + 1) * 2, *latency, status)
            })
            .collect()
    }

    #[test]
    fn test_sustained_down_needs_exactly_five_recent_downs() {
        let mut results = Vec::new();
        for i in 0..5 {
            results.push(result(1, (i + 1) * 2, None, ProbeStatus::Down));
        }
        assert!(sustained_down_devices(&results).contains(&1));

        // Four DOWNs then an UP as the most recent: no override
        let mut recovered = Vec::new();
        recovered.push(result(2, 2, Some(4.0), ProbeStatus::Up));
        for i in 1..5 {
            recovered.push(result(2, (i + 1) * 2, None, ProbeStatus::Down));
        }
        assert!(!sustained_down_devices(&recovered).contains(&2));

        // Only four results total: never qualifies
        let short: Vec<ProbeResult> = (0..4)
            .map(|i| result(3, (i + 1) * 2, None, ProbeStatus::Down))
            .collect();
        assert!(sustained_down_devices(&short).is_empty());
    }

    #[test]
    fn test_spike_rule_matches_reference_scenario() {
        // Recent five all above 15ms, prior ten averaging 4.5ms
        let mut latencies: Vec<Option<f64>> = [20.0, 22.0, 18.0, 25.0, 21.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        latencies.extend((0..10).map(|i| Some(if i % 2 == 0 { 4.0 } else { 5.0 })));

        let results = latency_series(1, &latencies);
        assert_eq!(latency_spike_devices(&results), vec![1]);
    }

    #[test]
    fn test_spike_rule_ignores_high_prior_average() {
        let mut latencies: Vec<Option<f64>> = [20.0, 22.0, 18.0, 25.0, 21.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        latencies.extend((0..10).map(|_| Some(10.0)));

        let results = latency_series(1, &latencies);
        assert!(latency_spike_devices(&results).is_empty());
    }

    #[test]
    fn test_spike_rule_disarmed_by_missing_recent_reading() {
        let mut latencies: Vec<Option<f64>> =
            vec![Some(20.0), Some(22.0), None, Some(25.0), Some(21.0)];
        latencies.extend((0..10).map(|_| Some(4.5)));

        let results = latency_series(1, &latencies);
        assert!(latency_spike_devices(&results).is_empty());
    }

    #[test]
    fn test_spike_rule_needs_five_valid_comparison_samples() {
        let mut latencies: Vec<Option<f64>> = [20.0, 22.0, 18.0, 25.0, 21.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        // Comparison window has only four valid readings
        latencies.extend([Some(4.0), Some(5.0), None, Some(0.0), Some(4.0), Some(5.0)]);

        let results = latency_series(1, &latencies);
        assert!(latency_spike_devices(&results).is_empty());
    }

    #[test]
    fn test_critical_overrides_model_score() {
        let features = vec![
            DeviceFeatures {
                device_id: 1,
                mean_latency_ms: 5.0,
                std_dev_latency_ms: 1.0,
                uptime_ratio: 1.0,
            },
            DeviceFeatures {
                device_id: 2,
                mean_latency_ms: 0.0,
                std_dev_latency_ms: 0.0,
                uptime_ratio: 0.0,
            },
        ];
        let critical: HashSet<i64> = [2].into_iter().collect();

        let scores = score_features(&features, &critical, &ForestConfig::default());
        let by_id: HashMap<i64, f64> = scores.into_iter().collect();

        assert_eq!(by_id[&2], 1.0);
        assert!((0.0..=1.0).contains(&by_id[&1]));
    }

    #[test]
    fn test_single_non_critical_device_scores_zero() {
        let features = vec![DeviceFeatures {
            device_id: 1,
            mean_latency_ms: 5.0,
            std_dev_latency_ms: 1.0,
            uptime_ratio: 1.0,
        }];
        let scores = score_features(&features, &HashSet::new(), &ForestConfig::default());
        assert_eq!(scores, vec![(1, 0.0)]);
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::with_devices(vec![
            device(1, "sw1", "10.0.0.1"),
            device(2, "sw2", "10.0.0.2"),
            device(3, "sw3", "10.0.0.3"),
        ]));

        // Healthy devices with slightly different latencies
        for i in 0..10i64 {
            store
                .push_result(result(1, i * 6 + 2, Some(4.0 + (i % 3) as f64), ProbeStatus::Up))
                .await;
            store
                .push_result(result(2, i * 6 + 3, Some(5.0 + (i % 2) as f64), ProbeStatus::Up))
                .await;
        }
        // Device 3 is hard down
        for i in 0..6i64 {
            store
                .push_result(result(3, i * 6 + 2, None, ProbeStatus::Down))
                .await;
        }
        store
    }

    #[tokio::test]
    async fn test_cycle_scores_bounded_and_critical_forced() {
        let store = seeded_store().await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let scoring = ScoringLoop::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::clone(&dispatcher) as Arc<dyn AlertDispatcher>,
            ScoringConfig::default(),
        );

        scoring.run_cycle().await;

        let scores = store.risk_scores().await;
        assert_eq!(scores.len(), 3);
        for score in scores.values() {
            assert!((0.0..=1.0).contains(score));
        }
        assert_eq!(scores[&3], 1.0);

        // Baselines were upserted for every device in the window
        assert!(store.baseline(1).await.is_some());
        assert!(store.baseline(3).await.is_some());
    }

    #[tokio::test]
    async fn test_cycle_is_idempotent_for_fixed_seed() {
        let store = seeded_store().await;
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let scoring = ScoringLoop::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::clone(&dispatcher) as Arc<dyn AlertDispatcher>,
            ScoringConfig::default(),
        );

        scoring.run_cycle().await;
        let first = store.risk_scores().await;

        scoring.run_cycle().await;
        let second = store.risk_scores().await;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_window_is_a_noop() {
        let store = Arc::new(MemoryStore::with_devices(vec![device(1, "sw1", "10.0.0.1")]));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let scoring = ScoringLoop::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::clone(&dispatcher) as Arc<dyn AlertDispatcher>,
            ScoringConfig::default(),
        );

        scoring.run_cycle().await;

        assert!(store.risk_scores().await.is_empty());
        assert_eq!(dispatcher.events.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_spike_alert_dispatched_from_cycle() {
        let store = Arc::new(MemoryStore::with_devices(vec![device(1, "sw1", "10.0.0.1")]));
        let mut latencies: Vec<Option<f64>> = [20.0, 22.0, 18.0, 25.0, 21.0]
            .iter()
            .map(|v| Some(*v))
            .collect();
        latencies.extend((0..10).map(|_| Some(4.5)));
        for r in latency_series(1, &latencies) {
            store.push_result(r).await;
        }

        let dispatcher = Arc::new(RecordingDispatcher::new());
        let scoring = ScoringLoop::new(
            Arc::clone(&store) as Arc<dyn TelemetryStore>,
            Arc::clone(&dispatcher) as Arc<dyn AlertDispatcher>,
            ScoringConfig::default(),
        );

        scoring.run_cycle().await;
        assert_eq!(dispatcher.spikes(), 1);

        // Spike events are not deduped across cycles
        scoring.run_cycle().await;
        assert_eq!(dispatcher.spikes(), 2);

        // The spike alone never forces a critical score
        assert!(store.risk_score(1).await.unwrap() < 1.0);
    }
}
