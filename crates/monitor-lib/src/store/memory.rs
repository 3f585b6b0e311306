//! In-memory telemetry store
//!
//! Reference implementation backing the binary and the test suite. A real
//! deployment puts a database behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{StoreError, TelemetryStore};
use crate::models::{Baseline, Device, ProbeResult, ProbeStatus};

#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<Vec<Device>>,
    results: RwLock<Vec<ProbeResult>>,
    baselines: RwLock<HashMap<i64, Baseline>>,
    scores: RwLock<HashMap<i64, f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices: RwLock::new(devices),
            ..Self::default()
        }
    }

    /// Replace the device registry
    pub async fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.write().await = devices;
    }

    /// Insert a fully-formed probe result, for seeding and tests
    pub async fn push_result(&self, result: ProbeResult) {
        self.results.write().await.push(result);
    }

    pub async fn result_count(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn risk_score(&self, device_id: i64) -> Option<f64> {
        self.scores.read().await.get(&device_id).copied()
    }

    pub async fn risk_scores(&self) -> HashMap<i64, f64> {
        self.scores.read().await.clone()
    }

    pub async fn baseline(&self, device_id: i64) -> Option<Baseline> {
        self.baselines.read().await.get(&device_id).cloned()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn fetch_devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.devices.read().await.clone())
    }

    async fn fetch_results_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, StoreError> {
        let results = self.results.read().await;
        let mut window: Vec<ProbeResult> = results
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .cloned()
            .collect();
        window.sort_by(|a, b| {
            a.device_id
                .cmp(&b.device_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(window)
    }

    async fn append_result(
        &self,
        device_id: i64,
        latency_ms: f64,
        status: ProbeStatus,
    ) -> Result<(), StoreError> {
        // A zero latency is the sentinel for "no reading"
        let latency_ms = if latency_ms == 0.0 {
            None
        } else {
            Some(latency_ms)
        };
        self.results.write().await.push(ProbeResult {
            device_id,
            timestamp: Utc::now(),
            latency_ms,
            status,
        });
        Ok(())
    }

    async fn upsert_baseline(
        &self,
        device_id: i64,
        mean_latency_ms: f64,
        std_dev_latency_ms: f64,
    ) -> Result<(), StoreError> {
        self.baselines.write().await.insert(
            device_id,
            Baseline {
                device_id,
                mean_latency_ms,
                std_dev_latency_ms,
            },
        );
        Ok(())
    }

    async fn upsert_risk_score(&self, device_id: i64, score: f64) -> Result<(), StoreError> {
        self.scores.write().await.insert(device_id, score);
        Ok(())
    }

    async fn prune_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut results = self.results.write().await;
        let before = results.len();
        results.retain(|r| r.timestamp >= cutoff);
        Ok((before - results.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn result_at(device_id: i64, seconds_ago: i64, status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            device_id,
            timestamp: Utc::now() - Duration::seconds(seconds_ago),
            latency_ms: Some(5.0),
            status,
        }
    }

    #[tokio::test]
    async fn test_fetch_results_ordered_by_device_then_time() {
        let store = MemoryStore::new();
        store.push_result(result_at(2, 10, ProbeStatus::Up)).await;
        store.push_result(result_at(1, 5, ProbeStatus::Up)).await;
        store.push_result(result_at(1, 20, ProbeStatus::Down)).await;

        let window = store
            .fetch_results_since(Utc::now() - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(window.len(), 3);
        assert_eq!(window[0].device_id, 1);
        assert_eq!(window[0].status, ProbeStatus::Down);
        assert_eq!(window[1].device_id, 1);
        assert_eq!(window[2].device_id, 2);
    }

    #[tokio::test]
    async fn test_append_zero_latency_stored_as_no_reading() {
        let store = MemoryStore::new();
        store.append_result(1, 0.0, ProbeStatus::Down).await.unwrap();
        store.append_result(1, 4.2, ProbeStatus::Up).await.unwrap();

        let window = store
            .fetch_results_since(Utc::now() - Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(window[0].latency_ms, None);
        assert_eq!(window[1].latency_ms, Some(4.2));
    }

    #[tokio::test]
    async fn test_prune_removes_only_old_results() {
        let store = MemoryStore::new();
        store.push_result(result_at(1, 3600, ProbeStatus::Up)).await;
        store.push_result(result_at(1, 10, ProbeStatus::Up)).await;

        let removed = store
            .prune_results_before(Utc::now() - Duration::minutes(30))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.result_count().await, 1);
    }

    #[tokio::test]
    async fn test_upserts_overwrite() {
        let store = MemoryStore::new();
        store.upsert_risk_score(7, 0.4).await.unwrap();
        store.upsert_risk_score(7, 0.9).await.unwrap();
        assert_eq!(store.risk_score(7).await, Some(0.9));

        store.upsert_baseline(7, 4.0, 1.0).await.unwrap();
        store.upsert_baseline(7, 5.0, 2.0).await.unwrap();
        let baseline = store.baseline(7).await.unwrap();
        assert_eq!(baseline.mean_latency_ms, 5.0);
        assert_eq!(baseline.std_dev_latency_ms, 2.0);
    }
}
