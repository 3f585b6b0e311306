//! Telemetry store interface
//!
//! The engine treats persistence as an opaque collaborator: an append-only
//! probe log, the device registry, and baseline/score upserts. Every loop
//! logs store failures and continues; a write error is never fatal.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Device, ProbeResult, ProbeStatus};

/// Errors surfaced by a telemetry store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
}

/// Trait for telemetry store implementations
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Fetch the full device registry
    async fn fetch_devices(&self) -> Result<Vec<Device>, StoreError>;

    /// Results at or after the cutoff, ordered by device id then timestamp
    async fn fetch_results_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ProbeResult>, StoreError>;

    /// Append one probe result. Latency is passed as 0.0 when the device
    /// was unreachable so the log stays total.
    async fn append_result(
        &self,
        device_id: i64,
        latency_ms: f64,
        status: ProbeStatus,
    ) -> Result<(), StoreError>;

    /// Insert or update the rolling baseline for a device
    async fn upsert_baseline(
        &self,
        device_id: i64,
        mean_latency_ms: f64,
        std_dev_latency_ms: f64,
    ) -> Result<(), StoreError>;

    /// Insert or update the risk score for a device
    async fn upsert_risk_score(&self, device_id: i64, score: f64) -> Result<(), StoreError>;

    /// Drop probe results older than the cutoff, returning how many were
    /// removed
    async fn prune_results_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
