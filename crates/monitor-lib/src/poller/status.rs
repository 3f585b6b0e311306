//! Live device status table
//!
//! Written only by the poll loop, read concurrently by status-reporting
//! collaborators. Holds no history: each entry is overwritten every cycle.

use dashmap::DashMap;

use crate::models::{LiveStatus, ProbeStatus};

#[derive(Default)]
pub struct LiveStatusTable {
    entries: DashMap<i64, LiveStatus>,
}

impl LiveStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, device_id: i64, status: ProbeStatus, latency_ms: Option<f64>) {
        self.entries.insert(device_id, LiveStatus { status, latency_ms });
    }

    pub fn get(&self, device_id: i64) -> Option<LiveStatus> {
        self.entries.get(&device_id).map(|r| r.clone())
    }

    /// Snapshot of every device's current status
    pub fn snapshot(&self) -> Vec<(i64, LiveStatus)> {
        self.entries
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
