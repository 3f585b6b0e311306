//! Core data models for the fleet monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored device, owned by the external registry.
///
/// Reference data only: the engine never mutates devices, it probes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub address: String,
    /// Contact reference for alert routing (e.g. an email address)
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
}

/// Reachability status reported by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Up,
    Down,
}

impl ProbeStatus {
    pub fn is_up(self) -> bool {
        matches!(self, ProbeStatus::Up)
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeStatus::Up => write!(f, "UP"),
            ProbeStatus::Down => write!(f, "DOWN"),
        }
    }
}

/// One probe fact in the append-only telemetry log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub device_id: i64,
    pub timestamp: DateTime<Utc>,
    /// Absent when the device was unreachable. A reading of exactly 0.0
    /// also means "no reading" (scanner convention) and is excluded from
    /// all statistics.
    pub latency_ms: Option<f64>,
    pub status: ProbeStatus,
}

/// Current status for one device, overwritten every poll cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStatus {
    pub status: ProbeStatus,
    pub latency_ms: Option<f64>,
}

/// Long-window latency reference for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub device_id: i64,
    pub mean_latency_ms: f64,
    /// Sample standard deviation; 0 when fewer than two valid samples exist
    pub std_dev_latency_ms: f64,
}

/// Aggregated scoring-window features for one device.
///
/// The device id travels with the row through the whole scoring pipeline
/// so scores never rely on positional alignment with a feature table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFeatures {
    pub device_id: i64,
    pub mean_latency_ms: f64,
    pub std_dev_latency_ms: f64,
    /// UP rows over total rows in the window; 0 with no rows
    pub uptime_ratio: f64,
}

impl DeviceFeatures {
    /// Feature row fed to the outlier model, with non-finite values
    /// guarded to 0
    pub fn row(&self) -> [f64; 3] {
        [
            finite_or_zero(self.mean_latency_ms),
            finite_or_zero(self.std_dev_latency_ms),
            finite_or_zero(self.uptime_ratio),
        ]
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(ProbeStatus::Up.to_string(), "UP");
        assert_eq!(ProbeStatus::Down.to_string(), "DOWN");
        assert!(ProbeStatus::Up.is_up());
        assert!(!ProbeStatus::Down.is_up());
    }

    #[test]
    fn test_feature_row_guards_non_finite() {
        let features = DeviceFeatures {
            device_id: 1,
            mean_latency_ms: f64::NAN,
            std_dev_latency_ms: 2.5,
            uptime_ratio: 1.0,
        };
        assert_eq!(features.row(), [0.0, 2.5, 1.0]);
    }

    #[test]
    fn test_status_serde_uppercase() {
        let json = serde_json::to_string(&ProbeStatus::Down).unwrap();
        assert_eq!(json, "\"DOWN\"");
        let parsed: ProbeStatus = serde_json::from_str("\"UP\"").unwrap();
        assert_eq!(parsed, ProbeStatus::Up);
    }
}
