//! Feature aggregation over a telemetry window
//!
//! Groups raw probe results per device and reduces them to the
//! (mean latency, latency std-dev, uptime ratio) vector consumed by the
//! outlier model and persisted as the device baseline.

use std::collections::BTreeMap;

use crate::models::{DeviceFeatures, ProbeResult};

/// Aggregate a window of results into per-device feature vectors.
///
/// Latencies that are absent or exactly zero count as "no reading" and
/// are excluded from the mean and standard deviation. Output is ordered
/// by device id.
pub fn extract_features(results: &[ProbeResult]) -> Vec<DeviceFeatures> {
    let mut grouped: BTreeMap<i64, Vec<&ProbeResult>> = BTreeMap::new();
    for result in results {
        grouped.entry(result.device_id).or_default().push(result);
    }

    grouped
        .into_iter()
        .map(|(device_id, rows)| {
            let valid: Vec<f64> = rows
                .iter()
                .filter_map(|r| valid_latency(r.latency_ms))
                .collect();
            let up_count = rows.iter().filter(|r| r.status.is_up()).count();

            DeviceFeatures {
                device_id,
                mean_latency_ms: mean(&valid),
                std_dev_latency_ms: std_dev(&valid),
                uptime_ratio: up_count as f64 / rows.len() as f64,
            }
        })
        .collect()
}

/// Zero readings are a scanner artifact, not a real measurement
pub(crate) fn valid_latency(latency_ms: Option<f64>) -> Option<f64> {
    latency_ms.filter(|v| *v != 0.0)
}

/// Group results per device, most recent first
pub(crate) fn group_by_recency(results: &[ProbeResult]) -> BTreeMap<i64, Vec<&ProbeResult>> {
    let mut grouped: BTreeMap<i64, Vec<&ProbeResult>> = BTreeMap::new();
    for result in results {
        grouped.entry(result.device_id).or_default().push(result);
    }
    for rows in grouped.values_mut() {
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    grouped
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (Bessel's correction); 0 with fewer than two
/// points
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
