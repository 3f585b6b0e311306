//! Monitor configuration

use anyhow::Result;
use serde::Deserialize;

/// Monitor configuration, loaded from `MONITOR_`-prefixed environment
/// variables with sensible defaults
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds to sleep between full poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Devices probed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds to pause between batches within a cycle
    #[serde(default = "default_batch_pause")]
    pub batch_pause_secs: u64,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Consecutive DOWNs before a DeviceDown alert
    #[serde(default = "default_alert_streak_threshold")]
    pub alert_streak_threshold: u32,

    /// Scoring lookback window in minutes
    #[serde(default = "default_scoring_window")]
    pub scoring_window_mins: i64,

    /// Baseline lookback window in minutes
    #[serde(default = "default_baseline_window")]
    pub baseline_window_mins: i64,

    /// Seconds between scoring cycles
    #[serde(default = "default_scoring_period")]
    pub scoring_period_secs: u64,

    /// Seconds between baseline refreshes
    #[serde(default = "default_baseline_period")]
    pub baseline_period_secs: u64,

    /// Contamination fraction assumed by the outlier model
    #[serde(default = "default_contamination")]
    pub contamination: f64,

    /// Seed for the outlier model, fixed for reproducible scoring
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Probe results older than this many days are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// JSON file seeding the device registry
    #[serde(default = "default_devices_file")]
    pub devices_file: String,
}

fn default_poll_interval() -> u64 {
    2
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_pause() -> u64 {
    2
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_alert_streak_threshold() -> u32 {
    5
}

fn default_scoring_window() -> i64 {
    5
}

fn default_baseline_window() -> i64 {
    60
}

fn default_scoring_period() -> u64 {
    60
}

fn default_baseline_period() -> u64 {
    300
}

fn default_contamination() -> f64 {
    0.15
}

fn default_random_seed() -> u64 {
    42
}

fn default_retention_days() -> i64 {
    15
}

fn default_devices_file() -> String {
    "devices.json".to_string()
}

impl MonitorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MONITOR"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_else(|_| MonitorConfig {
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            batch_pause_secs: default_batch_pause(),
            probe_timeout_ms: default_probe_timeout(),
            alert_streak_threshold: default_alert_streak_threshold(),
            scoring_window_mins: default_scoring_window(),
            baseline_window_mins: default_baseline_window(),
            scoring_period_secs: default_scoring_period(),
            baseline_period_secs: default_baseline_period(),
            contamination: default_contamination(),
            random_seed: default_random_seed(),
            retention_days: default_retention_days(),
            devices_file: default_devices_file(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = MonitorConfig::load().unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.probe_timeout_ms, 1000);
        assert_eq!(config.alert_streak_threshold, 5);
        assert_eq!(config.scoring_window_mins, 5);
        assert_eq!(config.baseline_window_mins, 60);
        assert_eq!(config.contamination, 0.15);
        assert_eq!(config.random_seed, 42);
    }
}
