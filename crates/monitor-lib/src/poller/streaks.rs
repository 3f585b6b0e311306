//! Consecutive-failure bookkeeping
//!
//! Tracks per-device DOWN streaks and the alert-dedup flag. Mutated only
//! by the poll loop; in-memory only, since it merely gates alerting for
//! the current run.

use dashmap::DashMap;

/// Streak state for one device
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureStreak {
    pub consecutive_down: u32,
    /// Set once an alert has been sent for the current streak
    pub alerted: bool,
}

#[derive(Default)]
pub struct StreakTracker {
    entries: DashMap<i64, FailureStreak>,
}

impl StreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a DOWN result; returns the new consecutive count
    pub fn record_down(&self, device_id: i64) -> u32 {
        let mut entry = self.entries.entry(device_id).or_default();
        entry.consecutive_down += 1;
        entry.consecutive_down
    }

    /// Record an UP result: reset the count and clear the dedup flag so a
    /// later streak can alert again
    pub fn record_up(&self, device_id: i64) {
        if let Some(mut entry) = self.entries.get_mut(&device_id) {
            entry.consecutive_down = 0;
            entry.alerted = false;
        }
    }

    /// True when the streak has reached the threshold and no alert has
    /// gone out for it yet. Marks the streak as alerted, so each
    /// uninterrupted streak yields at most one true.
    pub fn should_alert(&self, device_id: i64, threshold: u32) -> bool {
        let mut entry = self.entries.entry(device_id).or_default();
        if entry.consecutive_down >= threshold && !entry.alerted {
            entry.alerted = true;
            true
        } else {
            false
        }
    }

    pub fn get(&self, device_id: i64) -> Option<FailureStreak> {
        self.entries.get(&device_id).map(|r| *r)
    }
}
