//! Device polling
//!
//! The poll loop and the in-memory state it maintains across cycles:
//! live status for concurrent readers and failure streaks for alerting.

mod r#loop;
mod status;
mod streaks;

pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder};
pub use status::LiveStatusTable;
pub use streaks::{FailureStreak, StreakTracker};
