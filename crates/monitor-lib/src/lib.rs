//! Fleet monitor engine
//!
//! This crate provides the core functionality for:
//! - Concurrent reachability probing of a device fleet
//! - Live status and failure-streak tracking across poll cycles
//! - Risk scoring with rule-based overrides and an isolation forest
//! - Rolling baseline estimation over a slower window

pub mod alert;
pub mod models;
pub mod poller;
pub mod probe;
pub mod scoring;
pub mod store;

pub use models::*;
pub use poller::{LiveStatusTable, PollConfig, PollLoop, PollLoopBuilder, StreakTracker};
pub use scoring::{BaselineConfig, BaselineLoop, ScoringConfig, ScoringLoop};
