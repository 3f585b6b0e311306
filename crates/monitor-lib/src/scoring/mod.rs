//! Anomaly scoring pipeline
//!
//! Turns recent telemetry into bounded per-device risk scores: feature
//! aggregation, a seeded isolation forest, rule-based overrides, and the
//! slow rolling baseline.

mod baseline;
mod features;
mod forest;
mod scorer;

pub use baseline::{BaselineConfig, BaselineLoop};
pub use features::extract_features;
pub use forest::{normalize_scores, ForestConfig, IsolationForest, FEATURE_DIM};
pub use scorer::{ScoringConfig, ScoringLoop};
