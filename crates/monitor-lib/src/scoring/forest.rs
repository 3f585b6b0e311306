//! Seeded isolation forest
//!
//! Unsupervised outlier model refit from scratch every scoring cycle;
//! retraining per cycle trades CPU for simplicity and avoids stale-model
//! bugs. Scores follow the standard formulation s(x) = 2^(-E[h(x)]/c(psi)),
//! higher meaning more anomalous. A fixed RNG seed keeps cycles
//! reproducible.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Number of feature columns per row
pub const FEATURE_DIM: usize = 3;

const DEFAULT_TREE_COUNT: usize = 100;
const DEFAULT_SUBSAMPLE_SIZE: usize = 256;
const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Configuration for the outlier model
#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub tree_count: usize,
    /// Rows sampled per tree, capped by the data size
    pub subsample_size: usize,
    /// Assumed fraction of anomalous rows; sets the cutoff quantile used
    /// for the flagged-row count reported each cycle
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            tree_count: DEFAULT_TREE_COUNT,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            contamination: 0.15,
            seed: 42,
        }
    }
}

enum Node {
    Split {
        feature: usize,
        value: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// Isolation forest fitted on one cycle's feature matrix
pub struct IsolationForest {
    trees: Vec<Node>,
    /// c(psi) for the fitted subsample size
    expected_path: f64,
}

impl IsolationForest {
    /// Fit on a row-major feature matrix
    pub fn fit(rows: &[[f64; FEATURE_DIM]], config: &ForestConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let sample_size = config.subsample_size.min(rows.len()).max(1);
        let depth_cap = (sample_size as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..config.tree_count)
            .map(|_| {
                let sample = subsample(rows, sample_size, &mut rng);
                build_tree(&sample, 0, depth_cap, &mut rng)
            })
            .collect();

        Self {
            trees,
            expected_path: average_path_length(sample_size),
        }
    }

    /// Anomaly score in (0, 1]; higher = more anomalous
    pub fn score(&self, row: &[f64; FEATURE_DIM]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        if self.expected_path <= 0.0 {
            // Degenerate fit on a single row
            return 0.5;
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / self.expected_path)
    }

    pub fn scores(&self, rows: &[[f64; FEATURE_DIM]]) -> Vec<f64> {
        rows.iter().map(|row| self.score(row)).collect()
    }
}

fn subsample(
    rows: &[[f64; FEATURE_DIM]],
    sample_size: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<[f64; FEATURE_DIM]> {
    if rows.len() <= sample_size {
        return rows.to_vec();
    }
    // Partial Fisher-Yates over an index vector
    let mut indices: Vec<usize> = (0..rows.len()).collect();
    for i in 0..sample_size {
        let j = rng.gen_range(i..indices.len());
        indices.swap(i, j);
    }
    indices[..sample_size].iter().map(|&i| rows[i]).collect()
}

fn build_tree(
    data: &[[f64; FEATURE_DIM]],
    depth: usize,
    depth_cap: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    if depth >= depth_cap || data.len() <= 1 {
        return Node::Leaf { size: data.len() };
    }

    // Only features with spread can split the node
    let splittable: Vec<(usize, f64, f64)> = (0..FEATURE_DIM)
        .filter_map(|feature| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for row in data {
                min = min.min(row[feature]);
                max = max.max(row[feature]);
            }
            (max > min).then_some((feature, min, max))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: data.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let value = rng.gen_range(min..max);

    let (left_rows, right_rows): (Vec<[f64; FEATURE_DIM]>, Vec<[f64; FEATURE_DIM]>) =
        data.iter().copied().partition(|row| row[feature] < value);

    Node::Split {
        feature,
        value,
        left: Box::new(build_tree(&left_rows, depth + 1, depth_cap, rng)),
        right: Box::new(build_tree(&right_rows, depth + 1, depth_cap, rng)),
    }
}

fn path_length(node: &Node, row: &[f64; FEATURE_DIM], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            value,
            left,
            right,
        } => {
            if row[*feature] < *value {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over n points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            let harmonic = (n - 1.0).ln() + EULER_MASCHERONI;
            2.0 * harmonic - 2.0 * (n - 1.0) / n
        }
    }
}

/// Min-max normalize scores to [0, 1].
///
/// Degenerate inputs (fewer than two values, or zero range) normalize to
/// all zeros so a lone or uniform device set never divides by a zero
/// range.
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    if scores.len() < 2 {
        return vec![0.0; scores.len()];
    }
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= f64::EPSILON {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Raw-score cutoff above which a row falls into the assumed
/// contamination fraction of the sample
pub fn contamination_cutoff(scores: &[f64], contamination: f64) -> f64 {
    if scores.is_empty() {
        return f64::INFINITY;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let k = ((scores.len() as f64 * contamination).ceil() as usize)
        .clamp(1, sorted.len());
    sorted[k - 1]
}
