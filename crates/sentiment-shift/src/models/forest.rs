//! Isolation forest over scalar samples.
//!
//! Points that are separated from the rest by few random splits get short
//! average path lengths and therefore low scores. The decision offset is the
//! `contamination` percentile of the training scores, so roughly that fraction
//! of the training set itself is labelled as outliers.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

use crate::config::ForestConfig;
use crate::error::ShiftResult;

use super::{check_samples, OutlierModel, Verdict};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile (`q` in 0..=100).
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[derive(Clone, Debug)]
enum IsolationNode {
    Split {
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationNode {
    fn build(values: Vec<f64>, depth: usize, height_limit: usize, rng: &mut StdRng) -> Self {
        if depth >= height_limit || values.len() <= 1 {
            return Self::Leaf { size: values.len() };
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max <= min {
            return Self::Leaf { size: values.len() };
        }

        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<f64>, Vec<f64>) =
            values.into_iter().partition(|v| *v <= threshold);

        Self::Split {
            threshold,
            left: Box::new(Self::build(left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build(right, depth + 1, height_limit, rng)),
        }
    }

    fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Self::Leaf { size } => return depth + average_path_length(*size),
                Self::Split {
                    threshold,
                    left,
                    right,
                } => {
                    node = if value <= *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Seeded isolation forest.
///
/// Refitting with the same seed and data reproduces the same trees.
#[derive(Clone, Debug)]
pub struct IsolationForest {
    config: ForestConfig,
    trees: Vec<IsolationNode>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            sample_size: 0,
            offset: 0.0,
        }
    }

    /// Anomaly score in `[-1, 0)`; lower is more anomalous. `None` before fitting.
    pub fn score(&self, value: f64) -> Option<f64> {
        if self.trees.is_empty() {
            return None;
        }
        Some(Self::score_with(&self.trees, self.sample_size, value))
    }

    /// Decision offset placed at the contamination percentile.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    fn score_with(trees: &[IsolationNode], sample_size: usize, value: f64) -> f64 {
        let mean_depth =
            trees.iter().map(|t| t.path_length(value)).sum::<f64>() / trees.len() as f64;
        let norm = average_path_length(sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        -(2.0_f64).powf(-mean_depth / norm)
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(ForestConfig::default())
    }
}

impl OutlierModel for IsolationForest {
    fn fit(&mut self, samples: &[f64]) -> ShiftResult<()> {
        check_samples(self.name(), samples)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let n = samples.len();
        let sample_size = self.config.max_samples.clamp(1, n);
        let height_limit = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees: Vec<IsolationNode> = (0..self.config.trees.max(1))
            .map(|_| {
                let picked: Vec<f64> = index::sample(&mut rng, n, sample_size)
                    .into_iter()
                    .map(|i| samples[i])
                    .collect();
                IsolationNode::build(picked, 0, height_limit, &mut rng)
            })
            .collect();

        let scores: Vec<f64> = samples
            .iter()
            .map(|v| Self::score_with(&trees, sample_size, *v))
            .collect();

        self.offset = percentile(&scores, self.config.contamination * 100.0);
        self.trees = trees;
        self.sample_size = sample_size;
        Ok(())
    }

    fn predict(&self, value: f64) -> Verdict {
        if !value.is_finite() {
            return Verdict::Inlier;
        }
        match self.score(value) {
            Some(score) if score - self.offset < 0.0 => Verdict::Outlier,
            _ => Verdict::Inlier,
        }
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    fn name(&self) -> &str {
        "isolation_forest"
    }
}
