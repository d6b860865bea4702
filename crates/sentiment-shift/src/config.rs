//! Engine configuration.
//!
//! Every struct here is `Serialize + Deserialize` with `#[serde(default)]`, so a
//! partial TOML/JSON document only needs the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::error::{ShiftError, ShiftResult};

/// Default number of recent scores kept per user.
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// Training-buffer length at which the outlier models are first fit.
pub const DEFAULT_RETRAIN_THRESHOLD: usize = 15;

/// Default absolute score jump that trips the rule-based detector.
pub const DEFAULT_SHIFT_THRESHOLD: f64 = 0.5;

/// Default number of isolation trees.
pub const DEFAULT_FOREST_TREES: usize = 100;

/// Default per-tree subsample cap.
pub const DEFAULT_FOREST_MAX_SAMPLES: usize = 256;

/// Expected outlier fraction used to place the forest decision offset.
pub const DEFAULT_CONTAMINATION: f64 = 0.1;

/// Seed for the forest's random number generator.
pub const DEFAULT_FOREST_SEED: u64 = 42;

/// Default ν for the one-class SVM.
pub const DEFAULT_NU: f64 = 0.1;

/// SMO stopping tolerance.
pub const DEFAULT_SVM_TOLERANCE: f64 = 1e-3;

/// SMO iteration cap.
pub const DEFAULT_SVM_MAX_ITERATIONS: usize = 100_000;

// ── Retrain cadence ─────────────────────────────────────────────────────

/// When a warmed-up window refits its models.
///
/// All variants fit for the first time on the update that brings the training
/// buffer to `retrain_threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RetrainCadence {
    /// Refit on every update once the threshold is reached.
    EveryUpdate,
    /// Refit on the threshold update and then every `updates` updates.
    Every { updates: u64 },
    /// Refit when the update count is `threshold × 2^m`.
    Doubling,
}

impl Default for RetrainCadence {
    fn default() -> Self {
        Self::EveryUpdate
    }
}

impl RetrainCadence {
    /// Whether a refit is due after `updates` total updates.
    ///
    /// Callers check the training-buffer length against `threshold` first.
    pub fn is_due(&self, updates: u64, threshold: u64) -> bool {
        match *self {
            Self::EveryUpdate => true,
            Self::Every { updates: every } => {
                every <= 1 || updates.saturating_sub(threshold) % every == 0
            }
            Self::Doubling => {
                threshold > 0 && updates % threshold == 0 && (updates / threshold).is_power_of_two()
            }
        }
    }
}

impl std::fmt::Display for RetrainCadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EveryUpdate => write!(f, "every-update"),
            Self::Every { updates } => write!(f, "every:{}", updates),
            Self::Doubling => write!(f, "doubling"),
        }
    }
}

impl std::str::FromStr for RetrainCadence {
    type Err = ShiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "every-update" => Ok(Self::EveryUpdate),
            "doubling" => Ok(Self::Doubling),
            other => match other.strip_prefix("every:") {
                Some(n) => n
                    .parse::<u64>()
                    .map(|updates| Self::Every { updates })
                    .map_err(|_| ShiftError::InvalidConfig(format!("bad cadence interval: {}", n))),
                None => Err(ShiftError::InvalidConfig(format!(
                    "unknown cadence '{}' (expected every-update, every:K or doubling)",
                    other
                ))),
            },
        }
    }
}

// ── Model configuration ─────────────────────────────────────────────────

/// Isolation forest parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub trees: usize,
    pub max_samples: usize,
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            trees: DEFAULT_FOREST_TREES,
            max_samples: DEFAULT_FOREST_MAX_SAMPLES,
            contamination: DEFAULT_CONTAMINATION,
            seed: DEFAULT_FOREST_SEED,
        }
    }
}

/// RBF kernel width selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelWidth {
    /// γ = 1 / n_features.
    Auto,
    /// γ = 1 / (n_features · variance of the training set).
    Scale,
    /// Explicit γ.
    Fixed(f64),
}

impl Default for KernelWidth {
    fn default() -> Self {
        Self::Auto
    }
}

/// One-class SVM parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub nu: f64,
    pub kernel_width: KernelWidth,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            nu: DEFAULT_NU,
            kernel_width: KernelWidth::Auto,
            tolerance: DEFAULT_SVM_TOLERANCE,
            max_iterations: DEFAULT_SVM_MAX_ITERATIONS,
        }
    }
}

// ── Window / monitor configuration ──────────────────────────────────────

/// Configuration for a single user's window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Ring-buffer capacity for raw and combined scores.
    pub capacity: usize,
    /// Training-buffer length that triggers the first fit.
    pub retrain_threshold: usize,
    /// Refit cadence after the first fit.
    pub cadence: RetrainCadence,
    /// Optional cap on the training buffer (oldest evicted). `None` keeps everything.
    pub training_capacity: Option<usize>,
    pub forest: ForestConfig,
    pub boundary: BoundaryConfig,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_WINDOW_CAPACITY,
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            cadence: RetrainCadence::default(),
            training_capacity: None,
            forest: ForestConfig::default(),
            boundary: BoundaryConfig::default(),
        }
    }
}

impl WindowConfig {
    pub fn validate(&self) -> ShiftResult<()> {
        if self.capacity < 2 {
            return Err(ShiftError::InvalidConfig(format!(
                "window capacity must be at least 2, got {}",
                self.capacity
            )));
        }
        if self.retrain_threshold < 2 {
            return Err(ShiftError::InvalidConfig(format!(
                "retrain threshold must be at least 2, got {}",
                self.retrain_threshold
            )));
        }
        if let RetrainCadence::Every { updates: 0 } = self.cadence {
            return Err(ShiftError::InvalidConfig(
                "retrain cadence interval must be positive".into(),
            ));
        }
        if let Some(cap) = self.training_capacity {
            if cap < self.retrain_threshold {
                return Err(ShiftError::InvalidConfig(format!(
                    "training capacity {} is below retrain threshold {}",
                    cap, self.retrain_threshold
                )));
            }
        }
        if self.forest.trees == 0 || self.forest.max_samples == 0 {
            return Err(ShiftError::InvalidConfig(
                "forest needs at least one tree and one sample per tree".into(),
            ));
        }
        if !(self.forest.contamination > 0.0 && self.forest.contamination <= 0.5) {
            return Err(ShiftError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.forest.contamination
            )));
        }
        if !(self.boundary.nu > 0.0 && self.boundary.nu <= 1.0) {
            return Err(ShiftError::InvalidConfig(format!(
                "nu must be in (0, 1], got {}",
                self.boundary.nu
            )));
        }
        if let KernelWidth::Fixed(gamma) = self.boundary.kernel_width {
            if !(gamma.is_finite() && gamma > 0.0) {
                return Err(ShiftError::InvalidConfig(format!(
                    "kernel width must be positive, got {}",
                    gamma
                )));
            }
        }
        if !(self.boundary.tolerance > 0.0) || self.boundary.max_iterations == 0 {
            return Err(ShiftError::InvalidConfig(
                "svm tolerance and iteration cap must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration for a [`StreamMonitor`](crate::StreamMonitor).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Rule-based jump threshold passed to `is_anomalous`.
    pub threshold: f64,
    pub window: WindowConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SHIFT_THRESHOLD,
            window: WindowConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> ShiftResult<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ShiftError::InvalidConfig(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold
            )));
        }
        self.window.validate()
    }
}
