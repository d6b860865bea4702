//! Detection methods and the context they are evaluated against.
//!
//! The method set is closed: a rule on the absolute jump, and one method per
//! outlier model on the signed jump. [`Attribution::any`](crate::Attribution::any)
//! is the reducer that turns the three verdicts into a single flag.

use serde::{Deserialize, Serialize};

use crate::models::OutlierModel;

/// The most recent step in a window's combined scores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub previous: f64,
    pub current: f64,
}

impl Shift {
    pub fn new(previous: f64, current: f64) -> Self {
        Self { previous, current }
    }

    /// `current − previous`; this is what the outlier models see.
    pub fn signed(&self) -> f64 {
        self.current - self.previous
    }

    /// `|current − previous|`; this is what the rule compares and what records carry.
    pub fn delta(&self) -> f64 {
        self.signed().abs()
    }
}

/// Everything a detection method may look at.
pub struct DetectionContext<'a> {
    pub shift: Shift,
    pub threshold: f64,
    /// Whether the models have completed at least one successful fit.
    pub trained: bool,
    pub forest: &'a dyn OutlierModel,
    pub boundary: &'a dyn OutlierModel,
}

/// One way of deciding that a shift is anomalous.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Absolute jump strictly above the threshold.
    Rule,
    /// Isolation forest labels the signed jump an outlier.
    IsolationForest,
    /// One-class SVM labels the signed jump an outlier.
    OneClassSvm,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 3] = [
        DetectionMethod::Rule,
        DetectionMethod::IsolationForest,
        DetectionMethod::OneClassSvm,
    ];

    /// Attribution key reported for this method.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Rule => "rule_based",
            Self::IsolationForest => "ml_based_iforest",
            Self::OneClassSvm => "ml_based_svm",
        }
    }

    pub fn evaluate(&self, ctx: &DetectionContext<'_>) -> bool {
        match self {
            Self::Rule => ctx.shift.delta() > ctx.threshold,
            Self::IsolationForest => {
                ctx.trained && ctx.forest.predict(ctx.shift.signed()).is_outlier()
            }
            Self::OneClassSvm => {
                ctx.trained && ctx.boundary.predict(ctx.shift.signed()).is_outlier()
            }
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
