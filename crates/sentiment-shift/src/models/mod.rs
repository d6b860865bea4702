//! Unsupervised one-dimensional outlier models.
//!
//! Both models are refit from scratch on every `fit` call and label new points
//! as inliers or outliers. A failed fit leaves the previously fitted state in
//! place.
//!
//! ```text
//!   first differences ──► IsolationForest ──► score − offset < 0  ⇒ Outlier
//!                     └─► OneClassSvm     ──► Σ αᵢK(xᵢ,x) − ρ ≤ 0 ⇒ Outlier
//! ```

pub mod boundary;
pub mod forest;

pub use boundary::OneClassSvm;
pub use forest::IsolationForest;

use serde::{Deserialize, Serialize};

use crate::error::{ShiftError, ShiftResult};

/// Label a model assigns to a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Inlier,
    Outlier,
}

impl Verdict {
    pub fn is_outlier(&self) -> bool {
        matches!(self, Self::Outlier)
    }
}

/// Pluggable outlier model.
///
/// `predict` must return [`Verdict::Inlier`] when the model has never been
/// fitted or when given a non-finite value.
pub trait OutlierModel: Send {
    /// Refit on the given samples, discarding previous state on success.
    fn fit(&mut self, samples: &[f64]) -> ShiftResult<()>;

    /// Classify a single point.
    fn predict(&self, value: f64) -> Verdict;

    fn is_fitted(&self) -> bool;

    /// Name of the model (for logging and errors).
    fn name(&self) -> &str;
}

/// Reject empty or non-finite training data, and data whose spread overflows.
pub(crate) fn check_samples(model: &str, samples: &[f64]) -> ShiftResult<()> {
    if samples.is_empty() {
        return Err(ShiftError::ModelFit {
            model: model.to_string(),
            reason: "no samples".into(),
        });
    }
    if let Some(bad) = samples.iter().find(|v| !v.is_finite()) {
        return Err(ShiftError::ModelFit {
            model: model.to_string(),
            reason: format!("non-finite sample {}", bad),
        });
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(max - min).is_finite() {
        return Err(ShiftError::ModelFit {
            model: model.to_string(),
            reason: format!("sample spread [{}, {}] overflows", min, max),
        });
    }
    Ok(())
}
