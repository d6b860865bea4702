//! One-class SVM with an RBF kernel over scalar samples.
//!
//! The dual
//!
//! ```text
//!   min ½ αᵀQα   s.t.  0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·l,   Qᵢⱼ = exp(−γ (xᵢ − xⱼ)²)
//! ```
//!
//! is solved by sequential minimal optimization on the maximal violating pair.
//! Kernel columns are computed on demand, so memory stays linear in the
//! training-set size.

use crate::config::{BoundaryConfig, KernelWidth};
use crate::error::{ShiftError, ShiftResult};

use super::{check_samples, OutlierModel, Verdict};

/// Floor for a non-positive second-order coefficient.
const TAU: f64 = 1e-12;

#[derive(Clone, Debug)]
struct SupportVector {
    x: f64,
    alpha: f64,
}

/// One-class SVM (ν formulation).
#[derive(Clone, Debug)]
pub struct OneClassSvm {
    config: BoundaryConfig,
    support: Vec<SupportVector>,
    gamma: f64,
    rho: f64,
    /// Set when every training sample had the same value.
    constant: Option<f64>,
    fitted: bool,
}

impl OneClassSvm {
    pub fn new(config: BoundaryConfig) -> Self {
        Self {
            config,
            support: Vec::new(),
            gamma: 0.0,
            rho: 0.0,
            constant: None,
            fitted: false,
        }
    }

    /// Signed distance to the boundary, `Σ αᵢ K(xᵢ, x) − ρ`. `None` before fitting.
    pub fn decision(&self, value: f64) -> Option<f64> {
        if !self.fitted {
            return None;
        }
        let sum: f64 = self
            .support
            .iter()
            .map(|sv| sv.alpha * rbf(self.gamma, sv.x, value))
            .sum();
        Some(sum - self.rho)
    }

    pub fn support_vector_count(&self) -> usize {
        self.support.len()
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    fn resolve_gamma(&self, samples: &[f64]) -> f64 {
        match self.config.kernel_width {
            KernelWidth::Auto => 1.0,
            KernelWidth::Scale => {
                let n = samples.len() as f64;
                let mean = samples.iter().sum::<f64>() / n;
                let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / var
                } else {
                    1.0
                }
            }
            KernelWidth::Fixed(gamma) => gamma,
        }
    }
}

impl Default for OneClassSvm {
    fn default() -> Self {
        Self::new(BoundaryConfig::default())
    }
}

fn rbf(gamma: f64, a: f64, b: f64) -> f64 {
    let d = a - b;
    (-gamma * d * d).exp()
}

// ── Solver ──────────────────────────────────────────────────────────────

struct Solution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

fn solve(samples: &[f64], gamma: f64, config: &BoundaryConfig) -> Solution {
    let l = samples.len();
    let column = |i: usize| -> Vec<f64> {
        let xi = samples[i];
        samples.iter().map(|xj| rbf(gamma, xi, *xj)).collect()
    };

    // Feasible start: the first ⌊νl⌋ multipliers at the upper bound.
    let total = config.nu * l as f64;
    let whole = (total.floor() as usize).min(l);
    let mut alpha = vec![0.0; l];
    for a in alpha.iter_mut().take(whole) {
        *a = 1.0;
    }
    if whole < l {
        alpha[whole] = total - whole as f64;
    }

    // G = Qα
    let mut grad = vec![0.0; l];
    for (i, a) in alpha.iter().enumerate() {
        if *a > 0.0 {
            for (g, q) in grad.iter_mut().zip(column(i)) {
                *g += a * q;
            }
        }
    }

    let mut iterations = 0;
    while iterations < config.max_iterations {
        // i: most negative gradient among multipliers that can grow.
        // j: largest gradient among multipliers that can shrink.
        let mut i = None;
        let mut g_max = f64::NEG_INFINITY;
        let mut j = None;
        let mut g_max2 = f64::NEG_INFINITY;
        for t in 0..l {
            if alpha[t] < 1.0 && -grad[t] >= g_max {
                g_max = -grad[t];
                i = Some(t);
            }
            if alpha[t] > 0.0 && grad[t] >= g_max2 {
                g_max2 = grad[t];
                j = Some(t);
            }
        }
        let (Some(i), Some(j)) = (i, j) else { break };
        if g_max + g_max2 < config.tolerance || i == j {
            break;
        }
        iterations += 1;

        let q_i = column(i);
        let q_j = column(j);
        let mut quad = q_i[i] + q_j[j] - 2.0 * q_i[j];
        if quad <= 0.0 {
            quad = TAU;
        }

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let sum = old_i + old_j;
        let delta = (grad[i] - grad[j]) / quad;
        let mut a_i = old_i - delta;
        let mut a_j = old_j + delta;

        if sum > 1.0 {
            if a_i > 1.0 {
                a_i = 1.0;
                a_j = sum - 1.0;
            }
        } else if a_j < 0.0 {
            a_j = 0.0;
            a_i = sum;
        }
        if sum > 1.0 {
            if a_j > 1.0 {
                a_j = 1.0;
                a_i = sum - 1.0;
            }
        } else if a_i < 0.0 {
            a_i = 0.0;
            a_j = sum;
        }

        alpha[i] = a_i;
        alpha[j] = a_j;
        let (d_i, d_j) = (a_i - old_i, a_j - old_j);
        for t in 0..l {
            grad[t] += q_i[t] * d_i + q_j[t] * d_j;
        }
    }

    Solution {
        rho: offset(&alpha, &grad),
        alpha,
        iterations,
    }
}

/// ρ from the KKT conditions: the mean gradient over free multipliers, or the
/// midpoint of the feasible interval when every multiplier sits on a bound.
fn offset(alpha: &[f64], grad: &[f64]) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free = 0usize;
    let mut free_sum = 0.0;

    for (a, g) in alpha.iter().zip(grad) {
        if *a >= 1.0 {
            lower = lower.max(*g);
        } else if *a <= 0.0 {
            upper = upper.min(*g);
        } else {
            free += 1;
            free_sum += g;
        }
    }

    if free > 0 {
        free_sum / free as f64
    } else if upper.is_finite() && lower.is_finite() {
        (upper + lower) / 2.0
    } else if upper.is_finite() {
        upper
    } else if lower.is_finite() {
        lower
    } else {
        0.0
    }
}

impl OutlierModel for OneClassSvm {
    fn fit(&mut self, samples: &[f64]) -> ShiftResult<()> {
        check_samples(self.name(), samples)?;

        let gamma = self.resolve_gamma(samples);
        if !(gamma.is_finite() && gamma > 0.0) {
            return Err(ShiftError::ModelFit {
                model: self.name().to_string(),
                reason: format!("invalid kernel width {}", gamma),
            });
        }

        let solution = solve(samples, gamma, &self.config);
        if solution.iterations >= self.config.max_iterations {
            tracing::warn!(
                iterations = solution.iterations,
                samples = samples.len(),
                "one-class svm hit the iteration cap before converging"
            );
        }
        if !solution.rho.is_finite() {
            return Err(ShiftError::ModelFit {
                model: self.name().to_string(),
                reason: "solver produced a non-finite offset".into(),
            });
        }

        self.support = samples
            .iter()
            .zip(&solution.alpha)
            .filter(|(_, a)| **a > 0.0)
            .map(|(x, a)| SupportVector { x: *x, alpha: *a })
            .collect();
        self.gamma = gamma;
        self.rho = solution.rho;
        self.constant = samples
            .iter()
            .all(|v| *v == samples[0])
            .then_some(samples[0]);
        self.fitted = true;
        Ok(())
    }

    /// With zero-variance training data every multiplier sits on a bound and
    /// the training value lands exactly on the boundary; that value is an inlier.
    fn predict(&self, value: f64) -> Verdict {
        if !value.is_finite() || self.constant == Some(value) {
            return Verdict::Inlier;
        }
        match self.decision(value) {
            Some(d) if d <= 0.0 => Verdict::Outlier,
            _ => Verdict::Inlier,
        }
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }

    fn name(&self) -> &str {
        "one_class_svm"
    }
}
