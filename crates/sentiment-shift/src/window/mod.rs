//! Per-user sliding window and online-retrained outlier models.
//!
//! ```text
//!   update(raw, combined)
//!     ├─► raw ring      (capacity)
//!     ├─► combined ring (capacity) ──► last shift ──► is_anomalous
//!     └─► training buffer ──► first differences ──► fit forest + svm
//! ```

pub mod ring;

pub use ring::ScoreRing;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::WindowConfig;
use crate::detector::{DetectionContext, DetectionMethod, Shift};
use crate::error::{ShiftError, ShiftResult};
use crate::models::{IsolationForest, OneClassSvm, OutlierModel};
use crate::types::{Attribution, Averages};

/// Lifecycle of a window. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Fewer than two scores; nothing can be flagged.
    Cold,
    /// Rule-based detection only.
    Warming,
    /// At least one successful model fit.
    Trained,
}

impl std::fmt::Display for WindowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cold => write!(f, "cold"),
            Self::Warming => write!(f, "warming"),
            Self::Trained => write!(f, "trained"),
        }
    }
}

/// Counters for a single window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub updates: u64,
    pub retrains: u64,
    pub failed_retrains: u64,
    pub training_len: usize,
}

/// One user's recent sentiment history and outlier models.
pub struct SentimentWindow {
    config: WindowConfig,
    raw: ScoreRing,
    combined: ScoreRing,
    training: VecDeque<f64>,
    forest: Box<dyn OutlierModel>,
    boundary: Box<dyn OutlierModel>,
    trained: bool,
    stats: WindowStats,
}

impl SentimentWindow {
    /// Window with the built-in isolation forest and one-class SVM.
    pub fn new(config: WindowConfig) -> Self {
        let forest = Box::new(IsolationForest::new(config.forest.clone()));
        let boundary = Box::new(OneClassSvm::new(config.boundary.clone()));
        Self::with_models(config, forest, boundary)
    }

    /// Window with caller-supplied models.
    pub fn with_models(
        config: WindowConfig,
        forest: Box<dyn OutlierModel>,
        boundary: Box<dyn OutlierModel>,
    ) -> Self {
        Self {
            raw: ScoreRing::new(config.capacity),
            combined: ScoreRing::new(config.capacity),
            training: VecDeque::new(),
            forest,
            boundary,
            trained: false,
            stats: WindowStats::default(),
            config,
        }
    }

    /// Record one message's scores and retrain when due.
    pub fn update(&mut self, raw: f64, combined: f64) {
        self.raw.push(raw);
        self.combined.push(combined);
        self.training.push_back(combined);
        if let Some(cap) = self.config.training_capacity {
            while self.training.len() > cap {
                self.training.pop_front();
            }
        }
        self.stats.updates += 1;

        let threshold = self.config.retrain_threshold;
        if self.training.len() >= threshold
            && self
                .config
                .cadence
                .is_due(self.stats.updates, threshold as u64)
        {
            if let Err(e) = self.train_models() {
                tracing::warn!(
                    error = %e,
                    updates = self.stats.updates,
                    trained = self.trained,
                    "retrain failed, keeping previous models"
                );
            }
        }
    }

    /// Fit both models on the first differences of the training buffer.
    ///
    /// Returns `Ok(false)` without touching the models when fewer than two
    /// scores are buffered.
    pub fn train_models(&mut self) -> ShiftResult<bool> {
        if self.training.len() < 2 {
            return Ok(false);
        }

        let diffs: Vec<f64> = self
            .training
            .iter()
            .zip(self.training.iter().skip(1))
            .map(|(prev, next)| next - prev)
            .collect();

        let result = match diffs.iter().find(|d| !d.is_finite()) {
            Some(bad) => Err(ShiftError::NonFiniteScore(*bad)),
            None => self
                .forest
                .fit(&diffs)
                .and_then(|_| self.boundary.fit(&diffs)),
        };

        match result {
            Ok(()) => {
                self.trained = true;
                self.stats.retrains += 1;
                tracing::debug!(
                    samples = diffs.len(),
                    retrains = self.stats.retrains,
                    "outlier models refit"
                );
                Ok(true)
            }
            Err(e) => {
                self.stats.failed_retrains += 1;
                Err(e)
            }
        }
    }

    /// Decide whether the latest step is anomalous under `threshold`.
    pub fn is_anomalous(&self, threshold: f64) -> (bool, Attribution) {
        let Some(shift) = self.last_shift() else {
            return (false, Attribution::default());
        };

        let ctx = DetectionContext {
            shift,
            threshold,
            trained: self.trained,
            forest: self.forest.as_ref(),
            boundary: self.boundary.as_ref(),
        };
        let attribution = Attribution::from_fn(|method: DetectionMethod| method.evaluate(&ctx));
        (attribution.any(), attribution)
    }

    pub fn averages(&self) -> Averages {
        Averages {
            raw_avg: self.raw.mean(),
            combined_avg: self.combined.mean(),
        }
    }

    pub fn state(&self) -> WindowState {
        if self.trained {
            WindowState::Trained
        } else if self.combined.len() >= 2 {
            WindowState::Warming
        } else {
            WindowState::Cold
        }
    }

    /// The two most recent combined scores, once there are two.
    pub fn last_shift(&self) -> Option<Shift> {
        let current = self.combined.nth_back(0)?;
        let previous = self.combined.nth_back(1)?;
        Some(Shift::new(previous, current))
    }

    pub fn raw_scores(&self) -> Vec<f64> {
        self.raw.to_vec()
    }

    pub fn combined_scores(&self) -> Vec<f64> {
        self.combined.to_vec()
    }

    pub fn training_len(&self) -> usize {
        self.training.len()
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            training_len: self.training.len(),
            ..self.stats
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }
}

impl Default for SentimentWindow {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}

impl std::fmt::Debug for SentimentWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentWindow")
            .field("state", &self.state())
            .field("combined", &self.combined.to_vec())
            .field("training_len", &self.training.len())
            .field("forest", &self.forest.name())
            .field("boundary", &self.boundary.name())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrainCadence;
    use crate::models::Verdict;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Model with a fixed verdict that counts its fits.
    struct Fixed {
        verdict: Verdict,
        fail: bool,
        fits: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn boxed(verdict: Verdict) -> (Box<dyn OutlierModel>, Arc<AtomicUsize>) {
            let fits = Arc::new(AtomicUsize::new(0));
            let model = Fixed {
                verdict,
                fail: false,
                fits: fits.clone(),
            };
            (Box::new(model), fits)
        }

        fn failing() -> Box<dyn OutlierModel> {
            Box::new(Fixed {
                verdict: Verdict::Outlier,
                fail: true,
                fits: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    impl OutlierModel for Fixed {
        fn fit(&mut self, _: &[f64]) -> ShiftResult<()> {
            if self.fail {
                return Err(ShiftError::ModelFit {
                    model: "fixed".into(),
                    reason: "configured to fail".into(),
                });
            }
            self.fits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn predict(&self, _: f64) -> Verdict {
            self.verdict
        }
        fn is_fitted(&self) -> bool {
            true
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn config(capacity: usize, retrain_threshold: usize) -> WindowConfig {
        WindowConfig {
            capacity,
            retrain_threshold,
            ..WindowConfig::default()
        }
    }

    #[test]
    fn rings_are_bounded() {
        let mut w = SentimentWindow::default();
        for i in 0..25 {
            w.update(i as f64, i as f64 * 2.0);
        }
        let raw = w.raw_scores();
        assert_eq!(raw.len(), 10);
        assert_eq!(raw.first(), Some(&15.0));
        assert_eq!(raw.last(), Some(&24.0));
        assert_eq!(w.combined_scores().len(), 10);
        assert_eq!(w.training_len(), 25);
    }

    #[test]
    fn cold_window_is_never_anomalous() {
        let mut w = SentimentWindow::default();
        assert_eq!(w.is_anomalous(0.0), (false, Attribution::default()));
        assert_eq!(w.state(), WindowState::Cold);
        w.update(0.0, 100.0);
        assert_eq!(w.is_anomalous(0.0), (false, Attribution::default()));
        assert_eq!(w.state(), WindowState::Cold);
    }

    #[test]
    fn scenario_rule_fires_on_large_jump() {
        let mut w = SentimentWindow::new(config(3, 15));
        w.update(0.0, 0.0);
        w.update(0.1, 0.1);
        let (flag, attr) = w.is_anomalous(0.5);
        assert!(!flag);
        assert!(!attr.any());

        w.update(0.9, 0.9);
        let (flag, attr) = w.is_anomalous(0.5);
        assert!(flag);
        assert_eq!(
            attr,
            Attribution {
                rule_based: true,
                ml_based_iforest: false,
                ml_based_svm: false,
            }
        );
        let shift = w.last_shift().unwrap();
        assert!((shift.delta() - 0.8).abs() < 1e-12);
        assert_eq!(w.state(), WindowState::Warming);
    }

    #[test]
    fn rule_is_strict_and_symmetric() {
        let mut w = SentimentWindow::default();
        w.update(0.0, 0.25);
        w.update(0.0, -0.25);
        assert!(!w.is_anomalous(0.5).0);
        assert!(w.is_anomalous(0.49).0);
    }

    #[test]
    fn untrained_models_stay_silent() {
        let (forest, _) = Fixed::boxed(Verdict::Outlier);
        let (boundary, _) = Fixed::boxed(Verdict::Outlier);
        let mut w = SentimentWindow::with_models(WindowConfig::default(), forest, boundary);
        for i in 0..14 {
            w.update(0.0, if i % 2 == 0 { 0.0 } else { 0.01 });
        }
        let (flag, attr) = w.is_anomalous(0.5);
        assert!(!flag);
        assert!(!attr.ml_based_iforest && !attr.ml_based_svm);
    }

    #[test]
    fn first_retrain_on_threshold_update() {
        let (forest, forest_fits) = Fixed::boxed(Verdict::Inlier);
        let (boundary, boundary_fits) = Fixed::boxed(Verdict::Inlier);
        let mut w = SentimentWindow::with_models(WindowConfig::default(), forest, boundary);
        for _ in 0..14 {
            w.update(0.0, 0.1);
        }
        assert!(!w.is_trained());
        assert_eq!(forest_fits.load(Ordering::SeqCst), 0);

        w.update(0.0, 0.1);
        assert!(w.is_trained());
        assert_eq!(w.state(), WindowState::Trained);
        assert_eq!(forest_fits.load(Ordering::SeqCst), 1);
        assert_eq!(boundary_fits.load(Ordering::SeqCst), 1);

        // Every later update refits under the default cadence.
        w.update(0.0, 0.1);
        assert_eq!(forest_fits.load(Ordering::SeqCst), 2);
        assert_eq!(w.stats().retrains, 2);
    }

    #[test]
    fn every_k_cadence_limits_refits() {
        let (forest, fits) = Fixed::boxed(Verdict::Inlier);
        let (boundary, _) = Fixed::boxed(Verdict::Inlier);
        let cfg = WindowConfig {
            cadence: RetrainCadence::Every { updates: 5 },
            ..WindowConfig::default()
        };
        let mut w = SentimentWindow::with_models(cfg, forest, boundary);
        for _ in 0..30 {
            w.update(0.0, 0.0);
        }
        // updates 15, 20, 25, 30
        assert_eq!(fits.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn attribution_is_or_of_all_methods() {
        for rule in [false, true] {
            for iforest in [false, true] {
                for svm in [false, true] {
                    let verdict = |v: bool| if v { Verdict::Outlier } else { Verdict::Inlier };
                    let (forest, _) = Fixed::boxed(verdict(iforest));
                    let (boundary, _) = Fixed::boxed(verdict(svm));
                    let mut w = SentimentWindow::with_models(config(10, 2), forest, boundary);
                    w.update(0.0, 0.0);
                    w.update(0.0, if rule { 0.9 } else { 0.1 });
                    assert!(w.is_trained());

                    let (flag, attr) = w.is_anomalous(0.5);
                    assert_eq!(flag, rule || iforest || svm);
                    assert_eq!(attr.rule_based, rule);
                    assert_eq!(attr.ml_based_iforest, iforest);
                    assert_eq!(attr.ml_based_svm, svm);
                }
            }
        }
    }

    #[test]
    fn failed_retrain_keeps_state() {
        let (forest, _) = Fixed::boxed(Verdict::Outlier);
        let mut w = SentimentWindow::with_models(config(10, 2), forest, Fixed::failing());
        w.update(0.0, 0.0);
        w.update(0.0, 0.1);
        assert!(!w.is_trained());
        assert_eq!(w.stats().failed_retrains, 1);
        assert!(!w.is_anomalous(0.5).1.ml_based_iforest);
        assert!(w.train_models().is_err());
        assert_eq!(w.stats().failed_retrains, 2);
    }

    #[test]
    fn non_finite_differences_are_rejected() {
        let (forest, fits) = Fixed::boxed(Verdict::Inlier);
        let (boundary, _) = Fixed::boxed(Verdict::Inlier);
        let mut w = SentimentWindow::with_models(config(10, 2), forest, boundary);
        w.update(0.0, 0.0);
        w.update(0.0, f64::INFINITY);
        assert!(!w.is_trained());
        assert_eq!(fits.load(Ordering::SeqCst), 0);
        assert!(matches!(
            w.train_models(),
            Err(ShiftError::NonFiniteScore(_))
        ));
    }

    #[test]
    fn train_models_needs_two_scores() {
        let mut w = SentimentWindow::default();
        assert!(!w.train_models().unwrap());
        w.update(0.0, 0.3);
        assert!(!w.train_models().unwrap());
        assert!(!w.is_trained());
    }

    #[test]
    fn training_buffer_survives_retrains_and_honours_cap() {
        let cfg = WindowConfig {
            retrain_threshold: 4,
            training_capacity: Some(6),
            ..config(3, 4)
        };
        let (forest, _) = Fixed::boxed(Verdict::Inlier);
        let (boundary, _) = Fixed::boxed(Verdict::Inlier);
        let mut w = SentimentWindow::with_models(cfg, forest, boundary);
        for i in 0..5 {
            w.update(0.0, i as f64);
        }
        assert_eq!(w.training_len(), 5);
        for i in 0..5 {
            w.update(0.0, i as f64);
        }
        assert_eq!(w.training_len(), 6);
        assert_eq!(w.combined_scores().len(), 3);
    }

    #[test]
    fn averages_follow_rings() {
        let mut w = SentimentWindow::new(config(2, 15));
        assert_eq!(w.averages(), Averages::default());
        w.update(1.0, 0.0);
        w.update(2.0, 0.5);
        w.update(3.0, 1.0);
        let avg = w.averages();
        assert!((avg.raw_avg - 2.5).abs() < 1e-12);
        assert!((avg.combined_avg - 0.75).abs() < 1e-12);
    }

    #[test]
    fn flat_history_stays_quiet_after_training() {
        let mut w = SentimentWindow::default();
        for _ in 0..16 {
            w.update(0.0, 0.0);
        }
        assert!(w.is_trained());
        assert_eq!(w.is_anomalous(0.5), (false, Attribution::default()));

        w.update(0.0, 0.0);
        assert!(!w.is_anomalous(0.5).0);
    }

    #[test]
    fn boundary_flags_unseen_jump() {
        let cfg = WindowConfig {
            cadence: RetrainCadence::Every { updates: 100 },
            ..WindowConfig::default()
        };
        let mut w = SentimentWindow::new(cfg);
        for i in 0..20 {
            w.update(0.0, if i % 2 == 0 { 0.0 } else { 0.01 });
        }
        assert!(w.is_trained());
        assert_eq!(w.stats().retrains, 1);

        w.update(0.0, 2.0);
        let (flag, attr) = w.is_anomalous(5.0);
        assert!(flag);
        assert!(!attr.rule_based);
        assert!(attr.ml_based_svm);
    }
}
