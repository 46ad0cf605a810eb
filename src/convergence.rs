//! Convergence estimation from loss trajectories.
//!
//! Fits `ln(loss + eps)` against the epoch index by ordinary least squares
//! over the most recent losses. The negated slope is the convergence rate;
//! a positive rate means the loss is decaying exponentially.

use serde::{Deserialize, Serialize};

use crate::stats;

/// Upper bound reported for the epochs-to-target estimate.
pub const MAX_EPOCHS_ESTIMATE: f64 = 1000.0;

/// Quality of the recent loss curve, from its coefficient of variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    /// CV below 0.01
    Excellent,
    /// CV below 0.05
    Good,
    /// CV below 0.1
    Fair,
    /// Anything noisier
    Poor,
}

impl QualityTier {
    /// Classifies a coefficient of variation.
    pub fn from_cv(cv: f64) -> Self {
        if cv < 0.01 {
            Self::Excellent
        } else if cv < 0.05 {
            Self::Good
        } else if cv < 0.1 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Excellent => write!(f, "excellent"),
            Self::Good => write!(f, "good"),
            Self::Fair => write!(f, "fair"),
            Self::Poor => write!(f, "poor"),
        }
    }
}

/// Result of a convergence analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceAnalysis {
    /// Exponential decay rate of the loss (positive = converging).
    pub rate: f64,
    /// Whether `rate` is positive.
    pub is_converging: bool,
    /// Epochs to reach 95% of the best loss; infinite when not converging.
    pub estimated_epochs_to_target: f64,
    /// Noise level of the recent loss curve.
    pub quality_tier: QualityTier,
    /// Exactly one recommendation.
    pub recommendations: Vec<String>,
}

/// Log-linear convergence estimator.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceAnalyzer {
    /// Minimum number of losses before fitting.
    pub min_points: usize,
    /// Number of recent losses used for the fit.
    pub fit_window: usize,
    /// Number of recent losses used for the quality tier.
    pub quality_window: usize,
    /// Fraction of the best loss used as the target.
    pub target_fraction: f64,
    /// Projections above this many epochs count as slow.
    pub slow_epochs: f64,
    /// Offset added before taking logarithms.
    pub epsilon: f64,
}

impl Default for ConvergenceAnalyzer {
    fn default() -> Self {
        Self {
            min_points: 5,
            fit_window: 20,
            quality_window: 10,
            target_fraction: 0.95,
            slow_epochs: 100.0,
            epsilon: 1e-8,
        }
    }
}

impl ConvergenceAnalyzer {
    /// Analyzer with the default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes a loss trajectory, oldest first.
    ///
    /// Non-finite losses are skipped. Too few finite losses is not an error:
    /// the result reports no convergence with an insufficient-data
    /// recommendation.
    pub fn analyze(&self, losses: &[f64]) -> ConvergenceAnalysis {
        let losses = stats::finite(losses);
        let losses = losses.as_slice();
        let quality_tier = self.quality_tier(losses);

        if losses.len() < self.min_points {
            return ConvergenceAnalysis {
                rate: 0.0,
                is_converging: false,
                estimated_epochs_to_target: f64::INFINITY,
                quality_tier,
                recommendations: vec![format!(
                    "Insufficient data for convergence analysis ({} of {} epochs recorded).",
                    losses.len(),
                    self.min_points
                )],
            };
        }

        let recent = stats::tail(losses, self.fit_window);
        let log_losses: Vec<f64> = recent.iter().map(|&l| (l + self.epsilon).ln()).collect();
        let rate = -stats::ols_slope(&log_losses);
        let is_converging = rate > 0.0;

        let estimated_epochs_to_target = if is_converging {
            self.epochs_to_target(losses, rate)
        } else {
            f64::INFINITY
        };

        let recommendation = if !is_converging {
            "Loss is not converging; reduce the learning rate or revisit the model and data pipeline."
                .to_string()
        } else if estimated_epochs_to_target > self.slow_epochs {
            format!(
                "Convergence is slow (~{:.0} epochs to target); consider increasing the learning rate or using a schedule.",
                estimated_epochs_to_target
            )
        } else if quality_tier == QualityTier::Poor {
            "Loss curve is noisy; consider a larger batch size or a smaller learning rate."
                .to_string()
        } else {
            format!(
                "Training is converging well (rate {:.4}, ~{:.0} epochs to target).",
                rate, estimated_epochs_to_target
            )
        };

        tracing::debug!(
            rate,
            is_converging,
            epochs = estimated_epochs_to_target,
            tier = %quality_tier,
            "Convergence analysis"
        );

        ConvergenceAnalysis {
            rate,
            is_converging,
            estimated_epochs_to_target,
            quality_tier,
            recommendations: vec![recommendation],
        }
    }

    fn epochs_to_target(&self, losses: &[f64], rate: f64) -> f64 {
        let best = losses.iter().copied().fold(f64::INFINITY, f64::min);
        let current = losses.last().copied().unwrap_or(best);
        let target = self.target_fraction * best;

        let needed = (((target + self.epsilon) / (current + self.epsilon)).ln() / rate).abs();
        if needed.is_finite() {
            needed.min(MAX_EPOCHS_ESTIMATE)
        } else {
            MAX_EPOCHS_ESTIMATE
        }
    }

    fn quality_tier(&self, losses: &[f64]) -> QualityTier {
        stats::coefficient_of_variation(stats::tail(losses, self.quality_window))
            .map(QualityTier::from_cv)
            .unwrap_or(QualityTier::Poor)
    }
}

/// Convenience wrapper using default parameters.
pub fn analyze(losses: &[f64]) -> ConvergenceAnalysis {
    ConvergenceAnalyzer::default().analyze(losses)
}
