//! Gradient anomaly detection over a lookback window.
//!
//! Four independent checks run over the last `lookback_epochs` entries of a
//! [`GradientHistory`]:
//!
//! - **Vanishing**: any epoch with `norm < vanishing` flags the statKey
//! - **Exploding**: any epoch with `norm > exploding` flags the statKey
//! - **High variance**: variance of a statKey's norm series across the window
//!   exceeds `variance_max` (needs at least 2 points)
//! - **Stagnation**: every epoch-to-epoch norm change of a layer stays below
//!   `vanishing * 10` (needs a window of at least 2 epochs)
//!
//! Detection is pure and total. Non-finite or negative entries are skipped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::history::{split_stat_key, GradientHistory, HistoryEntry};
use crate::stats;

/// Recommendation emitted when the history is empty.
pub const NO_DATA_RECOMMENDATION: &str =
    "No gradient data available yet; record at least one epoch before analysis.";

/// Recommendation emitted when no anomaly is found.
pub const STABLE_RECOMMENDATION: &str = "Gradient flow is stable; no anomalies detected.";

/// Flagged statKeys (or layers, for stagnation) per anomaly category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemReport {
    /// statKeys whose norm fell below the vanishing threshold.
    pub vanishing: BTreeSet<String>,
    /// statKeys whose norm exceeded the exploding threshold.
    pub exploding: BTreeSet<String>,
    /// statKeys whose norm varied too much across epochs.
    pub high_variance: BTreeSet<String>,
    /// Base layer names whose norms did not move.
    pub stagnant: BTreeSet<String>,
    /// One entry per non-empty category, or a single stable/no-data message.
    pub recommendations: Vec<String>,
}

impl ProblemReport {
    /// Whether any category is non-empty.
    pub fn has_anomalies(&self) -> bool {
        !(self.vanishing.is_empty()
            && self.exploding.is_empty()
            && self.high_variance.is_empty()
            && self.stagnant.is_empty())
    }

    /// Whether vanishing or exploding gradients were flagged.
    pub fn is_critical(&self) -> bool {
        !self.vanishing.is_empty() || !self.exploding.is_empty()
    }

    /// Whether high variance or stagnation was flagged.
    pub fn has_instability(&self) -> bool {
        !self.high_variance.is_empty() || !self.stagnant.is_empty()
    }

    fn no_data() -> Self {
        Self {
            recommendations: vec![NO_DATA_RECOMMENDATION.to_string()],
            ..Self::default()
        }
    }
}

/// Stateless anomaly detector bound to a set of thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector {
    thresholds: Thresholds,
}

impl AnomalyDetector {
    /// Detector using `thresholds`.
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    /// Thresholds in use.
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Scans the lookback window of `history` and classifies anomalies.
    pub fn detect(&self, history: &GradientHistory) -> ProblemReport {
        if history.is_empty() {
            return ProblemReport::no_data();
        }

        let window = history.window(self.thresholds.lookback_epochs as usize);
        self.detect_window(window)
    }

    /// Runs detection over an explicit window of entries.
    pub fn detect_window(&self, window: &[HistoryEntry]) -> ProblemReport {
        if window.is_empty() {
            return ProblemReport::no_data();
        }

        let series = norm_series(window);

        let mut report = ProblemReport {
            vanishing: self.vanishing(&series),
            exploding: self.exploding(&series),
            high_variance: self.high_variance(&series),
            stagnant: if window.len() >= 2 {
                self.stagnant(&series)
            } else {
                BTreeSet::new()
            },
            recommendations: Vec::new(),
        };
        report.recommendations = recommendations(&report);

        tracing::debug!(
            vanishing = report.vanishing.len(),
            exploding = report.exploding.len(),
            high_variance = report.high_variance.len(),
            stagnant = report.stagnant.len(),
            window = window.len(),
            "Gradient anomaly scan complete"
        );

        report
    }

    fn vanishing(&self, series: &BTreeMap<&str, Vec<f64>>) -> BTreeSet<String> {
        series
            .iter()
            .filter(|(_, norms)| norms.iter().any(|&n| n < self.thresholds.vanishing))
            .map(|(key, _)| key.to_string())
            .collect()
    }

    fn exploding(&self, series: &BTreeMap<&str, Vec<f64>>) -> BTreeSet<String> {
        series
            .iter()
            .filter(|(_, norms)| norms.iter().any(|&n| n > self.thresholds.exploding))
            .map(|(key, _)| key.to_string())
            .collect()
    }

    fn high_variance(&self, series: &BTreeMap<&str, Vec<f64>>) -> BTreeSet<String> {
        series
            .iter()
            .filter(|(_, norms)| {
                norms.len() >= 2 && stats::sample_variance(norms) > self.thresholds.variance_max
            })
            .map(|(key, _)| key.to_string())
            .collect()
    }

    /// A layer is stagnant when at least one of its parameter groups has two
    /// or more points and no group moves by `tolerance` or more between
    /// consecutive epochs.
    fn stagnant(&self, series: &BTreeMap<&str, Vec<f64>>) -> BTreeSet<String> {
        let tolerance = self.thresholds.stagnation_tolerance();

        let mut by_layer: BTreeMap<&str, Vec<&Vec<f64>>> = BTreeMap::new();
        for (key, norms) in series {
            let (layer, _) = split_stat_key(key);
            by_layer.entry(layer).or_default().push(norms);
        }

        by_layer
            .into_iter()
            .filter(|(_, groups)| {
                let measured: Vec<&&Vec<f64>> = groups.iter().filter(|n| n.len() >= 2).collect();
                !measured.is_empty()
                    && measured.iter().all(|norms| {
                        norms
                            .windows(2)
                            .all(|pair| (pair[1] - pair[0]).abs() < tolerance)
                    })
            })
            .map(|(layer, _)| layer.to_string())
            .collect()
    }
}

/// Convenience wrapper for [`AnomalyDetector::detect`].
pub fn detect(history: &GradientHistory, thresholds: &Thresholds) -> ProblemReport {
    AnomalyDetector::new(*thresholds).detect(history)
}

/// Norm time series per statKey across the window, oldest first.
fn norm_series(window: &[HistoryEntry]) -> BTreeMap<&str, Vec<f64>> {
    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for entry in window {
        for (key, param) in entry.stats.valid() {
            series.entry(key).or_default().push(param.norm);
        }
    }
    series
}

fn join(keys: &BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn recommendations(report: &ProblemReport) -> Vec<String> {
    let mut recs = Vec::new();

    if !report.vanishing.is_empty() {
        recs.push(format!(
            "Vanishing gradients detected in: {}. Consider increasing the learning rate, \
             adding residual connections, or switching to non-saturating activations.",
            join(&report.vanishing)
        ));
    }
    if !report.exploding.is_empty() {
        recs.push(format!(
            "Exploding gradients detected in: {}. Apply gradient clipping and reduce the learning rate.",
            join(&report.exploding)
        ));
    }
    if !report.high_variance.is_empty() {
        recs.push(format!(
            "High gradient variance across epochs in: {}. Consider batch normalization or a smaller learning rate.",
            join(&report.high_variance)
        ));
    }
    if !report.stagnant.is_empty() {
        recs.push(format!(
            "Gradient stagnation detected in layers: {}. Consider a learning rate schedule or re-initializing these layers.",
            join(&report.stagnant)
        ));
    }

    if recs.is_empty() {
        recs.push(STABLE_RECOMMENDATION.to_string());
    }
    recs
}
