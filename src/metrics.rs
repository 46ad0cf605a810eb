//! Per-epoch training metrics fed in by the training loop.

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::stats;

/// Metrics reported by the training loop for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Training loss
    pub loss: f64,
    /// Training accuracy
    pub accuracy: f64,
    /// Validation loss, if evaluated this epoch
    pub validation_loss: Option<f64>,
    /// Validation accuracy, if evaluated this epoch
    pub validation_accuracy: Option<f64>,
}

impl EpochMetrics {
    /// Training results without validation.
    pub fn new(loss: f64, accuracy: f64) -> Self {
        Self {
            loss,
            accuracy,
            validation_loss: None,
            validation_accuracy: None,
        }
    }

    /// Attaches validation results.
    #[must_use]
    pub fn with_validation(mut self, loss: f64, accuracy: f64) -> Self {
        self.validation_loss = Some(loss);
        self.validation_accuracy = Some(accuracy);
        self
    }
}

/// Append-only loss/accuracy series for a training run.
///
/// Every series is index-aligned with `epochs`. Validation entries are `None`
/// on epochs where validation was not reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    epochs: Vec<u64>,
    #[serde(with = "stats::nullable_float::seq")]
    loss: Vec<f64>,
    #[serde(with = "stats::nullable_float::seq")]
    accuracy: Vec<f64>,
    validation_loss: Vec<Option<f64>>,
    validation_accuracy: Vec<Option<f64>>,
}

impl TrainingMetrics {
    /// Creates empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one epoch's metrics.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Ordering`] if `epoch` is not after the last one.
    pub fn push(&mut self, epoch: u64, metrics: &EpochMetrics) -> Result<()> {
        if let Some(last) = self.last_epoch() {
            if epoch <= last {
                return Err(AdvisorError::Ordering { epoch, last });
            }
        }

        self.epochs.push(epoch);
        self.loss.push(metrics.loss);
        self.accuracy.push(metrics.accuracy);
        self.validation_loss.push(metrics.validation_loss);
        self.validation_accuracy.push(metrics.validation_accuracy);
        Ok(())
    }

    /// Checks the index alignment of the series.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Format`] if any series differs in length from
    /// `epochs` or the epochs are not strictly increasing.
    pub fn validate(&self) -> Result<()> {
        let n = self.epochs.len();
        if self.loss.len() != n
            || self.accuracy.len() != n
            || self.validation_loss.len() != n
            || self.validation_accuracy.len() != n
        {
            return Err(AdvisorError::Format(format!(
                "metrics series misaligned: {} epochs, {} losses, {} accuracies, \
                 {} validation losses, {} validation accuracies",
                n,
                self.loss.len(),
                self.accuracy.len(),
                self.validation_loss.len(),
                self.validation_accuracy.len()
            )));
        }
        if self.epochs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AdvisorError::Format(
                "metrics epochs are not strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Recorded epochs, strictly increasing.
    pub fn epochs(&self) -> &[u64] {
        &self.epochs
    }

    /// Training loss per epoch.
    pub fn loss(&self) -> &[f64] {
        &self.loss
    }

    /// Training accuracy per epoch.
    pub fn accuracy(&self) -> &[f64] {
        &self.accuracy
    }

    /// Validation loss per epoch, `None` where not evaluated.
    pub fn validation_loss(&self) -> &[Option<f64>] {
        &self.validation_loss
    }

    /// Validation accuracy per epoch, `None` where not evaluated.
    pub fn validation_accuracy(&self) -> &[Option<f64>] {
        &self.validation_accuracy
    }

    /// Last recorded epoch.
    pub fn last_epoch(&self) -> Option<u64> {
        self.epochs.last().copied()
    }

    /// Training loss of the last recorded epoch.
    pub fn latest_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether no epoch has been recorded.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Last `n` training losses.
    pub fn recent_loss(&self, n: usize) -> &[f64] {
        stats::tail(&self.loss, n)
    }

    /// Finite training losses, oldest first.
    pub fn finite_loss(&self) -> Vec<f64> {
        stats::finite(&self.loss)
    }

    /// `(training, validation)` loss pairs over the last `n` epochs.
    ///
    /// Epochs without validation, or with a non-finite value on either side,
    /// are left out, so both halves of every pair come from the same epoch.
    pub fn recent_loss_pairs(&self, n: usize) -> Vec<(f64, f64)> {
        let start = self.epochs.len().saturating_sub(n);
        self.loss[start..]
            .iter()
            .zip(&self.validation_loss[start..])
            .filter_map(|(&train, val)| match *val {
                Some(val) if train.is_finite() && val.is_finite() => Some((train, val)),
                _ => None,
            })
            .collect()
    }
}
