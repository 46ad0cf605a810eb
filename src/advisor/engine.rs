//! Rule-based suggestion and alert generation.
//!
//! Every sub-suggestion is derived independently from the same
//! [`ProblemReport`] and [`TrainingMetrics`] using fixed precedence rules.
//!
//! | Sub-suggestion | Rule (first match wins unless noted) |
//! |----------------|---------------------------------------|
//! | Learning rate | exploding x0.5 > vanishing x2.0 > stagnant x1.5 > flat loss x1.2 |
//! | Optimizer | high variance rmsprop > vanishing adam(beta1 0.95) > exploding sgd+momentum > adam |
//! | Architecture | additive: vanishing, exploding, high variance |
//! | Regularization | overfitting gap, and independently high variance |
//! | Schedule | low loss CV step decay > stagnant cosine > constant |

use crate::alerts::{Alert, AlertKind, AlertSeverity};
use crate::config::AdvisorConfig;
use crate::detector::ProblemReport;
use crate::history::GradientStatistics;
use crate::metrics::TrainingMetrics;
use crate::stats;

use super::suggestion::{
    Advice, ArchitectureChange, Assessment, HyperParams, LearningRateAction, OptimizerChoice,
    Priority, RegularizationPlan, ScheduleAction, Suggestion,
};

/// Losses needed before loss-trend rules apply.
const MIN_TREND_EPOCHS: usize = 5;

/// Relative loss change below which the loss counts as flat.
const FLAT_LOSS_CHANGE: f64 = 0.01;

/// Loss CV below which a step decay schedule is recommended.
const STEP_DECAY_CV: f64 = 0.02;

/// Validation/training loss ratio above which the model is overfitting.
const OVERFIT_RATIO: f64 = 1.2;

/// Confidence multiplier applied when few epochs have been recorded.
const LOW_DATA_PENALTY: f64 = 0.7;

/// Stateless advisory engine.
#[derive(Debug, Clone, Default)]
pub struct AdvisoryEngine {
    config: AdvisorConfig,
}

impl AdvisoryEngine {
    /// Engine using `config` for its alert windows and ranges.
    pub fn new(config: AdvisorConfig) -> Self {
        Self { config }
    }

    /// Configuration in use.
    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Builds a [`Suggestion`] from an anomaly report and the metrics so far.
    pub fn suggest(
        &self,
        report: &ProblemReport,
        metrics: &TrainingMetrics,
        current: &HyperParams,
    ) -> Suggestion {
        let learning_rate = self.learning_rate(report, metrics);
        let suggested_learning_rate = current
            .learning_rate
            .map(|lr| learning_rate.action.apply(lr));

        let mut optimizer = self.optimizer(report);
        if current.optimizer == Some(optimizer.action.optimizer) {
            optimizer
                .reasoning
                .push(format!("Already using {}.", optimizer.action.optimizer));
        }

        let suggestion = Suggestion {
            learning_rate,
            optimizer,
            architecture: self.architecture(report),
            regularization: self.regularization(report, metrics),
            training_schedule: self.schedule(report, metrics),
            suggested_learning_rate,
            overall: self.assessment(report, metrics.len()),
            epoch: metrics.last_epoch(),
        };

        tracing::debug!(
            priority = %suggestion.overall.priority,
            confidence = suggestion.overall.confidence,
            lr = %suggestion.learning_rate.action,
            "Generated suggestion"
        );

        suggestion
    }

    fn learning_rate(
        &self,
        report: &ProblemReport,
        metrics: &TrainingMetrics,
    ) -> Advice<LearningRateAction> {
        if !report.exploding.is_empty() {
            return Advice::new(
                LearningRateAction::Decrease { factor: 0.5 },
                "Exploding gradients: halve the learning rate to stabilize updates.",
                0.9,
            );
        }
        if !report.vanishing.is_empty() {
            return Advice::new(
                LearningRateAction::Increase { factor: 2.0 },
                "Vanishing gradients: double the learning rate to restore signal.",
                0.8,
            );
        }
        if !report.stagnant.is_empty() {
            return Advice::new(
                LearningRateAction::Increase { factor: 1.5 },
                "Stagnant gradients: raise the learning rate to escape the plateau.",
                0.7,
            );
        }
        if let Some(change) = flat_loss_change(metrics) {
            return Advice::new(
                LearningRateAction::Increase { factor: 1.2 },
                format!(
                    "Loss changed {:.2}% over the last {MIN_TREND_EPOCHS} epochs: nudge the learning rate up.",
                    change * 100.0
                ),
                0.6,
            );
        }
        Advice::maintain(LearningRateAction::Maintain)
    }

    fn optimizer(&self, report: &ProblemReport) -> Advice<OptimizerChoice> {
        if !report.high_variance.is_empty() {
            Advice::new(
                OptimizerChoice::rmsprop(),
                "High gradient variance: RMSprop normalizes per-parameter step sizes.",
                0.7,
            )
        } else if !report.vanishing.is_empty() {
            Advice::new(
                OptimizerChoice::adam(0.95),
                "Vanishing gradients: Adam with a higher first-moment decay keeps momentum through weak signal.",
                0.8,
            )
        } else if !report.exploding.is_empty() {
            Advice::new(
                OptimizerChoice::sgd_momentum(0.9),
                "Exploding gradients: SGD with momentum takes more conservative steps.",
                0.7,
            )
        } else {
            Advice::new(
                OptimizerChoice::adam(0.9),
                "No optimizer-specific anomaly: Adam is a robust default.",
                0.6,
            )
        }
    }

    fn architecture(&self, report: &ProblemReport) -> Advice<Vec<ArchitectureChange>> {
        let mut changes: Vec<ArchitectureChange> = Vec::new();
        let mut reasoning = Vec::new();
        let mut confidence: Option<f64> = None;

        let mut add = |new: &[ArchitectureChange], reason: &str, conf: f64| {
            for change in new {
                if !changes.contains(change) {
                    changes.push(*change);
                }
            }
            reasoning.push(reason.to_string());
            confidence = Some(confidence.map_or(conf, |c: f64| c.max(conf)));
        };

        if !report.vanishing.is_empty() {
            add(
                &[
                    ArchitectureChange::ResidualConnections,
                    ArchitectureChange::BatchNormalization,
                ],
                "Vanishing gradients: residual connections and normalization shorten gradient paths.",
                0.8,
            );
        }
        if !report.exploding.is_empty() {
            add(
                &[
                    ArchitectureChange::GradientClipping { max_norm: 1.0 },
                    ArchitectureChange::LayerNormalization,
                ],
                "Exploding gradients: clip gradient norms and add layer normalization.",
                0.9,
            );
        }
        if !report.high_variance.is_empty() {
            add(
                &[
                    ArchitectureChange::BatchNormalization,
                    ArchitectureChange::ReInitialization,
                ],
                "High gradient variance: batch normalization or re-initialization can steady gradient scale.",
                0.7,
            );
        }

        match confidence {
            Some(confidence) => Advice {
                action: changes,
                reasoning,
                confidence,
            },
            None => Advice::maintain(Vec::new()),
        }
    }

    fn regularization(
        &self,
        report: &ProblemReport,
        metrics: &TrainingMetrics,
    ) -> Advice<RegularizationPlan> {
        let mut plan = RegularizationPlan::default();
        let mut reasoning = Vec::new();
        let mut confidence: Option<f64> = None;

        // Only epochs that were validated take part, on both sides.
        let pairs = metrics.recent_loss_pairs(MIN_TREND_EPOCHS);
        if !pairs.is_empty() {
            let (train, val): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let (train_mean, val_mean) = (stats::mean(&train), stats::mean(&val));
            if val_mean > OVERFIT_RATIO * train_mean {
                plan.dropout = Some(0.3);
                plan.weight_decay = Some(1e-4);
                reasoning.push(format!(
                    "Validation loss ({val_mean:.4}) exceeds training loss ({train_mean:.4}) by more than {:.0}%: add dropout and weight decay.",
                    (OVERFIT_RATIO - 1.0) * 100.0
                ));
                confidence = Some(0.8);
            }
        }

        if !report.high_variance.is_empty() {
            plan.batch_normalization = true;
            reasoning.push("High gradient variance: add batch normalization.".to_string());
            confidence = Some(confidence.map_or(0.7, |c| c.max(0.7)));
        }

        match confidence {
            Some(confidence) => Advice {
                action: plan,
                reasoning,
                confidence,
            },
            None => Advice::maintain(plan),
        }
    }

    fn schedule(&self, report: &ProblemReport, metrics: &TrainingMetrics) -> Advice<ScheduleAction> {
        let losses = metrics.finite_loss();
        if losses.len() >= MIN_TREND_EPOCHS {
            if let Some(cv) = stats::coefficient_of_variation(stats::tail(&losses, 10)) {
                if cv < STEP_DECAY_CV {
                    return Advice::new(
                        ScheduleAction::StepDecay {
                            factor: 0.5,
                            step_epochs: 10,
                        },
                        format!("Loss has flattened (CV {cv:.4}): decay the learning rate stepwise."),
                        0.7,
                    );
                }
            }
        }
        if !report.stagnant.is_empty() {
            return Advice::new(
                ScheduleAction::CosineAnnealing { period_epochs: 50 },
                "Stagnant gradients: cosine annealing periodically revisits larger steps.",
                0.6,
            );
        }
        Advice::maintain(ScheduleAction::Constant)
    }

    fn assessment(&self, report: &ProblemReport, recorded_epochs: usize) -> Assessment {
        let (priority, mut confidence, mut reasoning) = if report.is_critical() {
            (
                Priority::High,
                0.9,
                vec!["Vanishing or exploding gradients require immediate attention.".to_string()],
            )
        } else if report.has_instability() {
            (
                Priority::Medium,
                0.7,
                vec!["Gradient variance or stagnation may slow training.".to_string()],
            )
        } else {
            (
                Priority::Low,
                0.5,
                vec!["No significant gradient anomalies detected.".to_string()],
            )
        };

        // Threshold breaches do not depend on trend data, so high priority keeps
        // its confidence; the caveat is still reported.
        if recorded_epochs < self.config.low_data_epochs {
            if priority != Priority::High {
                confidence *= LOW_DATA_PENALTY;
            }
            reasoning.push(format!(
                "Only {recorded_epochs} epoch(s) recorded; trend-based advice is low confidence."
            ));
        }

        Assessment {
            priority,
            confidence,
            reasoning,
        }
    }

    /// Raises alerts for the current epoch.
    ///
    /// `latest` is the most recent gradient statistics, `losses` the training
    /// loss series including the current epoch.
    pub fn check_alerts(
        &self,
        current_epoch: u64,
        report: &ProblemReport,
        latest: Option<&GradientStatistics>,
        losses: &[f64],
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if !report.exploding.is_empty() {
            alerts.push(
                Alert::new(
                    AlertSeverity::Critical,
                    AlertKind::ExplodingGradients,
                    format!("Exploding gradients in {}", join(&report.exploding)),
                    current_epoch,
                )
                .with_action(
                    "Halve the learning rate and enable gradient clipping (max norm 1.0).",
                ),
            );
        }
        if !report.vanishing.is_empty() {
            alerts.push(
                Alert::new(
                    AlertSeverity::Critical,
                    AlertKind::VanishingGradients,
                    format!("Vanishing gradients in {}", join(&report.vanishing)),
                    current_epoch,
                )
                .with_action(
                    "Increase the learning rate and add residual connections or normalization.",
                ),
            );
        }
        if !report.high_variance.is_empty() {
            alerts.push(
                Alert::new(
                    AlertSeverity::Warning,
                    AlertKind::HighVariance,
                    format!(
                        "High gradient variance across epochs in {}",
                        join(&report.high_variance)
                    ),
                    current_epoch,
                )
                .with_action("Add batch normalization or lower the learning rate."),
            );
        }
        if !report.stagnant.is_empty() {
            alerts.push(
                Alert::new(
                    AlertSeverity::Warning,
                    AlertKind::GradientStagnation,
                    format!("Gradient norms stagnant in layers {}", join(&report.stagnant)),
                    current_epoch,
                )
                .with_action("Apply a learning rate schedule or re-initialize the stagnant layers."),
            );
        }

        let window = self.config.loss_stagnation_epochs;
        let finite_losses = stats::finite(losses);
        if finite_losses.len() >= window {
            if let Some(change) = stats::relative_change(stats::tail(&finite_losses, window)) {
                if change < FLAT_LOSS_CHANGE {
                    alerts.push(
                        Alert::new(
                            AlertSeverity::Warning,
                            AlertKind::LossStagnation,
                            format!(
                                "Loss changed only {:.2}% over the last {window} epochs",
                                change * 100.0
                            ),
                            current_epoch,
                        )
                        .with_action("Raise the learning rate by 20% or switch to a decaying schedule."),
                    );
                }
            }
        }

        let (low, high) = self.config.healthy_norm_range;
        if let Some(mean_norm) = latest.and_then(GradientStatistics::mean_norm) {
            if mean_norm > low && mean_norm < high {
                alerts.push(Alert::new(
                    AlertSeverity::Info,
                    AlertKind::HealthyGradients,
                    format!("Mean gradient norm {mean_norm:.4} is in the healthy range ({low}, {high})"),
                    current_epoch,
                ));
            }
        }

        for alert in alerts.iter().filter(|a| a.severity == AlertSeverity::Critical) {
            tracing::warn!(epoch = current_epoch, "{}", alert.message);
        }

        alerts
    }
}

/// Relative change over the last `MIN_TREND_EPOCHS` finite losses, if below 1%.
fn flat_loss_change(metrics: &TrainingMetrics) -> Option<f64> {
    let losses = metrics.finite_loss();
    if losses.len() < MIN_TREND_EPOCHS {
        return None;
    }
    stats::relative_change(stats::tail(&losses, MIN_TREND_EPOCHS))
        .filter(|&change| change < FLAT_LOSS_CHANGE)
}

fn join(keys: &std::collections::BTreeSet<String>) -> String {
    keys.iter().cloned().collect::<Vec<_>>().join(", ")
}
