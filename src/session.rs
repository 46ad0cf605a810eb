//! Training session orchestration.
//!
//! A [`TrainingSession`] threads per-epoch observations through the gradient
//! history, the anomaly detector and the advisory engine, and owns the
//! cumulative state that is persisted in snapshots.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized --setup_monitoring--> Active
//! Uninitialized --load--------------> Active
//! Active --setup_monitoring/load----> Active (state replaced)
//! ```
//!
//! # Example
//!
//! ```rust
//! use gradient_advisor::config::AdvisorConfig;
//! use gradient_advisor::history::{GradientStatistics, ParamStats};
//! use gradient_advisor::metrics::EpochMetrics;
//! use gradient_advisor::session::TrainingSession;
//!
//! let mut session = TrainingSession::new(AdvisorConfig::default())?;
//! session.setup_monitoring(["conv1", "fc"]);
//!
//! let stats = GradientStatistics::new()
//!     .with("conv1_weights", ParamStats::new(0.8, 1e-3, 0.0))
//!     .with("fc_weights", ParamStats::new(1.2, 2e-3, 0.0));
//! session.record_epoch(0, stats, &EpochMetrics::new(2.3, 0.1))?;
//!
//! let suggestion = session.suggestions();
//! println!("{}", suggestion.summary_lines().join("\n"));
//! # Ok::<(), gradient_advisor::error::AdvisorError>(())
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::advisor::{AdvisoryEngine, HyperParams, Suggestion};
use crate::alerts::Alert;
use crate::config::{AdvisorConfig, Thresholds};
use crate::convergence::{ConvergenceAnalysis, ConvergenceAnalyzer};
use crate::detector::{AnomalyDetector, ProblemReport};
use crate::error::{AdvisorError, Result};
use crate::history::{split_stat_key, GradientHistory, GradientStatistics};
use crate::metrics::{EpochMetrics, TrainingMetrics};
use crate::report::{SessionReport, SummaryStatistics};
use crate::snapshot::Snapshot;
use crate::source::{GradientSource, GradientSourceError};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Constructed, no layers bound yet.
    Uninitialized,
    /// Monitoring; epochs may be recorded.
    Active,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Result of a best-effort [`TrainingSession::record_epoch_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Gradients and metrics were both recorded.
    Recorded,
    /// The gradient source failed; only metrics were recorded.
    GradientsSkipped,
}

/// One logged analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Anomalies found at analysis time.
    pub report: ProblemReport,
    /// Advice derived from `report`.
    pub suggestion: Suggestion,
}

/// Append-only log of every suggestion produced by a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisLog {
    entries: Vec<LogEntry>,
}

impl AnalysisLog {
    fn push(&mut self, report: ProblemReport, suggestion: Suggestion) {
        self.entries.push(LogEntry { report, suggestion });
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Number of logged analyses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been logged yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the gradient history, metrics and analysis log of one training run.
#[derive(Debug)]
pub struct TrainingSession {
    config: AdvisorConfig,
    detector: AnomalyDetector,
    engine: AdvisoryEngine,
    analyzer: ConvergenceAnalyzer,
    state: SessionState,
    layer_identities: Vec<String>,
    history: GradientHistory,
    metrics: TrainingMetrics,
    log: AnalysisLog,
    hyperparams: HyperParams,
    last_saved: Option<DateTime<Utc>>,
}

impl TrainingSession {
    /// Creates an uninitialized session.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: AnomalyDetector::new(config.thresholds),
            engine: AdvisoryEngine::new(config.clone()),
            analyzer: ConvergenceAnalyzer::new(),
            config,
            state: SessionState::Uninitialized,
            layer_identities: Vec::new(),
            history: GradientHistory::new(),
            metrics: TrainingMetrics::new(),
            log: AnalysisLog::default(),
            hyperparams: HyperParams::default(),
            last_saved: None,
        })
    }

    /// Binds the monitored layers and starts a fresh run.
    ///
    /// History, metrics and the analysis log are cleared.
    pub fn setup_monitoring<I, S>(&mut self, layers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layer_identities = layers.into_iter().map(Into::into).collect();
        self.history.clear();
        self.metrics = TrainingMetrics::new();
        self.log = AnalysisLog::default();
        self.state = SessionState::Active;

        info!(
            layers = self.layer_identities.len(),
            "Gradient monitoring started"
        );
    }

    /// Replaces the detection thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::InvalidConfig`] if the thresholds are invalid;
    /// the current thresholds are kept.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<()> {
        thresholds.validate()?;
        self.apply_thresholds(thresholds);
        info!(?thresholds, "Thresholds updated");
        Ok(())
    }

    /// Sets the optimizer settings suggestions are relative to.
    pub fn set_hyperparams(&mut self, hyperparams: HyperParams) {
        self.hyperparams = hyperparams;
    }

    fn apply_thresholds(&mut self, thresholds: Thresholds) {
        self.config.thresholds = thresholds;
        self.detector = AnomalyDetector::new(thresholds);
        self.engine = AdvisoryEngine::new(self.config.clone());
    }

    fn require_active(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(AdvisorError::InvalidState {
                state: self.state,
                operation,
            })
        }
    }

    fn check_order(&self, epoch: u64) -> Result<()> {
        match self.last_epoch() {
            Some(last) if epoch <= last => Err(AdvisorError::Ordering { epoch, last }),
            _ => Ok(()),
        }
    }

    /// Records gradient statistics and metrics for one epoch.
    ///
    /// Either both are stored or nothing changes.
    ///
    /// # Errors
    ///
    /// - [`AdvisorError::InvalidState`] before monitoring is set up
    /// - [`AdvisorError::Ordering`] if `epoch` is not after the last recorded epoch
    pub fn record_epoch(
        &mut self,
        epoch: u64,
        stats: GradientStatistics,
        metrics: &EpochMetrics,
    ) -> Result<()> {
        self.require_active("record_epoch")?;
        self.check_order(epoch)?;
        self.note_untracked_layers(&stats);

        debug!(epoch, params = stats.len(), loss = metrics.loss, "Recording epoch");
        self.history.append(epoch, stats)?;
        self.metrics.push(epoch, metrics)
    }

    /// Records an epoch, collecting gradients from `source`.
    ///
    /// A failing source does not abort the epoch: the failure is logged, the
    /// metrics are still recorded and [`RecordOutcome::GradientsSkipped`] is
    /// returned.
    ///
    /// # Errors
    ///
    /// Same as [`TrainingSession::record_epoch`]. Source failures are not errors.
    pub fn record_epoch_from<G>(
        &mut self,
        source: &mut G,
        epoch: u64,
        metrics: &EpochMetrics,
    ) -> Result<RecordOutcome>
    where
        G: GradientSource + ?Sized,
    {
        self.require_active("record_epoch_from")?;
        self.check_order(epoch)?;

        let collected = source.collect(epoch).and_then(|stats| {
            if stats.is_empty() {
                Err(GradientSourceError::Empty)
            } else {
                Ok(stats)
            }
        });

        match collected {
            Ok(stats) => {
                self.record_epoch(epoch, stats, metrics)?;
                Ok(RecordOutcome::Recorded)
            }
            Err(e) => {
                warn!(epoch, error = %e, "Gradient collection failed; recording metrics only");
                self.metrics.push(epoch, metrics)?;
                Ok(RecordOutcome::GradientsSkipped)
            }
        }
    }

    fn note_untracked_layers(&self, stats: &GradientStatistics) {
        if self.layer_identities.is_empty() {
            return;
        }
        let untracked: BTreeSet<&str> = stats
            .keys()
            .map(|key| split_stat_key(key).0)
            .filter(|layer| !self.layer_identities.iter().any(|l| l == layer))
            .collect();
        if !untracked.is_empty() {
            debug!(?untracked, "Statistics for layers not bound at setup");
        }
    }

    /// Runs anomaly detection over the current lookback window.
    pub fn detect(&self) -> ProblemReport {
        self.detector.detect(&self.history)
    }

    /// Produces a suggestion from the current state and appends it to the log.
    pub fn suggestions(&mut self) -> Suggestion {
        let report = self.detect();
        let suggestion = self
            .engine
            .suggest(&report, &self.metrics, &self.hyperparams);
        self.log.push(report, suggestion.clone());
        suggestion
    }

    /// Raises alerts for `current_epoch`.
    ///
    /// `current` is included in the loss trend when that epoch has not been
    /// recorded yet, so alerts can be checked before or after recording.
    pub fn check_alerts(&self, current_epoch: u64, current: &EpochMetrics) -> Vec<Alert> {
        let report = self.detect();
        let mut losses = self.metrics.loss().to_vec();
        if self
            .metrics
            .last_epoch()
            .map_or(true, |last| current_epoch > last)
        {
            losses.push(current.loss);
        }
        let latest = self.history.latest().map(|entry| &entry.stats);

        self.engine
            .check_alerts(current_epoch, &report, latest, &losses)
    }

    /// Convergence analysis of the recorded training loss.
    pub fn convergence(&self) -> ConvergenceAnalysis {
        self.analyzer.analyze(self.metrics.loss())
    }

    /// Current problems, last logged suggestion, convergence and summary statistics.
    pub fn report(&self) -> SessionReport {
        SessionReport {
            problems: self.detect(),
            suggestion: self.log.latest().map(|entry| entry.suggestion.clone()),
            convergence: self.convergence(),
            summary: SummaryStatistics::from_history(&self.history),
        }
    }

    /// Writes a snapshot of thresholds, layers, history and metrics.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::InvalidState`] before monitoring is set up, or
    /// an I/O or serialization error from the write.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.require_active("save")?;
        let snapshot = Snapshot::new(
            self.config.thresholds,
            self.layer_identities.clone(),
            self.history.clone(),
            self.metrics.clone(),
        );
        snapshot.save(path)?;
        self.last_saved = Some(snapshot.created_at);
        Ok(())
    }

    /// Replaces the session state with a snapshot and becomes active.
    ///
    /// The analysis log is cleared. On error the session is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Io`] if the file cannot be read, or
    /// [`AdvisorError::Format`] if it is corrupt or of an unknown version.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let snapshot = Snapshot::load(path)?;

        self.apply_thresholds(snapshot.thresholds);
        self.layer_identities = snapshot.layer_identities;
        self.history = snapshot.history;
        self.metrics = snapshot.metrics;
        self.log = AnalysisLog::default();
        self.last_saved = Some(snapshot.created_at);
        self.state = SessionState::Active;

        info!(
            epochs = self.history.len(),
            last_epoch = ?self.last_epoch(),
            "Session restored"
        );
        Ok(())
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Detection thresholds in use.
    pub fn thresholds(&self) -> &Thresholds {
        &self.config.thresholds
    }

    /// Last optimizer settings reported by the caller.
    pub fn hyperparams(&self) -> &HyperParams {
        &self.hyperparams
    }

    /// Layers registered with [`setup_monitoring`](Self::setup_monitoring).
    pub fn layer_identities(&self) -> &[String] {
        &self.layer_identities
    }

    /// Recorded gradient statistics.
    pub fn history(&self) -> &GradientHistory {
        &self.history
    }

    /// Recorded training metrics.
    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    /// Every analysis produced so far.
    pub fn log(&self) -> &AnalysisLog {
        &self.log
    }

    /// Creation time of the snapshot last saved or loaded.
    pub fn last_saved(&self) -> Option<DateTime<Utc>> {
        self.last_saved
    }

    /// Last epoch recorded in either the history or the metrics.
    pub fn last_epoch(&self) -> Option<u64> {
        self.history.last_epoch().max(self.metrics.last_epoch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use crate::history::ParamStats;
    use tempfile::tempdir;

    fn active_session() -> TrainingSession {
        let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
        session.setup_monitoring(["l1", "l2"]);
        session
    }

    fn stats(norm: f64) -> GradientStatistics {
        GradientStatistics::new()
            .with("l1_weights", ParamStats::new(norm, 1e-4, 0.0))
            .with("l2_weights", ParamStats::new(norm * 1.5, 1e-4, 0.0))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[test]
    fn test_record_requires_setup() {
        let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
        assert_eq!(session.state(), SessionState::Uninitialized);

        let err = session
            .record_epoch(0, stats(1.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap_err();
        assert!(matches!(
            err,
            AdvisorError::InvalidState {
                state: SessionState::Uninitialized,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AdvisorConfig::builder().loss_stagnation_epochs(1).build();
        assert!(TrainingSession::new(config).is_err());
    }

    #[test]
    fn test_setup_resets_state() {
        let mut session = active_session();
        session
            .record_epoch(0, stats(1.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        session.suggestions();

        session.setup_monitoring(["other"]);
        assert!(session.history().is_empty());
        assert!(session.metrics().is_empty());
        assert!(session.log().is_empty());
        assert_eq!(session.layer_identities(), &["other".to_string()]);
        assert_eq!(session.state(), SessionState::Active);
    }

    // ========================================================================
    // Recording
    // ========================================================================

    #[test]
    fn test_out_of_order_leaves_state_untouched() {
        let mut session = active_session();
        session
            .record_epoch(5, stats(1.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();

        let err = session
            .record_epoch(5, stats(2.0), &EpochMetrics::new(0.9, 0.6))
            .unwrap_err();
        assert!(matches!(err, AdvisorError::Ordering { epoch: 5, last: 5 }));
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.metrics().len(), 1);
        assert_eq!(session.metrics().latest_loss(), Some(1.0));
    }

    #[test]
    fn test_record_from_failing_source_skips_gradients() {
        let mut session = active_session();
        let mut source = |epoch: u64| -> std::result::Result<GradientStatistics, GradientSourceError> {
            if epoch % 2 == 1 {
                Err(GradientSourceError::Unavailable("hook detached".into()))
            } else {
                Ok(stats(1.0))
            }
        };

        let first = session
            .record_epoch_from(&mut source, 0, &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        let second = session
            .record_epoch_from(&mut source, 1, &EpochMetrics::new(0.9, 0.5))
            .unwrap();

        assert_eq!(first, RecordOutcome::Recorded);
        assert_eq!(second, RecordOutcome::GradientsSkipped);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.metrics().len(), 2);
        assert_eq!(session.last_epoch(), Some(1));

        // epoch 1 is taken by the metrics even though gradients were skipped
        assert!(session
            .record_epoch(1, stats(1.0), &EpochMetrics::new(0.8, 0.5))
            .is_err());
    }

    #[test]
    fn test_empty_source_counts_as_skipped() {
        let mut session = active_session();
        let mut source = |_: u64| -> std::result::Result<GradientStatistics, GradientSourceError> {
            Ok(GradientStatistics::new())
        };
        let outcome = session
            .record_epoch_from(&mut source, 0, &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        assert_eq!(outcome, RecordOutcome::GradientsSkipped);
        assert!(session.history().is_empty());
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    #[test]
    fn test_suggestions_are_logged() {
        let mut session = active_session();
        session
            .record_epoch(0, stats(50.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();

        let suggestion = session.suggestions();
        assert_eq!(session.log().len(), 1);
        assert_eq!(session.log().latest().unwrap().suggestion, suggestion);
        assert!(session
            .log()
            .latest()
            .unwrap()
            .report
            .exploding
            .contains("l1_weights"));
        assert_eq!(session.report().suggestion, Some(suggestion));
    }

    #[test]
    fn test_suggested_learning_rate_uses_hyperparams() {
        let mut session = active_session();
        session.set_hyperparams(HyperParams {
            learning_rate: Some(0.1),
            optimizer: None,
        });
        session
            .record_epoch(0, stats(50.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        assert_eq!(session.suggestions().suggested_learning_rate, Some(0.05));
    }

    #[test]
    fn test_check_alerts_includes_unrecorded_loss() {
        let mut session = active_session();
        for epoch in 0..4 {
            session
                .record_epoch(epoch, stats(1.0 + epoch as f64), &EpochMetrics::new(1.0, 0.5))
                .unwrap();
        }

        // four recorded losses plus the current one fill the stagnation window
        let alerts = session.check_alerts(4, &EpochMetrics::new(1.0, 0.5));
        assert!(alerts.iter().any(|a| a.kind == AlertKind::LossStagnation));

        // after recording, the same epoch is not counted twice
        session
            .record_epoch(4, stats(5.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        let alerts = session.check_alerts(4, &EpochMetrics::new(1.0, 0.5));
        assert!(alerts.iter().any(|a| a.kind == AlertKind::LossStagnation));
    }

    #[test]
    fn test_set_thresholds_validates() {
        let mut session = active_session();
        let bad = Thresholds {
            vanishing: -1.0,
            ..Thresholds::default()
        };
        assert!(session.set_thresholds(bad).is_err());
        assert_eq!(session.thresholds(), &Thresholds::default());

        let strict = Thresholds {
            exploding: 1.0,
            ..Thresholds::default()
        };
        session.set_thresholds(strict).unwrap();
        session
            .record_epoch(0, stats(2.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();
        assert!(session.detect().exploding.contains("l1_weights"));
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    #[test]
    fn test_save_requires_active() {
        let dir = tempdir().unwrap();
        let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
        assert!(session.save(dir.path().join("s.json")).is_err());
    }

    #[test]
    fn test_load_activates_fresh_session() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = active_session();
        for epoch in 0..3 {
            session
                .record_epoch(epoch, stats(1.0), &EpochMetrics::new(1.0 / (epoch + 1) as f64, 0.5))
                .unwrap();
        }
        session.save(&path).unwrap();
        assert!(session.last_saved().is_some());
        assert_eq!(session.state(), SessionState::Active);

        let mut restored = TrainingSession::new(AdvisorConfig::default()).unwrap();
        restored.load(&path).unwrap();

        assert_eq!(restored.state(), SessionState::Active);
        assert_eq!(restored.history(), session.history());
        assert_eq!(restored.metrics(), session.metrics());
        assert_eq!(restored.layer_identities(), session.layer_identities());
        assert_eq!(restored.last_saved(), session.last_saved());
    }

    #[test]
    fn test_failed_load_keeps_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"formatVersion\":\"9.9\"}").unwrap();

        let mut session = active_session();
        session
            .record_epoch(0, stats(1.0), &EpochMetrics::new(1.0, 0.5))
            .unwrap();

        assert!(matches!(session.load(&path), Err(AdvisorError::Format(_))));
        assert_eq!(session.history().len(), 1);
    }
}
