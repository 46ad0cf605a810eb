//! End-to-end integration tests for gradient-advisor

use gradient_advisor::convergence::{self, QualityTier};
use gradient_advisor::detector::{self, NO_DATA_RECOMMENDATION, STABLE_RECOMMENDATION};
use gradient_advisor::prelude::*;
use gradient_advisor::snapshot::Snapshot;
use gradient_advisor::stats;
use gradient_advisor::{GradientHistory, SessionState};
use tempfile::tempdir;

fn single(key: &str, norm: f64) -> GradientStatistics {
    GradientStatistics::new().with(key, ParamStats::new(norm, 1e-4, 0.0))
}

fn history_of(epochs: &[(u64, GradientStatistics)]) -> GradientHistory {
    let mut history = GradientHistory::new();
    for (epoch, stats) in epochs {
        history.append(*epoch, stats.clone()).unwrap();
    }
    history
}

/// Synthetic run with healthy, slowly shrinking gradients.
fn healthy_session(epochs: u64) -> TrainingSession {
    let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
    session.setup_monitoring(["conv1", "fc"]);
    for epoch in 0..epochs {
        let scale = 1.0 / (1.0 + epoch as f64 * 0.1);
        let stats = GradientStatistics::new()
            .with("conv1_weights", ParamStats::new(2.0 * scale, 1e-3, 0.0))
            .with("conv1_biases", ParamStats::new(0.5 * scale, 1e-4, 0.0))
            .with("fc_weights", ParamStats::new(1.5 * scale, 2e-3, 0.0));
        let metrics = EpochMetrics::new(2.5 * (-0.2 * epoch as f64).exp() + 0.1, 0.5);
        session.record_epoch(epoch, stats, &metrics).unwrap();
    }
    session
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_vanishing_single_epoch() {
    let history = history_of(&[(0, single("l1_weights", 1e-9))]);
    let report = detector::detect(&history, &Thresholds::default());

    assert_eq!(report.vanishing.len(), 1);
    assert!(report.vanishing.contains("l1_weights"));
    assert!(report
        .recommendations
        .iter()
        .any(|r| r.contains("Vanishing gradients") && r.contains("l1_weights")));
}

#[test]
fn test_scenario_exploding_is_high_priority() {
    let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
    session.setup_monitoring(["l1"]);
    session
        .record_epoch(0, single("l1_weights", 50.0), &EpochMetrics::new(3.0, 0.1))
        .unwrap();

    assert!(session.detect().exploding.contains("l1_weights"));

    let suggestion = session.suggestions();
    assert_eq!(suggestion.priority(), Priority::High);
    assert_eq!(suggestion.confidence(), 0.9);
    assert_eq!(
        suggestion.learning_rate.action,
        LearningRateAction::Decrease { factor: 0.5 }
    );
}

#[test]
fn test_scenario_converging_losses() {
    let losses = [1.0, 0.8, 0.6, 0.5, 0.4, 0.35, 0.32, 0.30];
    let analysis = convergence::analyze(&losses);

    assert!(analysis.is_converging);
    assert!(analysis.rate > 0.0);
    assert!(analysis.estimated_epochs_to_target.is_finite());
    let cv = stats::coefficient_of_variation(&losses).unwrap();
    assert_eq!(analysis.quality_tier, QualityTier::from_cv(cv));
    assert_eq!(analysis.recommendations.len(), 1);
}

#[test]
fn test_scenario_empty_history() {
    let report = detector::detect(&GradientHistory::new(), &Thresholds::default());

    assert!(report.vanishing.is_empty());
    assert!(report.exploding.is_empty());
    assert!(report.high_variance.is_empty());
    assert!(report.stagnant.is_empty());
    assert_eq!(report.recommendations, vec![NO_DATA_RECOMMENDATION.to_string()]);
}

#[test]
fn test_scenario_stagnant_layer() {
    let thresholds = Thresholds::default();
    let step = thresholds.vanishing; // well below vanishing * 10
    let history = history_of(&[
        (0, single("conv1_weights", 0.5)),
        (1, single("conv1_weights", 0.5 + step)),
    ]);

    let report = detector::detect(&history, &thresholds);
    assert!(report.stagnant.contains("conv1"));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_vanishing_membership_law() {
    let thresholds = Thresholds::default();
    let cases: [(&[f64], bool); 4] = [
        (&[1e-9, 1e-10, 1e-8], true),
        (&[1.0, 1e-9, 1.0], true),
        (&[1.0, 0.5, 2.0], false),
        (&[1e-7, 1e-6, 1e-5], false),
    ];

    for (norms, expected) in cases {
        let entries: Vec<(u64, GradientStatistics)> = norms
            .iter()
            .enumerate()
            .map(|(i, &n)| (i as u64, single("l_weights", n)))
            .collect();
        let report = detector::detect(&history_of(&entries), &thresholds);
        assert_eq!(
            report.vanishing.contains("l_weights"),
            expected,
            "norms {norms:?}"
        );
    }
}

#[test]
fn test_lookback_window_limits_detection() {
    // the vanishing epoch falls outside the 3-epoch window
    let history = history_of(&[
        (0, single("l_weights", 1e-9)),
        (1, single("l_weights", 1.0)),
        (2, single("l_weights", 1.1)),
        (3, single("l_weights", 1.2)),
    ]);
    let report = detector::detect(&history, &Thresholds::default());
    assert!(report.vanishing.is_empty());
}

#[test]
fn test_detect_is_idempotent() {
    let session = healthy_session(8);
    assert_eq!(session.detect(), session.detect());
}

#[test]
fn test_monotonic_epochs() {
    let mut history = GradientHistory::new();
    history.append(2, single("a_weights", 1.0)).unwrap();
    history.append(7, single("a_weights", 1.0)).unwrap();

    for epoch in [0, 2, 7] {
        assert!(matches!(
            history.append(epoch, single("a_weights", 1.0)),
            Err(AdvisorError::Ordering { last: 7, .. })
        ));
    }
    assert!(history.append(8, single("a_weights", 1.0)).is_ok());
    assert_eq!(history.len(), 3);
}

#[test]
fn test_convergence_sign() {
    let decreasing: Vec<f64> = (0..10).map(|i| 2.0 * (-0.3 * i as f64).exp()).collect();
    let increasing: Vec<f64> = (0..10).map(|i| 0.5 + 0.1 * i as f64).collect();

    assert!(convergence::analyze(&decreasing).rate > 0.0);
    let diverging = convergence::analyze(&increasing);
    assert!(diverging.rate < 0.0);
    assert!(!diverging.is_converging);
    assert!(diverging.estimated_epochs_to_target.is_infinite());
}

#[test]
fn test_insufficient_losses_are_not_an_error() {
    let analysis = convergence::analyze(&[1.0, 0.9]);
    assert!(!analysis.is_converging);
    assert_eq!(analysis.rate, 0.0);
    assert_eq!(analysis.recommendations.len(), 1);
    assert!(analysis.recommendations[0].contains("Insufficient data"));
}

#[test]
fn test_prefix_layer_names_do_not_collide() {
    // conv1 is flat, conv10 moves a lot
    let history = history_of(&[
        (
            0,
            GradientStatistics::new()
                .with("conv1_weights", ParamStats::new(0.5, 0.0, 0.0))
                .with("conv10_weights", ParamStats::new(0.5, 0.0, 0.0)),
        ),
        (
            1,
            GradientStatistics::new()
                .with("conv1_weights", ParamStats::new(0.5, 0.0, 0.0))
                .with("conv10_weights", ParamStats::new(1.5, 0.0, 0.0)),
        ),
    ]);
    let report = detector::detect(&history, &Thresholds::default());
    assert!(report.stagnant.contains("conv1"));
    assert!(!report.stagnant.contains("conv10"));
}

// ============================================================================
// Session flow
// ============================================================================

#[test]
fn test_healthy_run() {
    let mut session = healthy_session(12);

    let report = session.detect();
    assert!(!report.has_anomalies());
    assert_eq!(report.recommendations, vec![STABLE_RECOMMENDATION.to_string()]);

    let suggestion = session.suggestions();
    assert_eq!(suggestion.priority(), Priority::Low);
    assert_eq!(suggestion.epoch, Some(11));

    let conv = session.convergence();
    assert!(conv.is_converging);

    let alerts = session.check_alerts(12, &EpochMetrics::new(0.2, 0.9));
    assert!(alerts.iter().all(|a| a.severity == AlertSeverity::Info));
    assert!(alerts.iter().any(|a| a.kind == AlertKind::HealthyGradients));

    let full = session.report();
    assert_eq!(full.summary.norms.unwrap().count, 36);
    assert!(full.suggestion.is_some());
    assert!(full.render().contains("Gradient Advisor Report"));
}

#[test]
fn test_critical_alerts_carry_actions() {
    let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
    session.setup_monitoring(["a", "b"]);
    session
        .record_epoch(
            0,
            GradientStatistics::new()
                .with("a_weights", ParamStats::new(1e-9, 0.0, 0.0))
                .with("b_weights", ParamStats::new(80.0, 1.0, 0.0)),
            &EpochMetrics::new(1.0, 0.1),
        )
        .unwrap();

    let alerts = session.check_alerts(0, &EpochMetrics::new(1.0, 0.1));
    let critical: Vec<&Alert> = alerts
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .collect();

    assert_eq!(critical.len(), 2);
    assert!(critical.iter().all(|a| a.action_required.is_some()));
    assert!(critical.iter().any(|a| a.kind == AlertKind::ExplodingGradients));
    assert!(critical.iter().any(|a| a.kind == AlertKind::VanishingGradients));
}

#[test]
fn test_best_effort_gradient_source() {
    let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
    session.setup_monitoring(["fc"]);

    let mut source = |epoch: u64| -> std::result::Result<GradientStatistics, GradientSourceError> {
        if epoch == 2 {
            return Err(GradientSourceError::Malformed {
                key: "fc_weights".into(),
                reason: "shape mismatch".into(),
            });
        }
        Ok(GradientStatistics::from_raw([(
            "fc_weights",
            vec![0.3, -0.2, 0.1 * epoch as f64],
        )]))
    };

    let outcomes: Vec<RecordOutcome> = (0..4)
        .map(|epoch| {
            session
                .record_epoch_from(&mut source, epoch, &EpochMetrics::new(1.0 - 0.1 * epoch as f64, 0.5))
                .unwrap()
        })
        .collect();

    assert_eq!(
        outcomes,
        vec![
            RecordOutcome::Recorded,
            RecordOutcome::Recorded,
            RecordOutcome::GradientsSkipped,
            RecordOutcome::Recorded,
        ]
    );
    assert_eq!(session.history().len(), 3);
    assert_eq!(session.metrics().len(), 4);
}

#[test]
fn test_state_machine() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.json");

    let mut session = TrainingSession::new(AdvisorConfig::default()).unwrap();
    assert_eq!(session.state(), SessionState::Uninitialized);
    assert!(matches!(
        session.record_epoch(0, single("a_weights", 1.0), &EpochMetrics::new(1.0, 0.0)),
        Err(AdvisorError::InvalidState { .. })
    ));

    session.setup_monitoring(["a"]);
    session
        .record_epoch(0, single("a_weights", 1.0), &EpochMetrics::new(1.0, 0.0))
        .unwrap();
    session.save(&path).unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let mut fresh = TrainingSession::new(AdvisorConfig::default()).unwrap();
    fresh.load(&path).unwrap();
    assert_eq!(fresh.state(), SessionState::Active);
    fresh
        .record_epoch(1, single("a_weights", 1.1), &EpochMetrics::new(0.9, 0.1))
        .unwrap();
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_save_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("session.json");

    let mut session = healthy_session(6);
    session
        .set_thresholds(Thresholds {
            exploding: 20.0,
            lookback_epochs: 4,
            ..Thresholds::default()
        })
        .unwrap();
    session.save(&path).unwrap();

    let mut restored = TrainingSession::new(AdvisorConfig::default()).unwrap();
    restored.load(&path).unwrap();

    assert_eq!(restored.history(), session.history());
    assert_eq!(restored.thresholds(), session.thresholds());
    assert_eq!(restored.metrics(), session.metrics());
    assert_eq!(restored.detect(), session.detect());
}

#[test]
fn test_load_replaces_existing_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.json");

    let mut short = healthy_session(2);
    short.save(&path).unwrap();

    let mut long = healthy_session(10);
    long.suggestions();
    long.load(&path).unwrap();

    assert_eq!(long.history().len(), 2);
    assert_eq!(long.metrics().len(), 2);
    assert!(long.log().is_empty());
}

#[test]
fn test_unknown_format_version_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.json");

    let mut session = healthy_session(3);
    session.save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let mut value: serde_json::Value = serde_json::from_str(&text).unwrap();
    value["formatVersion"] = serde_json::json!("0.9");
    std::fs::write(&path, value.to_string()).unwrap();

    let mut fresh = TrainingSession::new(AdvisorConfig::default()).unwrap();
    let err = fresh.load(&path).unwrap_err();
    assert!(matches!(err, AdvisorError::Format(_)));
    assert!(err.is_persistence());
    assert_eq!(fresh.state(), SessionState::Uninitialized);
}

#[test]
fn test_corrupt_snapshot_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, b"{\"formatVersion\": \"1.0\", \"history\": [").unwrap();

    assert!(matches!(
        Snapshot::load(&path),
        Err(AdvisorError::Format(_))
    ));
}
