//! # gradient-advisor
//!
//! Training-time diagnostics for iterative optimization. The advisor watches
//! per-epoch gradient statistics and losses, flags pathological optimization
//! conditions, estimates convergence and emits prioritized, confidence-scored
//! suggestions and real-time alerts.
//!
//! ## Overview
//!
//! ```text
//!  training loop
//!       │  GradientStatistics / GradientSource, EpochMetrics
//!       ▼
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ GradientHistory │────▶│ AnomalyDetector  │────▶│ AdvisoryEngine  │
//! └─────────────────┘     └──────────────────┘     └────────┬────────┘
//!       │                                                    │
//!       │ TrainingMetrics ──▶ ConvergenceAnalyzer            ▼
//!       ▼                                          Suggestion, Alerts
//!   Snapshot (JSON)
//! ```
//!
//! - **Vanishing / exploding gradients**: any norm in the lookback window
//!   outside `[vanishing, exploding]`
//! - **High variance**: norm variance across epochs above `variance_max`
//! - **Stagnation**: a layer whose norms stopped moving
//! - **Convergence**: log-linear fit of the recent loss curve
//!
//! ## Quick Start
//!
//! ```rust
//! use gradient_advisor::prelude::*;
//!
//! let mut session = TrainingSession::new(AdvisorConfig::default())?;
//! session.setup_monitoring(["conv1", "fc"]);
//!
//! for epoch in 0..10u64 {
//!     let stats = GradientStatistics::from_raw([
//!         ("conv1_weights", vec![0.02, -0.01, 0.03]),
//!         ("fc_weights", vec![0.5, -0.4]),
//!     ]);
//!     let metrics = EpochMetrics::new(2.0 / (epoch + 1) as f64, 0.1 * epoch as f64);
//!
//!     for alert in session.check_alerts(epoch, &metrics) {
//!         println!("{}", alert.format());
//!     }
//!     session.record_epoch(epoch, stats, &metrics)?;
//! }
//!
//! let suggestion = session.suggestions();
//! assert!(suggestion.confidence() <= 1.0);
//! # Ok::<(), AdvisorError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod advisor;
pub mod alerts;
pub mod config;
pub mod convergence;
pub mod detector;
pub mod error;
pub mod history;
pub mod metrics;
pub mod report;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod stats;

pub use advisor::{AdvisoryEngine, HyperParams, Priority, Suggestion};
pub use alerts::{Alert, AlertKind, AlertSeverity};
pub use config::{AdvisorConfig, Thresholds};
pub use convergence::{ConvergenceAnalysis, ConvergenceAnalyzer, QualityTier};
pub use detector::{AnomalyDetector, ProblemReport};
pub use error::{AdvisorError, Result};
pub use history::{GradientHistory, GradientStatistics, ParamStats};
pub use metrics::{EpochMetrics, TrainingMetrics};
pub use report::SessionReport;
pub use session::{RecordOutcome, SessionState, TrainingSession};
pub use snapshot::Snapshot;
pub use source::{GradientSource, GradientSourceError};

/// Commonly used types.
pub mod prelude {
    pub use crate::advisor::{
        AdvisoryEngine, ArchitectureChange, HyperParams, LearningRateAction, OptimizerKind,
        Priority, ScheduleAction, Suggestion,
    };
    pub use crate::alerts::{Alert, AlertKind, AlertSeverity};
    pub use crate::config::{AdvisorConfig, Thresholds};
    pub use crate::error::{AdvisorError, Result};
    pub use crate::history::{GradientStatistics, ParamStats};
    pub use crate::metrics::EpochMetrics;
    pub use crate::session::{RecordOutcome, TrainingSession};
    pub use crate::source::{GradientSource, GradientSourceError};
}
