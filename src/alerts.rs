//! Real-time training alerts.
//!
//! Alerts are produced fresh by [`AdvisoryEngine::check_alerts`] on every call
//! and are never persisted. Severities are independent: one call may yield a
//! critical, several warnings and an info alert together.
//!
//! [`AdvisoryEngine::check_alerts`]: crate::advisor::AdvisoryEngine::check_alerts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational (e.g., gradients in a healthy range)
    Info,
    /// May require attention (e.g., stagnation, high variance)
    Warning,
    /// Requires immediate action (vanishing or exploding gradients)
    Critical,
}

impl AlertSeverity {
    /// Returns a colored string representation for terminal output
    pub fn as_colored_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "\x1b[34mINFO\x1b[0m",
            AlertSeverity::Warning => "\x1b[33mWARNING\x1b[0m",
            AlertSeverity::Critical => "\x1b[31mCRITICAL\x1b[0m",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What an alert was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A layer's norm exceeded the exploding threshold
    ExplodingGradients,
    /// A layer's norm fell below the vanishing threshold
    VanishingGradients,
    /// Norms swing widely across epochs
    HighVariance,
    /// A layer's norms stopped moving
    GradientStagnation,
    /// Training loss is flat
    LossStagnation,
    /// Mean norm is inside the healthy range
    HealthyGradients,
}

/// Training alert record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// How urgent the alert is
    pub severity: AlertSeverity,
    /// What triggered it
    pub kind: AlertKind,
    /// Human-readable alert message
    pub message: String,
    /// Concrete remediation, if any
    pub action_required: Option<String>,
    /// Epoch the alert refers to
    pub epoch: u64,
    /// When the alert was raised
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Create a new alert without a required action.
    pub fn new(severity: AlertSeverity, kind: AlertKind, message: String, epoch: u64) -> Self {
        Self {
            severity,
            kind,
            message,
            action_required: None,
            epoch,
            timestamp: Utc::now(),
        }
    }

    /// Attach a remediation.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action_required = Some(action.into());
        self
    }

    /// Format alert for display
    pub fn format(&self) -> String {
        let mut line = format!(
            "[{}] Epoch {}: {}",
            self.severity.as_colored_str(),
            self.epoch,
            self.message
        );
        if let Some(action) = &self.action_required {
            line.push_str(" -> ");
            line.push_str(action);
        }
        line
    }
}

/// Count alerts of a given severity.
pub fn count_by_severity(alerts: &[Alert], severity: AlertSeverity) -> usize {
    alerts.iter().filter(|a| a.severity == severity).count()
}

/// Highest severity present, if any.
pub fn max_severity(alerts: &[Alert]) -> Option<AlertSeverity> {
    alerts.iter().map(|a| a.severity).max()
}
