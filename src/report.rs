//! Session-level reporting surface.

use serde::{Deserialize, Serialize};

use crate::advisor::Suggestion;
use crate::convergence::ConvergenceAnalysis;
use crate::detector::ProblemReport;
use crate::history::GradientHistory;
use crate::stats::Summary;

/// Summary statistics over every recorded norm and intra-tensor variance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    /// `None` until a finite norm has been recorded.
    pub norms: Option<Summary>,
    /// `None` until a finite intra-tensor variance has been recorded.
    pub variances: Option<Summary>,
}

impl SummaryStatistics {
    /// Summarizes every entry of `history`.
    pub fn from_history(history: &GradientHistory) -> Self {
        Self {
            norms: Summary::from_values(&history.all_norms()),
            variances: Summary::from_values(&history.all_variances()),
        }
    }
}

/// Everything a session knows about the run so far.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    /// Anomalies in the current lookback window.
    pub problems: ProblemReport,
    /// Most recent logged suggestion, if any was requested.
    pub suggestion: Option<Suggestion>,
    /// Convergence of the training loss.
    pub convergence: ConvergenceAnalysis,
    /// Norm and variance summaries.
    pub summary: SummaryStatistics,
}

impl SessionReport {
    /// Format as a human-readable report.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "Gradient Advisor Report".to_string(),
            "═══════════════════════".to_string(),
        ];

        match &self.summary.norms {
            Some(norms) => lines.push(format!(
                "Gradient norms: mean {:.4e}, std {:.4e}, range [{:.4e}, {:.4e}] over {} values",
                norms.mean, norms.std_dev, norms.min, norms.max, norms.count
            )),
            None => lines.push("Gradient norms: no data".to_string()),
        }
        if let Some(variances) = &self.summary.variances {
            lines.push(format!(
                "Gradient variances: mean {:.4e}, range [{:.4e}, {:.4e}]",
                variances.mean, variances.min, variances.max
            ));
        }

        let conv = &self.convergence;
        lines.push(format!(
            "Convergence: rate {:.4}, {}, quality {}",
            conv.rate,
            if conv.is_converging {
                "converging"
            } else {
                "not converging"
            },
            conv.quality_tier
        ));
        if conv.estimated_epochs_to_target.is_finite() {
            lines.push(format!(
                "Estimated epochs to target: {:.0}",
                conv.estimated_epochs_to_target
            ));
        }

        lines.push(String::new());
        lines.push("Problems:".to_string());
        lines.push("─────────".to_string());
        for rec in self
            .problems
            .recommendations
            .iter()
            .chain(&conv.recommendations)
        {
            lines.push(format!("  - {rec}"));
        }

        if let Some(suggestion) = &self.suggestion {
            lines.push(String::new());
            lines.push("Suggestion:".to_string());
            lines.push("───────────".to_string());
            lines.extend(suggestion.summary_lines());
        }

        lines.join("\n")
    }
}
