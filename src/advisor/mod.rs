//! Optimization advisory engine.
//!
//! Turns a [`ProblemReport`](crate::detector::ProblemReport) and the training
//! metrics into a confidence-scored [`Suggestion`] and real-time alerts.

mod engine;
mod suggestion;

pub use engine::AdvisoryEngine;
pub use suggestion::{
    Advice, ArchitectureChange, Assessment, HyperParams, LearningRateAction, OptimizerChoice,
    OptimizerKind, Priority, RegularizationPlan, ScheduleAction, Suggestion, NEUTRAL_CONFIDENCE,
};
