//! Error types for gradient monitoring and advisory operations.
//!
//! Only a few operations can fail. Detection, convergence analysis and
//! suggestion generation are total: degenerate input (no history, a single
//! epoch, empty loss curves) produces neutral, low-confidence output rather
//! than an error. Errors surface at the edges:
//!
//! - **Ordering**: an epoch was appended out of order
//! - **Format**: a snapshot is corrupt or has an unrecognized version
//! - **I/O**: snapshot save/load failed
//! - **Gradient source**: the external collaborator could not produce statistics

use thiserror::Error;

use crate::session::SessionState;
use crate::source::GradientSourceError;

/// Result type alias for advisor operations.
pub type Result<T> = std::result::Result<T, AdvisorError>;

/// Errors raised by the gradient advisor.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// An epoch was recorded that is not strictly after the last one.
    #[error("epoch {epoch} is not after the last recorded epoch {last}")]
    Ordering {
        /// The rejected epoch.
        epoch: u64,
        /// The last epoch already stored.
        last: u64,
    },

    /// Snapshot is corrupt, inconsistent, or has an unknown format version.
    #[error("snapshot format error: {0}")]
    Format(String),

    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation not allowed in the current session state.
    #[error("{operation} requires an active session (state: {state})")]
    InvalidState {
        /// Current session state.
        state: SessionState,
        /// The rejected operation.
        operation: &'static str,
    },

    /// The gradient source failed to produce statistics.
    #[error("gradient source error: {0}")]
    GradientSource(#[from] GradientSourceError),

    /// Filesystem error during save or load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdvisorError {
    /// Whether this error came from the storage layer rather than from
    /// caller misuse.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            Self::Format(_) | Self::Io(_) | Self::Serialization(_)
        )
    }
}
