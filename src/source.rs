//! Boundary to the external gradient provider.
//!
//! The advisor never inspects framework tensors. A [`GradientSource`] hands it
//! [`GradientStatistics`] for an epoch, either pre-reduced or reduced from flat
//! vectors with [`GradientStatistics::from_raw`].
//!
//! # Example
//!
//! ```rust
//! use gradient_advisor::history::{GradientStatistics, ParamStats};
//! use gradient_advisor::source::{GradientSource, GradientSourceError};
//!
//! let mut source = |epoch: u64| -> Result<GradientStatistics, GradientSourceError> {
//!     if epoch == 3 {
//!         return Err(GradientSourceError::Unavailable("hook detached".into()));
//!     }
//!     Ok(GradientStatistics::from_raw([("fc_weights", vec![0.1, -0.2, 0.05])]))
//! };
//!
//! assert!(source.collect(1).is_ok());
//! assert!(source.collect(3).is_err());
//! ```

use thiserror::Error;

use crate::history::GradientStatistics;

/// Failures reported by a gradient source.
#[derive(Debug, Error)]
pub enum GradientSourceError {
    /// Gradients could not be produced this epoch.
    #[error("gradients unavailable: {0}")]
    Unavailable(String),

    /// Gradients were produced but are unusable.
    #[error("malformed gradient for {key}: {reason}")]
    Malformed {
        /// The offending parameter key.
        key: String,
        /// What was wrong.
        reason: String,
    },

    /// The source produced no parameter groups at all.
    #[error("gradient source returned no parameter groups")]
    Empty,
}

/// Supplies per-epoch gradient statistics.
pub trait GradientSource {
    /// Collects statistics for `epoch`.
    ///
    /// # Errors
    ///
    /// Returns a [`GradientSourceError`] if statistics cannot be produced.
    fn collect(&mut self, epoch: u64) -> Result<GradientStatistics, GradientSourceError>;
}

impl<F> GradientSource for F
where
    F: FnMut(u64) -> Result<GradientStatistics, GradientSourceError>,
{
    fn collect(&mut self, epoch: u64) -> Result<GradientStatistics, GradientSourceError> {
        self(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ParamStats;

    struct Recorded {
        calls: Vec<u64>,
    }

    impl GradientSource for Recorded {
        fn collect(&mut self, epoch: u64) -> Result<GradientStatistics, GradientSourceError> {
            self.calls.push(epoch);
            Ok(GradientStatistics::new().with("l1_weights", ParamStats::new(0.5, 0.01, 0.0)))
        }
    }

    #[test]
    fn test_struct_source() {
        let mut source = Recorded { calls: Vec::new() };
        let stats = source.collect(4).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(source.calls, vec![4]);
    }

    #[test]
    fn test_closure_source_error() {
        let mut source =
            |_epoch: u64| -> Result<GradientStatistics, GradientSourceError> {
                Err(GradientSourceError::Empty)
            };
        let err = source.collect(0).unwrap_err();
        assert_eq!(err.to_string(), "gradient source returned no parameter groups");
    }
}
