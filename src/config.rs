//! Configuration for gradient monitoring and advice.
//!
//! [`Thresholds`] drive anomaly detection; [`AdvisorConfig`] wraps them
//! together with the alerting and low-data parameters.
//!
//! # Example
//!
//! ```rust
//! use gradient_advisor::config::{AdvisorConfig, Thresholds};
//!
//! // Using defaults
//! let config = AdvisorConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Using the builder
//! let config = AdvisorConfig::builder()
//!     .thresholds(Thresholds { exploding: 5.0, ..Thresholds::default() })
//!     .loss_stagnation_epochs(8)
//!     .build();
//! assert_eq!(config.loss_stagnation_epochs, 8);
//!
//! // Loading from file
//! // let config = AdvisorConfig::from_file("advisor.toml")?;
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};

/// Detection thresholds.
///
/// | Parameter | Default | Meaning |
/// |-----------|---------|---------|
/// | `vanishing` | 1e-7 | Norms below this are vanishing |
/// | `exploding` | 10.0 | Norms above this are exploding |
/// | `variance_max` | 0.1 | Max variance of a norm series across the window |
/// | `lookback_epochs` | 3 | Epochs considered by detection |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Lower gradient norm bound.
    #[serde(default = "default_vanishing")]
    pub vanishing: f64,

    /// Upper gradient norm bound.
    #[serde(default = "default_exploding")]
    pub exploding: f64,

    /// Maximum tolerated variance of a statKey's norm across epochs.
    #[serde(default = "default_variance_max")]
    pub variance_max: f64,

    /// Size of the lookback window.
    #[serde(default = "default_lookback_epochs")]
    pub lookback_epochs: u32,
}

fn default_vanishing() -> f64 {
    1e-7
}
fn default_exploding() -> f64 {
    10.0
}
fn default_variance_max() -> f64 {
    0.1
}
fn default_lookback_epochs() -> u32 {
    3
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vanishing: default_vanishing(),
            exploding: default_exploding(),
            variance_max: default_variance_max(),
            lookback_epochs: default_lookback_epochs(),
        }
    }
}

impl Thresholds {
    /// Absolute epoch-to-epoch norm change below which a layer counts as stagnant.
    pub fn stagnation_tolerance(&self) -> f64 {
        self.vanishing * 10.0
    }

    /// Validates the thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::InvalidConfig`] when a bound is non-positive,
    /// non-finite, or the bounds are inverted.
    pub fn validate(&self) -> Result<()> {
        if !(self.vanishing.is_finite() && self.vanishing > 0.0) {
            return Err(AdvisorError::InvalidConfig(
                "vanishing threshold must be a positive finite number".to_string(),
            ));
        }
        if !(self.exploding.is_finite() && self.exploding > self.vanishing) {
            return Err(AdvisorError::InvalidConfig(format!(
                "exploding threshold ({}) must be finite and greater than vanishing ({})",
                self.exploding, self.vanishing
            )));
        }
        if !(self.variance_max.is_finite() && self.variance_max > 0.0) {
            return Err(AdvisorError::InvalidConfig(
                "variance_max must be a positive finite number".to_string(),
            ));
        }
        if self.lookback_epochs == 0 {
            return Err(AdvisorError::InvalidConfig(
                "lookback_epochs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level advisor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Detection thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Epochs over which a <1% relative loss change raises a stagnation warning.
    #[serde(default = "default_loss_stagnation_epochs")]
    pub loss_stagnation_epochs: usize,

    /// Below this many recorded epochs, aggregate confidence is discounted.
    #[serde(default = "default_low_data_epochs")]
    pub low_data_epochs: usize,

    /// Open interval of mean gradient norms reported as healthy.
    #[serde(default = "default_healthy_norm_range")]
    pub healthy_norm_range: (f64, f64),
}

fn default_loss_stagnation_epochs() -> usize {
    5
}
fn default_low_data_epochs() -> usize {
    5
}
fn default_healthy_norm_range() -> (f64, f64) {
    (0.1, 10.0)
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            loss_stagnation_epochs: default_loss_stagnation_epochs(),
            low_data_epochs: default_low_data_epochs(),
            healthy_norm_range: default_healthy_norm_range(),
        }
    }
}

impl AdvisorConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AdvisorConfigBuilder {
        AdvisorConfigBuilder::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AdvisorError::InvalidConfig(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            AdvisorError::InvalidConfig(format!("failed to serialize config: {e}"))
        })?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if self.loss_stagnation_epochs < 2 {
            return Err(AdvisorError::InvalidConfig(
                "loss_stagnation_epochs must be >= 2".to_string(),
            ));
        }

        let (low, high) = self.healthy_norm_range;
        if !(low.is_finite() && high.is_finite() && low < high) {
            return Err(AdvisorError::InvalidConfig(format!(
                "healthy_norm_range ({low}, {high}) must be a finite, non-empty interval"
            )));
        }

        Ok(())
    }
}

/// Builder for [`AdvisorConfig`].
#[derive(Debug, Default)]
pub struct AdvisorConfigBuilder {
    thresholds: Option<Thresholds>,
    loss_stagnation_epochs: Option<usize>,
    low_data_epochs: Option<usize>,
    healthy_norm_range: Option<(f64, f64)>,
}

impl AdvisorConfigBuilder {
    /// Sets the detection thresholds.
    #[must_use]
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    /// Sets the loss stagnation window.
    #[must_use]
    pub fn loss_stagnation_epochs(mut self, epochs: usize) -> Self {
        self.loss_stagnation_epochs = Some(epochs);
        self
    }

    /// Sets the low-data epoch count.
    #[must_use]
    pub fn low_data_epochs(mut self, epochs: usize) -> Self {
        self.low_data_epochs = Some(epochs);
        self
    }

    /// Sets the healthy mean-norm interval.
    #[must_use]
    pub fn healthy_norm_range(mut self, low: f64, high: f64) -> Self {
        self.healthy_norm_range = Some((low, high));
        self
    }

    /// Builds the configuration, filling unset fields with defaults.
    #[must_use]
    pub fn build(self) -> AdvisorConfig {
        let defaults = AdvisorConfig::default();
        AdvisorConfig {
            thresholds: self.thresholds.unwrap_or(defaults.thresholds),
            loss_stagnation_epochs: self
                .loss_stagnation_epochs
                .unwrap_or(defaults.loss_stagnation_epochs),
            low_data_epochs: self.low_data_epochs.unwrap_or(defaults.low_data_epochs),
            healthy_norm_range: self
                .healthy_norm_range
                .unwrap_or(defaults.healthy_norm_range),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdvisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.vanishing, 1e-7);
        assert_eq!(config.thresholds.exploding, 10.0);
        assert_eq!(config.thresholds.variance_max, 0.1);
        assert_eq!(config.thresholds.lookback_epochs, 3);
    }

    #[test]
    fn test_builder_pattern() {
        let config = AdvisorConfig::builder()
            .loss_stagnation_epochs(10)
            .healthy_norm_range(0.5, 5.0)
            .build();

        assert_eq!(config.loss_stagnation_epochs, 10);
        assert_eq!(config.healthy_norm_range, (0.5, 5.0));
        assert_eq!(config.low_data_epochs, 5);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = AdvisorConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: AdvisorConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: AdvisorConfig = toml::from_str(
            r#"
            loss_stagnation_epochs = 7

            [thresholds]
            exploding = 25.0
            "#,
        )
        .unwrap();

        assert_eq!(parsed.loss_stagnation_epochs, 7);
        assert_eq!(parsed.thresholds.exploding, 25.0);
        assert_eq!(parsed.thresholds.vanishing, 1e-7);
        assert_eq!(parsed.thresholds.lookback_epochs, 3);
    }

    #[test]
    fn test_invalid_thresholds() {
        let inverted = Thresholds {
            vanishing: 1.0,
            exploding: 0.5,
            ..Thresholds::default()
        };
        assert!(inverted.validate().is_err());

        let no_window = Thresholds {
            lookback_epochs: 0,
            ..Thresholds::default()
        };
        assert!(no_window.validate().is_err());

        let negative = Thresholds {
            variance_max: -1.0,
            ..Thresholds::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_invalid_norm_range() {
        let config = AdvisorConfig::builder().healthy_norm_range(5.0, 1.0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("advisor.toml");

        let config = AdvisorConfig::builder().low_data_epochs(3).build();
        config.to_file(&path).unwrap();

        let loaded = AdvisorConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
