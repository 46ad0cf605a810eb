//! Per-epoch gradient statistics and their append-only history.
//!
//! A statKey identifies one parameter group within one layer, e.g.
//! `conv1_weights` or `fc2_biases`. Keys are assembled from an explicit
//! `(layer, group)` pair at record time so that layer membership is an exact
//! split, never a substring search.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdvisorError, Result};
use crate::stats;

/// Parameter group suffixes recognized when splitting a statKey.
pub const PARAM_GROUPS: &[&str] = &["weights", "biases"];

/// Builds a statKey from a layer name and parameter group.
pub fn stat_key(layer: &str, group: &str) -> String {
    format!("{layer}_{group}")
}

/// Splits a statKey into its base layer and parameter group.
///
/// Keys without a recognized group suffix are treated as a whole layer.
///
/// ```rust
/// use gradient_advisor::history::split_stat_key;
///
/// assert_eq!(split_stat_key("conv1_weights"), ("conv1", Some("weights")));
/// assert_eq!(split_stat_key("embedding"), ("embedding", None));
/// ```
pub fn split_stat_key(key: &str) -> (&str, Option<&str>) {
    for group in PARAM_GROUPS {
        if let Some(layer) = key
            .strip_suffix(group)
            .and_then(|rest| rest.strip_suffix('_'))
        {
            if !layer.is_empty() {
                return (layer, Some(*group));
            }
        }
    }
    (key, None)
}

/// Summary of one parameter group's gradient for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamStats {
    /// L2 norm of the flattened gradient.
    #[serde(with = "stats::nullable_float")]
    pub norm: f64,
    /// Variance of the gradient entries (intra-tensor).
    #[serde(with = "stats::nullable_float")]
    pub variance: f64,
    /// Mean of the gradient entries.
    #[serde(with = "stats::nullable_float")]
    pub mean: f64,
}

impl ParamStats {
    /// Creates statistics from precomputed values.
    pub fn new(norm: f64, variance: f64, mean: f64) -> Self {
        Self {
            norm,
            variance,
            mean,
        }
    }

    /// Reduces a flat gradient vector.
    ///
    /// Returns `None` for an empty vector or one containing NaN/Inf.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        Some(Self {
            norm,
            variance: stats::population_variance(values),
            mean: stats::mean(values),
        })
    }

    /// Whether the statistics satisfy `norm >= 0`, `variance >= 0` and are finite.
    pub fn is_valid(&self) -> bool {
        self.norm.is_finite()
            && self.norm >= 0.0
            && self.variance.is_finite()
            && self.variance >= 0.0
            && self.mean.is_finite()
    }
}

/// Gradient statistics for every tracked parameter group in one epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradientStatistics {
    params: BTreeMap<String, ParamStats>,
}

impl GradientStatistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduces raw flat gradient vectors keyed by statKey.
    ///
    /// Entries that cannot be reduced (empty or non-finite) are dropped.
    pub fn from_raw<K, V, I>(gradients: I) -> Self
    where
        K: Into<String>,
        V: AsRef<[f64]>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut out = Self::new();
        for (key, values) in gradients {
            let key = key.into();
            match ParamStats::from_values(values.as_ref()) {
                Some(stats) => {
                    out.params.insert(key, stats);
                }
                None => tracing::debug!("Dropping malformed gradient for {}", key),
            }
        }
        out
    }

    /// Inserts statistics under a full statKey.
    pub fn insert(&mut self, key: impl Into<String>, stats: ParamStats) {
        self.params.insert(key.into(), stats);
    }

    /// Inserts statistics for a `(layer, group)` pair.
    pub fn insert_param(&mut self, layer: &str, group: &str, stats: ParamStats) {
        self.params.insert(stat_key(layer, group), stats);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, stats: ParamStats) -> Self {
        self.insert(key, stats);
        self
    }

    /// Statistics stored under `key`.
    pub fn get(&self, key: &str) -> Option<&ParamStats> {
        self.params.get(key)
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamStats)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Only the entries satisfying [`ParamStats::is_valid`].
    pub fn valid(&self) -> impl Iterator<Item = (&str, &ParamStats)> {
        self.iter().filter(|(_, s)| s.is_valid())
    }

    /// Mean norm over valid entries, `None` if there are none.
    pub fn mean_norm(&self) -> Option<f64> {
        let norms: Vec<f64> = self.valid().map(|(_, s)| s.norm).collect();
        if norms.is_empty() {
            None
        } else {
            Some(stats::mean(&norms))
        }
    }

    /// Number of parameter groups, valid or not.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether no parameter group is present.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// One recorded epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Epoch the statistics were collected at.
    pub epoch: u64,
    /// Statistics for that epoch.
    pub stats: GradientStatistics,
}

/// Append-only, strictly epoch-ordered gradient history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradientHistory {
    entries: Vec<HistoryEntry>,
}

impl GradientHistory {
    /// Empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a history from entries, enforcing epoch ordering.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Ordering`] on the first out-of-order entry.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Result<Self> {
        let mut history = Self::new();
        for entry in entries {
            history.append(entry.epoch, entry.stats)?;
        }
        Ok(history)
    }

    /// Appends statistics for `epoch`.
    ///
    /// Gaps between epochs are allowed; the epoch must be strictly greater
    /// than the last one stored.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Ordering`] if `epoch <= last_epoch`. The
    /// history is left unchanged.
    pub fn append(&mut self, epoch: u64, stats: GradientStatistics) -> Result<()> {
        if let Some(last) = self.last_epoch() {
            if epoch <= last {
                return Err(AdvisorError::Ordering { epoch, last });
            }
        }
        self.entries.push(HistoryEntry { epoch, stats });
        Ok(())
    }

    /// The last `min(n, len)` entries, most recent last.
    pub fn window(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Epoch of the most recent entry.
    pub fn last_epoch(&self) -> Option<u64> {
        self.entries.last().map(|e| e.epoch)
    }

    /// Number of recorded epochs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All valid norms across every epoch.
    pub fn all_norms(&self) -> Vec<f64> {
        self.entries
            .iter()
            .flat_map(|e| e.stats.valid().map(|(_, s)| s.norm))
            .collect()
    }

    /// All valid intra-tensor variances across every epoch.
    pub fn all_variances(&self) -> Vec<f64> {
        self.entries
            .iter()
            .flat_map(|e| e.stats.valid().map(|(_, s)| s.variance))
            .collect()
    }
}
