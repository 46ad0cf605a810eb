//! Versioned JSON snapshots of a training session.
//!
//! A snapshot carries everything needed to resume analysis: thresholds, the
//! monitored layers, the full gradient history and the training metrics. The
//! analysis log and alerts are derived state and are not persisted.
//!
//! ```json
//! {
//!   "formatVersion": "1.0",
//!   "createdAt": "2026-01-01T00:00:00Z",
//!   "thresholds": { "vanishing": 1e-7, "exploding": 10.0, ... },
//!   "layerIdentities": ["conv1", "fc"],
//!   "history": [ { "epoch": 0, "stats": { "conv1_weights": { ... } } } ],
//!   "metrics": { "epochs": [0], "loss": [2.3], ... }
//! }
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::Thresholds;
use crate::error::{AdvisorError, Result};
use crate::history::GradientHistory;
use crate::metrics::TrainingMetrics;

/// Format version written by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// Format versions this crate can read.
pub const SUPPORTED_VERSIONS: &[&str] = &[FORMAT_VERSION];

/// Persisted session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// One of [`SUPPORTED_VERSIONS`].
    pub format_version: String,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Detection thresholds of the session.
    pub thresholds: Thresholds,
    /// Registered layers.
    pub layer_identities: Vec<String>,
    /// Gradient history.
    pub history: GradientHistory,
    /// Training metrics.
    pub metrics: TrainingMetrics,
}

/// Only the version field, read before committing to the full schema.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Header {
    format_version: Option<String>,
}

impl Snapshot {
    /// Creates a snapshot stamped with the current format version and time.
    pub fn new(
        thresholds: Thresholds,
        layer_identities: Vec<String>,
        history: GradientHistory,
        metrics: TrainingMetrics,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            created_at: Utc::now(),
            thresholds,
            layer_identities,
            history,
            metrics,
        }
    }

    /// Writes the snapshot as JSON.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// a failed save never leaves a truncated snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created, written or
    /// persisted.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| AdvisorError::Io(e.error))?;

        tracing::info!(
            path = %path.display(),
            epochs = self.history.len(),
            "Saved session snapshot"
        );
        Ok(())
    }

    /// Reads and validates a snapshot.
    ///
    /// # Errors
    ///
    /// - [`AdvisorError::Io`] if the file cannot be read
    /// - [`AdvisorError::Format`] if the content is not valid JSON, the
    ///   version is missing or unsupported, or the stored series are
    ///   inconsistent
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let value: serde_json::Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AdvisorError::Format(format!("corrupt snapshot: {e}")))?;

        let snapshot = Self::from_value(value)?;
        tracing::info!(
            path = %path.display(),
            version = %snapshot.format_version,
            epochs = snapshot.history.len(),
            "Loaded session snapshot"
        );
        Ok(snapshot)
    }

    /// Parses a snapshot from a JSON string.
    ///
    /// # Errors
    ///
    /// Same as [`Snapshot::load`], minus I/O.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| AdvisorError::Format(format!("corrupt snapshot: {e}")))?;
        Self::from_value(value)
    }

    fn from_value(value: serde_json::Value) -> Result<Self> {
        let header = Header::deserialize(&value)
            .map_err(|e| AdvisorError::Format(format!("unreadable snapshot header: {e}")))?;
        let version = header
            .format_version
            .ok_or_else(|| AdvisorError::Format("missing formatVersion".to_string()))?;
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(AdvisorError::Format(format!(
                "unsupported formatVersion {version:?} (supported: {})",
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        let snapshot: Self = serde_json::from_value(value)
            .map_err(|e| AdvisorError::Format(format!("invalid snapshot body: {e}")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Checks thresholds, epoch ordering and metric alignment.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisorError::Format`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        self.thresholds
            .validate()
            .map_err(|e| AdvisorError::Format(format!("invalid thresholds: {e}")))?;
        GradientHistory::from_entries(self.history.entries().to_vec())
            .map_err(|e| AdvisorError::Format(format!("invalid history: {e}")))?;
        self.metrics.validate()
    }
}
