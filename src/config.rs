//! Pipeline configuration.
//!
//! [`PipelineOptions`] has sensible defaults and can also be loaded from TOML:
//!
//! ```toml
//! value_mode = "inferred"
//! stage_documents = true
//! alert_at_or_above = "error"
//!
//! [batch]
//! max_cells = 2000
//! policy = "reject"
//!
//! [conflict_area]
//! directory = "/data/conflicts"
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::IngestionResult;
use crate::ingestion::{IngestionFormat, IngestionSeverity};
use crate::quarantine::ConflictArea;

/// Transport argument budget observed for a single bulk request (rows × fields), inclusive.
pub const DEFAULT_MAX_CELLS: usize = 4_300;

/// How CSV cells are turned into [`crate::types::Value`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueMode {
    /// Keep every cell as the exact string found in the file.
    #[default]
    Text,
    /// Empty cells become nulls; integer, float and `true`/`false` cells become typed values.
    Inferred,
}

/// What to do with a document batch that exceeds [`BatchLimits::max_cells`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Split the batch into sequential requests that each fit the limit.
    #[default]
    Chunk,
    /// Fail with [`crate::IngestionError::BatchTooLarge`] before contacting the store.
    Reject,
}

/// Size bound for a single bulk request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchLimits {
    /// Most cells one request may carry; a batch of exactly this many is sent whole.
    pub max_cells: usize,
    pub policy: BatchPolicy,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_cells: DEFAULT_MAX_CELLS,
            policy: BatchPolicy::default(),
        }
    }
}

/// Options controlling one [`crate::pipeline::Pipeline`].
///
/// Use [`Default`] for common cases.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// If `None`, the source format is inferred from the file extension.
    pub format: Option<IngestionFormat>,
    /// CSV cell conversion.
    pub value_mode: ValueMode,
    /// Bulk request size bound.
    pub batch: BatchLimits,
    /// Write the mapped documents to `<stem>.staged.json` next to the source before the bulk write.
    ///
    /// The snapshot is a transient artifact and is purged by the quarantine router.
    pub stage_documents: bool,
    /// Where quarantined sources are moved.
    pub conflict_area: ConflictArea,
    /// Severity threshold at which observers receive `on_alert`.
    pub alert_at_or_above: IngestionSeverity,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            format: None,
            value_mode: ValueMode::default(),
            batch: BatchLimits::default(),
            stage_documents: false,
            conflict_area: ConflictArea::default(),
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl PipelineOptions {
    /// Parse options from a TOML document. Missing keys take their default.
    pub fn from_toml_str(input: &str) -> IngestionResult<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Read and parse a TOML options file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> IngestionResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
