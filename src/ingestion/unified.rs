//! Unified source reading.
//!
//! Most callers should use [`read_source`], which reads a file into an in-memory
//! [`crate::types::DataSet`], choosing the reader by file extension unless a format is forced.
//! [`pending_sources`] lists the ingestible files of a directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ValueMode;
use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Schema};

use super::{csv, json};

/// Stem marker of staged document snapshots (`<stem>.staged.json`); never picked up as sources.
pub const STAGED_MARKER: &str = ".staged";

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// JSON array-of-objects or NDJSON.
    Json,
}

impl IngestionFormat {
    /// Parse an ingestion format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" => Some(Self::Json),
            _ => None,
        }
    }

    /// Resolve the format for `path`: `forced` if set, otherwise by extension.
    pub fn resolve(path: &Path, forced: Option<Self>) -> IngestionResult<Self> {
        match forced {
            Some(f) => Ok(f),
            None => infer_format_from_path(path),
        }
    }
}

/// Read a source file into a [`DataSet`].
///
/// Fails with [`IngestionError::SourceNotFound`] if `path` does not exist and with
/// [`IngestionError::EmptySource`] if it has no header.
pub fn read_source(
    path: impl AsRef<Path>,
    format: Option<IngestionFormat>,
    mode: ValueMode,
) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestionError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    match IngestionFormat::resolve(path, format)? {
        IngestionFormat::Csv => csv::read_csv_from_path(path, mode),
        IngestionFormat::Json => json::read_json_from_path(path),
    }
}

/// Read only the field names of a source file.
///
/// For CSV this touches the header row alone; JSON sources have no header, so the whole
/// document is parsed to collect keys.
pub fn read_header(path: impl AsRef<Path>, format: Option<IngestionFormat>) -> IngestionResult<Schema> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(IngestionError::SourceNotFound {
            path: path.to_path_buf(),
        });
    }
    match IngestionFormat::resolve(path, format)? {
        IngestionFormat::Csv => csv::read_csv_header_from_path(path),
        IngestionFormat::Json => json::read_json_from_path(path).map(|ds| ds.schema),
    }
}

/// List ingestible sources (`*.csv`, `*.json`, `*.ndjson`) directly inside `dir`, sorted by path.
///
/// Files whose stem contains `conflict_suffix` are quarantined leftovers and are skipped, as are
/// staged snapshots.
pub fn pending_sources(dir: impl AsRef<Path>, conflict_suffix: &str) -> IngestionResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let escaped = glob::Pattern::escape(&dir.display().to_string());

    let mut out = Vec::new();
    for ext in ["csv", "json", "ndjson"] {
        let pattern = format!("{escaped}/*.{ext}");
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            if !path.is_file() {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            let quarantined = !conflict_suffix.is_empty() && stem.contains(conflict_suffix);
            if !quarantined && !stem.ends_with(STAGED_MARKER) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn infer_format_from_path(path: &Path) -> IngestionResult<IngestionFormat> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| IngestionError::SchemaMismatch {
            message: format!(
                "cannot infer format: path has no extension ({})",
                path.display()
            ),
        })?;

    IngestionFormat::from_extension(ext).ok_or_else(|| IngestionError::SchemaMismatch {
        message: format!(
            "cannot infer format from extension '{ext}' for path ({})",
            path.display()
        ),
    })
}
