//! Source schema extraction.

use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::{read_header, IngestionFormat};
use crate::types::{DataSet, Schema};

/// Field names of an already-read dataset, in header order.
///
/// Fails with [`IngestionError::EmptySource`] if the dataset has no fields.
pub fn extract(dataset: &DataSet) -> IngestionResult<Schema> {
    if dataset.schema.is_empty() {
        return Err(IngestionError::EmptySource {
            source_name: "dataset".to_string(),
        });
    }
    Ok(dataset.schema.clone())
}

/// Field names of the source at `path`, reading as little of it as the format allows.
///
/// Fails with [`IngestionError::SourceNotFound`] if the file does not exist and with
/// [`IngestionError::EmptySource`] if it has no header.
pub fn extract_from_path(
    path: impl AsRef<Path>,
    format: Option<IngestionFormat>,
) -> IngestionResult<Schema> {
    read_header(path, format)
}
