use std::path::PathBuf;

use thiserror::Error;

use crate::store::TransportError;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned across the ingestion pipeline.
///
/// This is a single error enum shared by source reading, mapping, index synthesis, store
/// interactions and the quarantine router.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The source artifact does not exist.
    #[error("source not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    /// The source artifact exists but has no header row (or an empty one).
    #[error("source is empty: {source_name} has no header row")]
    EmptySource { source_name: String },

    /// A row (or the whole header) lacks the natural key field.
    #[error(
        "missing key field '{field}'{}",
        .row.map(|r| format!(" at row {r}")).unwrap_or_default()
    )]
    MissingKeyField { field: String, row: Option<usize> },

    /// A batch exceeds the transport's argument budget and cannot be split further.
    #[error("batch too large: {cells} cells over {documents} documents exceeds the limit of {limit}")]
    BatchTooLarge {
        documents: usize,
        cells: usize,
        limit: usize,
    },

    /// The store could not be reached (connect/execute failed below the protocol level).
    #[error("transport failure: {0}")]
    TransportFailure(#[from] TransportError),

    /// The store rejected part of an operation in a way that does not abort the run.
    #[error("recoverable store error '{tag}': {message}")]
    RecoverableStore { tag: String, message: String },

    /// The store rejected an operation outright.
    #[error("fatal store error '{tag}': {message}")]
    FatalStore { tag: String, message: String },

    /// The store replied with something that is not a recognized response shape.
    #[error("unknown store response: {raw}")]
    UnknownResponse { raw: String },

    /// A field name cannot be turned into a unique, non-empty index name.
    #[error("invalid index name for field '{field}': {reason}")]
    InvalidIndexName { field: String, reason: String },

    /// The database name violates the store's naming rules.
    #[error("invalid database name '{name}': {reason}")]
    InvalidDatabaseName { name: String, reason: String },

    /// The input does not have the shape the reader expects (unknown format, non-object rows, ...).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Underlying I/O error (e.g. permission denied while relocating).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid TOML configuration.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Invalid glob pattern while scanning for pending sources.
    #[error("pattern error: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A directory entry could not be read while scanning for pending sources.
    #[error("glob error: {0}")]
    Glob(#[from] glob::GlobError),
}
