//! Source reading and run observability.
//!
//! Most callers should use [`read_source`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can force one with [`IngestionFormat`])
//! - reads the whole artifact into an in-memory [`crate::types::DataSet`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]

pub mod csv;
pub mod json;
pub mod observability;
pub mod unified;

pub use observability::{
    severity_for_error, CompositeObserver, FileObserver, IngestionContext, IngestionObserver,
    IngestionSeverity, TracingObserver,
};
pub use unified::{pending_sources, read_header, read_source, IngestionFormat, STAGED_MARKER};
