//! `docstore-ingest` loads tabular measurement data into a schemaless document store and keeps
//! one server-side index per source field in sync with the data.
//!
//! The primary entrypoint is [`pipeline::Pipeline::run`], which takes one source artifact through
//! the whole run:
//!
//! - read the source (CSV, JSON array or NDJSON, by extension) into a [`types::DataSet`]
//! - map every row to a [`types::Document`] whose `_id` is the row's `timestamp`
//! - bulk-write the documents, in chunks if the batch is too large for one request
//! - list the indexes already on the store and create one for every new field
//! - delete the source, or move it to a conflict area if anything went wrong
//!
//! Every store reply is classified by [`outcome::classify`] as ok, recoverable (the run goes on)
//! or fatal (the source is quarantined).
//!
//! ## What a store looks like
//!
//! The crate does not ship a network client. A store is reached through the
//! [`store::Connector`]/[`store::Transport`] traits, which execute structured
//! [`store::StoreRequest`]s. [`store::memory::MemoryStore`] implements them in-process with the
//! store's response shapes and is what the tests use.
//!
//! ## Quick example
//!
//! ```no_run
//! use docstore_ingest::config::PipelineOptions;
//! use docstore_ingest::pipeline::{initialize_database, Pipeline};
//! use docstore_ingest::store::memory::MemoryStore;
//! use docstore_ingest::store::DatabaseName;
//!
//! # fn main() -> Result<(), docstore_ingest::IngestionError> {
//! let store = MemoryStore::new();
//! let db = DatabaseName::new("climate")?;
//! initialize_database(&store, &db)?;
//!
//! let pipeline = Pipeline::new(store, PipelineOptions::default());
//! for report in pipeline.run_pending("incoming/", &db)? {
//!     println!("{}: {:?}", report.source.display(), report.disposition);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Observability
//!
//! Runs emit `tracing` events inside an `ingest_run` span. For callbacks, attach an
//! [`ingestion::IngestionObserver`] with [`pipeline::Pipeline::with_observer`];
//! [`ingestion::TracingObserver`], [`ingestion::FileObserver`] and
//! [`ingestion::CompositeObserver`] are provided.

pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod ingestion;
pub mod mapping;
pub mod outcome;
pub mod pipeline;
pub mod quarantine;
pub mod schema;
pub mod store;
pub mod types;
pub mod writer;

pub use error::{IngestionError, IngestionResult};
