//! The ingestion run.
//!
//! A [`Pipeline`] takes one source artifact through
//! `Start → Mapped → Written → Reconciled → Disposed`:
//!
//! 1. read the source, then extract its schema and map its rows in parallel
//! 2. bulk-write the documents through one store [`Session`]
//! 3. diff the schema against the store's index catalog and create the missing indexes
//! 4. hand the source to the [`QuarantineRouter`]: delete it when the run completed, quarantine it
//!    otherwise
//!
//! Local failures (unreadable source, missing timestamps, oversized batches, unusable field
//! names) quarantine the source without contacting the store. Fatal store outcomes quarantine it
//! immediately. Only routing failures are returned as `Err`; everything else is reported in the
//! [`IngestionReport`].
//!
//! ```no_run
//! use docstore_ingest::config::PipelineOptions;
//! use docstore_ingest::pipeline::{Disposition, Pipeline};
//! use docstore_ingest::store::memory::MemoryStore;
//! use docstore_ingest::store::DatabaseName;
//!
//! # fn main() -> Result<(), docstore_ingest::IngestionError> {
//! let store = MemoryStore::new().with_database("climate");
//! let pipeline = Pipeline::new(store, PipelineOptions::default());
//! let report = pipeline.run("climate.csv", &DatabaseName::new("climate")?)?;
//! assert_eq!(report.disposition, Disposition::Completed);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn, Level};

use crate::catalog::{check_owners, diff};
use crate::config::PipelineOptions;
use crate::error::{IngestionError, IngestionResult};
use crate::index::{self, IndexDefinition};
use crate::ingestion::{
    pending_sources, severity_for_error, IngestionContext, IngestionObserver, STAGED_MARKER,
};
use crate::mapping::map_documents;
use crate::outcome::{Outcome, Severity};
use crate::quarantine::{FsRepository, QuarantineRouter, SourceAction, SourceRepository};
use crate::schema;
use crate::store::{current_indexes, Connector, DatabaseName, Session, StoreRequest};
use crate::types::{Document, TIMESTAMP_FIELD};
use crate::writer::{plan_batches, write_documents};

/// Final routing decision for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Everything was written and indexed; the source is deleted.
    Completed,
    /// Something failed; the source is moved to the conflict area.
    Quarantined,
}

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    Start,
    Mapped,
    Written,
    Reconciled,
    Disposed,
}

/// Result of one index creation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub field: String,
    /// Store-side index name.
    pub index: String,
    pub outcome: Outcome,
}

impl IndexReport {
    /// The index exists after the attempt, whether created now or earlier.
    pub fn is_ready(&self) -> bool {
        self.outcome.is_ok() || self.outcome.is_already_exists()
    }
}

/// Everything a run did.
#[derive(Debug)]
pub struct IngestionReport {
    pub source: PathBuf,
    pub database: String,
    /// Documents mapped from the source.
    pub documents: usize,
    /// Ids whose earlier row was replaced by a later row with the same timestamp.
    pub overwritten: Vec<String>,
    /// Fields that had no index when the run reached reconciliation.
    pub missing_indexes: Vec<String>,
    /// `None` if the run stopped before writing.
    pub write_outcome: Option<Outcome>,
    pub index_outcomes: Vec<IndexReport>,
    /// Last stage completed before the source was disposed.
    pub stage: RunStage,
    /// The error that forced quarantine, if any.
    pub failure: Option<IngestionError>,
    pub disposition: Disposition,
    pub source_action: SourceAction,
    /// Transient artifacts deleted by the router.
    pub purged: Vec<PathBuf>,
}

impl IngestionReport {
    fn new(source: &Path, database: &DatabaseName) -> Self {
        Self {
            source: source.to_path_buf(),
            database: database.to_string(),
            documents: 0,
            overwritten: Vec::new(),
            missing_indexes: Vec::new(),
            write_outcome: None,
            index_outcomes: Vec::new(),
            stage: RunStage::Start,
            failure: None,
            disposition: Disposition::Quarantined,
            source_action: SourceAction::AlreadyGone,
            purged: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.disposition == Disposition::Completed
    }

    fn advance(&mut self, stage: RunStage) {
        debug!(from = ?self.stage, to = ?stage, "run stage");
        self.stage = stage;
    }
}

/// Result of [`initialize_database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub database: String,
    pub create_outcome: Outcome,
    /// `None` if database creation failed.
    pub index_outcome: Option<Outcome>,
}

impl InitReport {
    /// The database and its timestamp index exist, created now or earlier.
    pub fn is_initialized(&self) -> bool {
        let ready = |o: &Outcome| o.is_ok() || o.is_already_exists();
        ready(&self.create_outcome) && self.index_outcome.as_ref().is_some_and(ready)
    }
}

/// Create `database` and install its timestamp index.
///
/// A database or index that already exists counts as initialized. Only a failure to reach the
/// store is returned as `Err`.
pub fn initialize_database<C: Connector>(
    connector: &C,
    database: &DatabaseName,
) -> IngestionResult<InitReport> {
    let mut session = Session::open(connector)?;

    let create_outcome = session.submit(&StoreRequest::CreateDatabase {
        database: database.clone(),
    });
    if !(create_outcome.is_ok() || create_outcome.is_already_exists()) {
        warn!(db = %database, outcome = %create_outcome, "database not created");
        return Ok(InitReport {
            database: database.to_string(),
            create_outcome,
            index_outcome: None,
        });
    }

    let index_outcome = session.submit(&StoreRequest::PutDesignDocument {
        database: database.clone(),
        index: IndexDefinition::timestamp(),
    });
    info!(db = %database, create = %create_outcome, index = %index_outcome, "database initialized");

    Ok(InitReport {
        database: database.to_string(),
        create_outcome,
        index_outcome: Some(index_outcome),
    })
}

/// Path of the staged document snapshot for `source`: `<stem>.staged.json` beside it.
pub fn staged_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}{STAGED_MARKER}.json"))
}

/// Runs sources into one store.
pub struct Pipeline<C, R = FsRepository> {
    connector: C,
    router: QuarantineRouter<R>,
    options: PipelineOptions,
    observer: Option<Arc<dyn IngestionObserver>>,
}

impl<C, R> fmt::Debug for Pipeline<C, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("options", &self.options)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn IngestionObserver>"))
            .finish()
    }
}

impl<C: Connector> Pipeline<C, FsRepository> {
    /// A pipeline reading and routing sources on the local filesystem.
    pub fn new(connector: C, options: PipelineOptions) -> Self {
        let repository = FsRepository {
            format: options.format,
            value_mode: options.value_mode,
            conflict_area: options.conflict_area.clone(),
        };
        Self::with_repository(connector, repository, options)
    }
}

impl<C: Connector, R: SourceRepository> Pipeline<C, R> {
    pub fn with_repository(connector: C, repository: R, options: PipelineOptions) -> Self {
        Self {
            connector,
            router: QuarantineRouter::new(repository),
            options,
            observer: None,
        }
    }

    /// Report run events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Ingest `source` into `database` and dispose of it.
    pub fn run(&self, source: impl AsRef<Path>, database: &DatabaseName) -> IngestionResult<IngestionReport> {
        let source = source.as_ref();
        let span = info_span!("ingest_run", source = %source.display(), db = %database);
        let _entered = span.enter();

        let ctx = IngestionContext {
            source: source.to_path_buf(),
            database: database.to_string(),
        };
        let mut report = IngestionReport::new(source, database);
        let mut transient = Vec::new();

        let disposition = match self.ingest(source, database, &ctx, &mut report, &mut transient) {
            Ok(disposition) => disposition,
            Err(e) => {
                self.notify_failure(&ctx, &e);
                report.failure = Some(e);
                Disposition::Quarantined
            }
        };

        let routed = match self.router.route(source, &transient, disposition) {
            Ok(routed) => routed,
            Err(e) => {
                self.notify_failure(&ctx, &e);
                return Err(e);
            }
        };
        debug!(from = ?report.stage, to = ?RunStage::Disposed, "run stage");
        report.disposition = disposition;
        report.source_action = routed.source;
        report.purged = routed.purged;

        if let Some(obs) = &self.observer {
            obs.on_disposition(&ctx, &report);
        }
        Ok(report)
    }

    /// Ingest every pending source in `dir`, in path order.
    ///
    /// Quarantined files and staged snapshots are skipped. Stops at the first routing failure.
    pub fn run_pending(&self, dir: impl AsRef<Path>, database: &DatabaseName) -> IngestionResult<Vec<IngestionReport>> {
        let sources = pending_sources(dir, self.options.conflict_area.suffix())?;
        info!(count = sources.len(), db = %database, "pending sources");
        sources.iter().map(|source| self.run(source, database)).collect()
    }

    /// Everything up to routing. `Err` means the source must be quarantined.
    fn ingest(
        &self,
        source: &Path,
        database: &DatabaseName,
        ctx: &IngestionContext,
        report: &mut IngestionReport,
        transient: &mut Vec<PathBuf>,
    ) -> IngestionResult<Disposition> {
        let dataset = self.router.repository().read(source)?;
        let (schema, mapped) = rayon::join(|| schema::extract(&dataset), || map_documents(&dataset));
        let schema = schema?;
        let mapped = mapped?;

        report.documents = mapped.len();
        if !mapped.overwritten.is_empty() {
            warn!(ids = ?mapped.overwritten, "duplicate timestamps overwritten by later rows");
        }
        report.overwritten = mapped.overwritten;
        let documents = mapped.documents;

        // Names are validated against the whole schema before the store is touched.
        let fields: Vec<String> = schema
            .field_names()
            .filter(|f| *f != TIMESTAMP_FIELD)
            .map(str::to_owned)
            .collect();
        let definitions = index::build(&fields)?;
        plan_batches(&documents, &self.options.batch)?;
        report.advance(RunStage::Mapped);

        if self.options.stage_documents {
            let staged = staged_path(source);
            transient.push(staged.clone());
            stage_documents(&staged, &documents)?;
        }

        let mut session = Session::open(&self.connector)?;

        let write = write_documents(&mut session, database, &documents, &self.options.batch)?;
        log_outcome("bulk write", &write);
        if let Some(obs) = &self.observer {
            obs.on_write(ctx, &write);
        }
        report.write_outcome = Some(write.clone());
        if write.is_fatal() {
            return Err(outcome_error(&write));
        }
        report.advance(RunStage::Written);

        let catalog = current_indexes(&mut session, database).map_err(|o| {
            log_outcome("index listing", &o);
            outcome_error(&o)
        })?;
        check_owners(&schema, &catalog)?;
        let missing = diff(&schema, &catalog);
        report.missing_indexes = missing.clone();
        if missing.is_empty() {
            debug!("all indexes present");
            report.advance(RunStage::Reconciled);
            return Ok(Disposition::Completed);
        }

        let mut first_failure = None;
        for definition in definitions.into_iter().filter(|d| missing.contains(&d.field)) {
            let outcome = session.submit(&StoreRequest::PutDesignDocument {
                database: database.clone(),
                index: definition.clone(),
            });
            let index_report = IndexReport {
                field: definition.field,
                index: definition.name,
                outcome,
            };
            if index_report.outcome.is_already_exists() {
                info!(index = %index_report.index, "index already present");
            } else {
                log_outcome("index creation", &index_report.outcome);
            }
            if let Some(obs) = &self.observer {
                obs.on_index(ctx, &index_report);
            }

            let fatal = index_report.outcome.is_fatal();
            if !index_report.is_ready() && first_failure.is_none() {
                first_failure = Some(outcome_error(&index_report.outcome));
            }
            report.index_outcomes.push(index_report);
            if fatal {
                break;
            }
        }
        report.advance(RunStage::Reconciled);

        match first_failure {
            Some(e) => Err(e),
            None => Ok(Disposition::Completed),
        }
    }

    fn notify_failure(&self, ctx: &IngestionContext, error: &IngestionError) {
        let Some(obs) = &self.observer else {
            return;
        };
        let severity = severity_for_error(error);
        obs.on_failure(ctx, severity, error);
        if severity >= self.options.alert_at_or_above {
            obs.on_alert(ctx, severity, error);
        }
    }
}

fn stage_documents(path: &Path, documents: &[Document]) -> IngestionResult<()> {
    let bytes = serde_json::to_vec_pretty(documents)?;
    fs::write(path, bytes)?;
    debug!(path = %path.display(), documents = documents.len(), "documents staged");
    Ok(())
}

/// Level a store outcome is logged at; successful outcomes are not logged.
fn outcome_level(outcome: &Outcome) -> Option<Level> {
    match outcome.severity() {
        Severity::Ok => None,
        Severity::Recoverable => Some(Level::WARN),
        Severity::Fatal => Some(Level::ERROR),
    }
}

fn log_outcome(action: &str, outcome: &Outcome) {
    match outcome_level(outcome) {
        Some(level) if level == Level::ERROR => error!(%outcome, "{action} failed"),
        Some(_) => warn!(%outcome, "{action} hit a recoverable failure"),
        None => {}
    }
}

fn outcome_error(outcome: &Outcome) -> IngestionError {
    outcome.to_error().unwrap_or_else(|| IngestionError::UnknownResponse {
        raw: outcome.to_string(),
    })
}
