use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::error::IngestionError;
use crate::outcome::{Outcome, Severity};
use crate::pipeline::{Disposition, IndexReport, IngestionReport};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (recoverable store outcome).
    Warning,
    /// Error-level event (the run was quarantined).
    Error,
    /// Critical error (I/O or transport failures).
    Critical,
}

impl From<Severity> for IngestionSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Ok => IngestionSeverity::Info,
            Severity::Recoverable => IngestionSeverity::Warning,
            Severity::Fatal => IngestionSeverity::Error,
        }
    }
}

/// Map an error to the severity it is reported with.
pub fn severity_for_error(error: &IngestionError) -> IngestionSeverity {
    match error {
        IngestionError::Io(_) | IngestionError::TransportFailure(_) | IngestionError::Glob(_) => {
            IngestionSeverity::Critical
        }
        IngestionError::Csv(e) if matches!(e.kind(), ::csv::ErrorKind::Io(_)) => IngestionSeverity::Critical,
        IngestionError::RecoverableStore { .. } => IngestionSeverity::Warning,
        _ => IngestionSeverity::Error,
    }
}

/// Which run an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    /// The source artifact being ingested.
    pub source: PathBuf,
    /// Target database.
    pub database: String,
}

/// Observer interface for ingestion runs.
///
/// Every method has a no-op default; implementors pick the events they care about.
pub trait IngestionObserver: Send + Sync {
    /// Called once the bulk write has an aggregate outcome.
    fn on_write(&self, _ctx: &IngestionContext, _outcome: &Outcome) {}

    /// Called after each index creation attempt.
    fn on_index(&self, _ctx: &IngestionContext, _index: &IndexReport) {}

    /// Called once the source has been routed.
    fn on_disposition(&self, _ctx: &IngestionContext, _report: &IngestionReport) {}

    /// Called when a run fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_write(&self, ctx: &IngestionContext, outcome: &Outcome) {
        for o in &self.observers {
            o.on_write(ctx, outcome);
        }
    }

    fn on_index(&self, ctx: &IngestionContext, index: &IndexReport) {
        for o in &self.observers {
            o.on_index(ctx, index);
        }
    }

    fn on_disposition(&self, ctx: &IngestionContext, report: &IngestionReport) {
        for o in &self.observers {
            o.on_disposition(ctx, report);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Emits run events as `tracing` events.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_write(&self, ctx: &IngestionContext, outcome: &Outcome) {
        match outcome.severity() {
            Severity::Ok => info!(source = %ctx.source.display(), db = %ctx.database, "bulk write ok"),
            Severity::Recoverable => warn!(
                source = %ctx.source.display(),
                db = %ctx.database,
                %outcome,
                "bulk write partially rejected"
            ),
            Severity::Fatal => error!(
                source = %ctx.source.display(),
                db = %ctx.database,
                %outcome,
                "bulk write failed"
            ),
        }
    }

    fn on_index(&self, ctx: &IngestionContext, index: &IndexReport) {
        if index.outcome.is_ok() || index.outcome.is_already_exists() {
            info!(db = %ctx.database, index = %index.index, field = %index.field, "index ready");
        } else {
            warn!(
                db = %ctx.database,
                index = %index.index,
                field = %index.field,
                outcome = %index.outcome,
                "index not created"
            );
        }
    }

    fn on_disposition(&self, ctx: &IngestionContext, report: &IngestionReport) {
        match report.disposition {
            Disposition::Completed => info!(
                source = %ctx.source.display(),
                db = %ctx.database,
                documents = report.documents,
                "ingestion completed"
            ),
            Disposition::Quarantined => warn!(
                source = %ctx.source.display(),
                db = %ctx.database,
                stage = ?report.stage,
                "ingestion quarantined"
            ),
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(
            source = %ctx.source.display(),
            db = %ctx.database,
            ?severity,
            %error,
            "ingestion failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(
            alert = true,
            source = %ctx.source.display(),
            db = %ctx.database,
            ?severity,
            %error,
            "ingestion alert"
        );
    }
}

/// Appends run events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", unix_ts());
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_write(&self, ctx: &IngestionContext, outcome: &Outcome) {
        self.append_line(&format!(
            "write db={} source={} outcome={outcome}",
            ctx.database,
            ctx.source.display()
        ));
    }

    fn on_index(&self, ctx: &IngestionContext, index: &IndexReport) {
        self.append_line(&format!(
            "index db={} index={} outcome={}",
            ctx.database, index.index, index.outcome
        ));
    }

    fn on_disposition(&self, ctx: &IngestionContext, report: &IngestionReport) {
        self.append_line(&format!(
            "disposition={:?} db={} source={} documents={}",
            report.disposition,
            ctx.database,
            ctx.source.display(),
            report.documents
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "fail severity={severity:?} db={} source={} err={error}",
            ctx.database,
            ctx.source.display()
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} db={} source={} err={error}",
            ctx.database,
            ctx.source.display()
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
