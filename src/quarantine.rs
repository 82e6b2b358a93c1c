//! Final disposition of source artifacts.
//!
//! The [`QuarantineRouter`] is the only place that deletes or moves a source. Completed runs
//! delete the source; quarantined runs move it into a [`ConflictArea`] so it can be inspected or
//! retried. Transient artifacts produced during the run are deleted in both cases.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ValueMode;
use crate::error::IngestionResult;
use crate::ingestion::{read_source, IngestionFormat};
use crate::pipeline::Disposition;
use crate::types::DataSet;

/// Default marker appended to the stem of quarantined sources.
pub const DEFAULT_CONFLICT_SUFFIX: &str = "_conflict";

/// Where quarantined sources go.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictArea {
    /// Rename in place: `data.csv` becomes `data<suffix>.csv`.
    Suffix(String),
    /// Move into this directory, keeping the file name.
    Directory(PathBuf),
}

impl Default for ConflictArea {
    fn default() -> Self {
        ConflictArea::Suffix(DEFAULT_CONFLICT_SUFFIX.to_string())
    }
}

impl ConflictArea {
    /// Marker identifying quarantined files when sweeping a directory, if any.
    pub fn suffix(&self) -> &str {
        match self {
            ConflictArea::Suffix(s) => s,
            ConflictArea::Directory(_) => "",
        }
    }

    /// First free destination for `source`; never an existing file.
    pub fn destination(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let (dir, base) = match self {
            ConflictArea::Suffix(suffix) => (
                source.parent().map(Path::to_path_buf).unwrap_or_default(),
                format!("{stem}{suffix}"),
            ),
            ConflictArea::Directory(dir) => (dir.clone(), stem),
        };

        let mut candidate = dir.join(format!("{base}{ext}"));
        let mut n = 1usize;
        while candidate.exists() {
            candidate = dir.join(format!("{base}-{n}{ext}"));
            n += 1;
        }
        candidate
    }
}

/// Source artifact lifecycle.
pub trait SourceRepository {
    /// Read the source into a dataset.
    fn read(&self, source: &Path) -> IngestionResult<DataSet>;

    /// Move the source into the conflict area; `None` if it no longer exists.
    fn relocate(&self, source: &Path) -> IngestionResult<Option<PathBuf>>;

    /// Delete an artifact; `false` if it no longer exists.
    fn delete(&self, path: &Path) -> IngestionResult<bool>;
}

/// Filesystem-backed [`SourceRepository`].
#[derive(Debug, Clone, Default)]
pub struct FsRepository {
    pub format: Option<IngestionFormat>,
    pub value_mode: ValueMode,
    pub conflict_area: ConflictArea,
}

impl FsRepository {
    pub fn new(conflict_area: ConflictArea) -> Self {
        Self {
            conflict_area,
            ..Default::default()
        }
    }
}

impl SourceRepository for FsRepository {
    fn read(&self, source: &Path) -> IngestionResult<DataSet> {
        read_source(source, self.format, self.value_mode)
    }

    fn relocate(&self, source: &Path) -> IngestionResult<Option<PathBuf>> {
        if !source.exists() {
            return Ok(None);
        }
        if let ConflictArea::Directory(dir) = &self.conflict_area {
            fs::create_dir_all(dir)?;
        }
        let target = self.conflict_area.destination(source);
        move_file(source, &target)?;
        Ok(Some(target))
    }

    fn delete(&self, path: &Path) -> IngestionResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// What happened to the source artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAction {
    Deleted,
    Relocated(PathBuf),
    /// The source was already gone; nothing to do.
    AlreadyGone,
}

/// Result of routing one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReport {
    pub source: SourceAction,
    /// Transient artifacts that were deleted (missing ones are skipped).
    pub purged: Vec<PathBuf>,
}

/// Enacts dispositions through a [`SourceRepository`].
#[derive(Debug, Clone, Default)]
pub struct QuarantineRouter<R> {
    repository: R,
}

impl<R: SourceRepository> QuarantineRouter<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Purge `transient` and delete or relocate `source` according to `disposition`.
    pub fn route(
        &self,
        source: &Path,
        transient: &[PathBuf],
        disposition: Disposition,
    ) -> IngestionResult<RouteReport> {
        let mut purged = Vec::with_capacity(transient.len());
        for path in transient {
            if self.repository.delete(path)? {
                purged.push(path.clone());
            }
        }

        let action = match disposition {
            Disposition::Completed => {
                if self.repository.delete(source)? {
                    SourceAction::Deleted
                } else {
                    SourceAction::AlreadyGone
                }
            }
            Disposition::Quarantined => match self.repository.relocate(source)? {
                Some(target) => SourceAction::Relocated(target),
                None => SourceAction::AlreadyGone,
            },
        };

        match &action {
            SourceAction::Deleted => info!(source = %source.display(), "source deleted"),
            SourceAction::Relocated(target) => warn!(
                source = %source.display(),
                target = %target.display(),
                "source quarantined"
            ),
            SourceAction::AlreadyGone => warn!(source = %source.display(), "source already gone"),
        }

        Ok(RouteReport {
            source: action,
            purged,
        })
    }
}

/// Rename `source` to `target`, copying across filesystems. Other rename errors are returned.
fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(source, target) {
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            fs::copy(source, target)?;
            fs::remove_file(source)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    use std::io;

    use super::{move_file, ConflictArea, FsRepository, QuarantineRouter, SourceAction};
    use crate::pipeline::Disposition;

    fn tmp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("docstore-ingest-quarantine-{tag}-{nanos}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn touch(path: &Path) {
        fs::write(path, "timestamp,tempC\nT1,20\n").unwrap();
    }

    #[test]
    fn suffix_destination_never_overwrites() {
        let dir = tmp_dir("suffix");
        let source = dir.join("data.csv");
        let area = ConflictArea::default();
        assert_eq!(area.destination(&source), dir.join("data_conflict.csv"));

        touch(&dir.join("data_conflict.csv"));
        assert_eq!(area.destination(&source), dir.join("data_conflict-1.csv"));
    }

    #[test]
    fn failed_rename_is_reported_and_leaves_the_source() {
        let dir = tmp_dir("rename-error");
        let source = dir.join("data.csv");
        touch(&source);

        let err = move_file(&source, &dir.join("missing").join("data.csv")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(source.exists());

        move_file(&source, &dir.join("moved.csv")).unwrap();
        assert!(!source.exists());
        assert!(dir.join("moved.csv").exists());
    }

    #[test]
    fn completed_deletes_source_and_transients() {
        let dir = tmp_dir("completed");
        let source = dir.join("data.csv");
        let staged = dir.join("data.json");
        touch(&source);
        touch(&staged);

        let router = QuarantineRouter::new(FsRepository::default());
        let report = router
            .route(&source, &[staged.clone()], Disposition::Completed)
            .unwrap();
        assert_eq!(report.source, SourceAction::Deleted);
        assert_eq!(report.purged, vec![staged.clone()]);
        assert!(!source.exists());
        assert!(!staged.exists());
    }

    #[test]
    fn quarantined_relocates_into_directory() {
        let dir = tmp_dir("directory");
        let conflicts = dir.join("conflicts");
        let source = dir.join("data.csv");
        touch(&source);

        let router = QuarantineRouter::new(FsRepository::new(ConflictArea::Directory(conflicts.clone())));
        let report = router.route(&source, &[], Disposition::Quarantined).unwrap();
        assert_eq!(report.source, SourceAction::Relocated(conflicts.join("data.csv")));
        assert!(!source.exists());
        assert!(conflicts.join("data.csv").exists());
    }

    #[test]
    fn missing_artifacts_are_not_errors() {
        let dir = tmp_dir("missing");
        let router = QuarantineRouter::new(FsRepository::default());
        let report = router
            .route(&dir.join("gone.csv"), &[dir.join("gone.json")], Disposition::Quarantined)
            .unwrap();
        assert_eq!(report.source, SourceAction::AlreadyGone);
        assert!(report.purged.is_empty());
    }
}
