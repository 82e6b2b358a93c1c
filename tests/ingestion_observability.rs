use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use docstore_ingest::config::PipelineOptions;
use docstore_ingest::ingestion::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
};
use docstore_ingest::outcome::Outcome;
use docstore_ingest::pipeline::{Disposition, IndexReport, IngestionReport, Pipeline};
use docstore_ingest::store::memory::MemoryStore;
use docstore_ingest::store::DatabaseName;
use docstore_ingest::IngestionError;

#[derive(Default)]
struct RecordingObserver {
    writes: Mutex<Vec<Outcome>>,
    indexes: Mutex<Vec<String>>,
    dispositions: Mutex<Vec<Disposition>>,
    failures: Mutex<Vec<IngestionSeverity>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_write(&self, _ctx: &IngestionContext, outcome: &Outcome) {
        self.writes.lock().unwrap().push(outcome.clone());
    }

    fn on_index(&self, _ctx: &IngestionContext, index: &IndexReport) {
        self.indexes.lock().unwrap().push(index.index.clone());
    }

    fn on_disposition(&self, _ctx: &IngestionContext, report: &IngestionReport) {
        self.dispositions.lock().unwrap().push(report.disposition);
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn tmp_file(name: &str, contents: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("docstore-ingest-obs-{nanos}"));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn climate() -> DatabaseName {
    DatabaseName::new("climate").unwrap()
}

#[test]
fn observer_sees_every_stage_of_a_completed_run() {
    let source = tmp_file("readings.csv", "timestamp,tempC,humidity\nT1,20,40\n");
    let obs = Arc::new(RecordingObserver::default());
    let store = MemoryStore::new().with_database("climate");

    Pipeline::new(store, PipelineOptions::default())
        .with_observer(obs.clone())
        .run(&source, &climate())
        .unwrap();

    assert_eq!(*obs.writes.lock().unwrap(), vec![Outcome::Ok]);
    assert_eq!(*obs.indexes.lock().unwrap(), vec!["tempC", "humidity"]);
    assert_eq!(*obs.dispositions.lock().unwrap(), vec![Disposition::Completed]);
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_and_alert_on_critical_transport_error() {
    let source = tmp_file("readings.csv", "timestamp,tempC\nT1,20\n");
    let obs = Arc::new(RecordingObserver::default());
    let store = MemoryStore::new().with_database("climate");
    store.fail_next_connect("connection refused");

    Pipeline::new(store, PipelineOptions::default())
        .with_observer(obs.clone())
        .run(&source, &climate())
        .unwrap();

    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestionSeverity::Critical]);
    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestionSeverity::Critical]);
    assert_eq!(*obs.dispositions.lock().unwrap(), vec![Disposition::Quarantined]);
    assert!(obs.writes.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_without_alert_for_non_critical_error() {
    let source = tmp_file("readings.csv", "tempC\n20\n");
    let obs = Arc::new(RecordingObserver::default());

    Pipeline::new(MemoryStore::new(), PipelineOptions::default())
        .with_observer(obs.clone())
        .run(&source, &climate())
        .unwrap();

    assert_eq!(*obs.failures.lock().unwrap(), vec![IngestionSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn lower_alert_threshold_alerts_on_errors() {
    let source = tmp_file("readings.csv", "tempC\n20\n");
    let obs = Arc::new(RecordingObserver::default());
    let options = PipelineOptions {
        alert_at_or_above: IngestionSeverity::Error,
        ..Default::default()
    };

    Pipeline::new(MemoryStore::new(), options)
        .with_observer(obs.clone())
        .run(&source, &climate())
        .unwrap();

    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestionSeverity::Error]);
}

#[test]
fn composite_fans_out_and_file_observer_appends_lines() {
    let source = tmp_file("readings.csv", "tempC\n20\n");
    let log = source.with_file_name("ingest.log");
    let recorder = Arc::new(RecordingObserver::default());
    let observers: Vec<Arc<dyn IngestionObserver>> =
        vec![recorder.clone(), Arc::new(FileObserver::new(&log))];
    let composite = CompositeObserver::new(observers);

    Pipeline::new(MemoryStore::new(), PipelineOptions::default())
        .with_observer(Arc::new(composite))
        .run(&source, &climate())
        .unwrap();

    assert_eq!(recorder.failures.lock().unwrap().len(), 1);
    let text = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("fail severity=Error db=climate"));
    assert!(lines[0].contains("missing key field 'timestamp'"));
    assert!(lines[1].contains("disposition=Quarantined"));
}
