//! In-memory [`Connector`]/[`Transport`] implementation.
//!
//! Answers requests with the same response shapes as the document store: `{"ok": true}`,
//! per-document arrays for bulk writes, design document listings, and `{"error": .., "reason": ..}`
//! failures. Replies for a given [`RequestKind`] can be scripted to simulate store or transport
//! failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;

use crate::catalog::DESIGN_PREFIX;

use super::{Connector, RawResponse, RequestKind, StoreRequest, Transport, TransportError};

/// A scripted reply, consumed by the next request of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    /// Return this response without touching the store state.
    Respond(RawResponse),
    /// Fail the request at the transport level.
    Fail(String),
}

#[derive(Default)]
struct Database {
    docs: BTreeMap<String, serde_json::Value>,
    design: BTreeMap<String, serde_json::Value>,
}

#[derive(Default)]
struct State {
    databases: BTreeMap<String, Database>,
    scripted: HashMap<RequestKind, VecDeque<Scripted>>,
    connect_failures: VecDeque<String>,
    requests: Vec<StoreRequest>,
    sessions_opened: usize,
    sessions_closed: usize,
    revisions: u64,
}

impl State {
    fn next_rev(&mut self) -> String {
        self.revisions += 1;
        format!("1-{:032x}", self.revisions)
    }
}

/// In-memory document store; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` directly, bypassing requests.
    pub fn with_database(self, name: &str) -> Self {
        self.lock().databases.entry(name.to_string()).or_default();
        self
    }

    /// Queue a scripted reply for the next request of `kind`.
    pub fn script(&self, kind: RequestKind, reply: Scripted) {
        self.lock().scripted.entry(kind).or_default().push_back(reply);
    }

    /// Make the next `connect` call fail.
    pub fn fail_next_connect(&self, message: &str) {
        self.lock().connect_failures.push_back(message.to_string());
    }

    /// Every request executed so far, in order.
    pub fn requests(&self) -> Vec<StoreRequest> {
        self.lock().requests.clone()
    }

    /// Number of executed requests of `kind`.
    pub fn count(&self, kind: RequestKind) -> usize {
        self.lock().requests.iter().filter(|r| r.kind() == kind).count()
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.lock().databases.contains_key(name)
    }

    /// Stored document by id.
    pub fn document(&self, database: &str, id: &str) -> Option<serde_json::Value> {
        self.lock().databases.get(database)?.docs.get(id).cloned()
    }

    pub fn document_count(&self, database: &str) -> usize {
        self.lock().databases.get(database).map_or(0, |db| db.docs.len())
    }

    /// Index names (design documents without prefix) of `database`, sorted.
    pub fn index_names(&self, database: &str) -> Vec<String> {
        self.lock()
            .databases
            .get(database)
            .map(|db| db.design.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Sessions opened but not yet closed.
    pub fn open_sessions(&self) -> usize {
        let state = self.lock();
        state.sessions_opened - state.sessions_closed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryStore {
    type Transport = MemoryTransport;

    fn connect(&self) -> Result<MemoryTransport, TransportError> {
        let mut state = self.lock();
        if let Some(message) = state.connect_failures.pop_front() {
            return Err(TransportError::new(message));
        }
        state.sessions_opened += 1;
        Ok(MemoryTransport {
            store: self.clone(),
            open: true,
        })
    }
}

/// Transport handed out by [`MemoryStore::connect`].
pub struct MemoryTransport {
    store: MemoryStore,
    open: bool,
}

impl Transport for MemoryTransport {
    fn execute(&mut self, request: &StoreRequest) -> Result<RawResponse, TransportError> {
        if !self.open {
            return Err(TransportError::new("session is closed"));
        }
        let mut state = self.store.lock();
        state.requests.push(request.clone());

        let scripted = state
            .scripted
            .get_mut(&request.kind())
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Scripted::Respond(reply)) => return Ok(reply),
            Some(Scripted::Fail(message)) => return Err(TransportError::new(message)),
            None => {}
        }

        Ok(apply(&mut state, request))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.open {
            self.open = false;
            self.store.lock().sessions_closed += 1;
        }
        Ok(())
    }
}

fn apply(state: &mut State, request: &StoreRequest) -> RawResponse {
    let name = request.database().as_str().to_string();
    let rev = state.next_rev();

    match state.databases.get_mut(&name) {
        Some(db) => apply_to_database(db, request, rev),
        None => match request {
            StoreRequest::CreateDatabase { .. } => {
                state.databases.insert(name, Database::default());
                json!({"ok": true})
            }
            _ => error("not_found", "Database does not exist."),
        },
    }
}

fn apply_to_database(db: &mut Database, request: &StoreRequest, rev: String) -> RawResponse {
    match request {
        StoreRequest::CreateDatabase { .. } => error(
            "file_exists",
            "The database could not be created, the file already exists.",
        ),
        StoreRequest::ListDesignDocuments { .. } => {
            let rows: Vec<serde_json::Value> = db
                .design
                .iter()
                .map(|(name, doc)| {
                    let id = format!("{DESIGN_PREFIX}{name}");
                    json!({
                        "id": id.clone(),
                        "key": id,
                        "value": {"rev": doc["_rev"].clone()},
                        "doc": doc,
                    })
                })
                .collect();
            json!({"total_rows": rows.len(), "offset": 0, "rows": rows})
        }
        StoreRequest::PutDesignDocument { index, .. } => {
            if db.design.contains_key(&index.name) {
                return error("conflict", "Document update conflict.");
            }
            let compiles = index.map_function.trim_start().starts_with("function")
                && index.map_function.contains("emit(");
            if !compiles {
                return error("compilation_error", "Expression does not eval to a function.");
            }
            let mut doc = index.design_document();
            doc["_rev"] = json!(rev.clone());
            db.design.insert(index.name.clone(), doc);
            json!({"ok": true, "id": index.design_id(), "rev": rev})
        }
        StoreRequest::BulkDocs { docs, .. } => {
            let results: Vec<serde_json::Value> = docs
                .iter()
                .map(|doc| {
                    if db.docs.contains_key(&doc.id) {
                        return json!({
                            "id": doc.id.clone(),
                            "error": "conflict",
                            "reason": "Document update conflict."
                        });
                    }
                    let mut stored = serde_json::to_value(doc).unwrap_or_default();
                    stored["_rev"] = json!(rev.clone());
                    db.docs.insert(doc.id.clone(), stored);
                    json!({"ok": true, "id": doc.id.clone(), "rev": rev.clone()})
                })
                .collect();
            serde_json::Value::Array(results)
        }
    }
}

fn error(tag: &str, reason: &str) -> RawResponse {
    json!({"error": tag, "reason": reason})
}
