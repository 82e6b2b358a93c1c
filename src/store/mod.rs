//! Store capability: structured requests, transports and sessions.
//!
//! The pipeline never talks to a store directly. It builds [`StoreRequest`]s and hands them to a
//! [`Transport`] obtained from a [`Connector`]; the transport decides how a request is put on the
//! wire. A [`Session`] owns the transport for one run and closes it when dropped, on every exit
//! path.
//!
//! [`memory::MemoryStore`] is an in-process store implementing the same response semantics.

pub mod memory;

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::IndexCatalog;
use crate::error::{IngestionError, IngestionResult};
use crate::index::IndexDefinition;
use crate::outcome::{classify, FatalCause, Outcome};
use crate::types::Document;

/// Structured reply of one store operation.
pub type RawResponse = serde_json::Value;

/// Connectivity failure below the store protocol (refused connection, dropped session, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A validated, lowercase database name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DatabaseName(String);

impl DatabaseName {
    /// Lowercase `name` and check it against the store's naming rules:
    /// a leading letter followed by letters, digits or any of `_$()+-/`.
    pub fn new(name: &str) -> IngestionResult<Self> {
        let lowered = name.trim().to_lowercase();
        let invalid = |reason: &str| IngestionError::InvalidDatabaseName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = lowered.chars();
        match chars.next() {
            None => return Err(invalid("name is empty")),
            Some(c) if !c.is_ascii_lowercase() => {
                return Err(invalid("name must start with a letter"));
            }
            Some(_) => {}
        }
        if let Some(bad) = chars.find(|c| {
            !(c.is_ascii_lowercase() || c.is_ascii_digit() || "_$()+-/".contains(*c))
        }) {
            return Err(invalid(&format!("character '{bad}' is not allowed")));
        }
        Ok(Self(lowered))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// HTTP-style verb of a [`StoreRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Put,
    Post,
}

/// Discriminant of a [`StoreRequest`], handy for logging and test assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    CreateDatabase,
    ListDesignDocuments,
    PutDesignDocument,
    BulkDocs,
}

/// One operation against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    CreateDatabase {
        database: DatabaseName,
    },
    ListDesignDocuments {
        database: DatabaseName,
    },
    PutDesignDocument {
        database: DatabaseName,
        index: IndexDefinition,
    },
    BulkDocs {
        database: DatabaseName,
        docs: Vec<Document>,
    },
}

impl StoreRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            StoreRequest::CreateDatabase { .. } => RequestKind::CreateDatabase,
            StoreRequest::ListDesignDocuments { .. } => RequestKind::ListDesignDocuments,
            StoreRequest::PutDesignDocument { .. } => RequestKind::PutDesignDocument,
            StoreRequest::BulkDocs { .. } => RequestKind::BulkDocs,
        }
    }

    pub fn database(&self) -> &DatabaseName {
        match self {
            StoreRequest::CreateDatabase { database }
            | StoreRequest::ListDesignDocuments { database }
            | StoreRequest::PutDesignDocument { database, .. }
            | StoreRequest::BulkDocs { database, .. } => database,
        }
    }

    pub fn method(&self) -> RequestMethod {
        match self {
            StoreRequest::CreateDatabase { .. } | StoreRequest::PutDesignDocument { .. } => {
                RequestMethod::Put
            }
            StoreRequest::ListDesignDocuments { .. } => RequestMethod::Get,
            StoreRequest::BulkDocs { .. } => RequestMethod::Post,
        }
    }

    /// Path relative to the store root.
    pub fn path(&self) -> String {
        match self {
            StoreRequest::CreateDatabase { database } => format!("/{database}"),
            StoreRequest::ListDesignDocuments { database } => {
                format!("/{database}/_design_docs?include_docs=true")
            }
            StoreRequest::PutDesignDocument { database, index } => {
                format!("/{database}/{}", index.design_id())
            }
            StoreRequest::BulkDocs { database, .. } => format!("/{database}/_bulk_docs"),
        }
    }

    /// JSON body, if the operation carries one.
    pub fn body(&self) -> IngestionResult<Option<serde_json::Value>> {
        Ok(match self {
            StoreRequest::CreateDatabase { .. } | StoreRequest::ListDesignDocuments { .. } => None,
            StoreRequest::PutDesignDocument { index, .. } => Some(index.design_document()),
            StoreRequest::BulkDocs { docs, .. } => {
                Some(serde_json::json!({ "docs": serde_json::to_value(docs)? }))
            }
        })
    }
}

/// Issues operations against a store.
pub trait Transport {
    /// Execute one request and return the store's structured reply.
    fn execute(&mut self, request: &StoreRequest) -> Result<RawResponse, TransportError>;

    /// Release the underlying connection.
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Opens transports.
pub trait Connector {
    type Transport: Transport;

    fn connect(&self) -> Result<Self::Transport, TransportError>;
}

/// A transport scoped to one run; closed on drop.
pub struct Session<T: Transport> {
    transport: T,
    interactions: usize,
    closed: bool,
}

impl<T: Transport> Session<T> {
    /// Acquire a transport from `connector`.
    pub fn open<C>(connector: &C) -> Result<Self, TransportError>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector.connect()?;
        debug!("store session opened");
        Ok(Self {
            transport,
            interactions: 0,
            closed: false,
        })
    }

    /// Execute a request, returning the raw reply.
    pub fn execute(&mut self, request: &StoreRequest) -> Result<RawResponse, TransportError> {
        self.interactions += 1;
        debug!(
            kind = ?request.kind(),
            method = ?request.method(),
            path = %request.path(),
            "store request"
        );
        self.transport.execute(request)
    }

    /// Execute a request and classify its reply; transport failures become fatal outcomes.
    pub fn submit(&mut self, request: &StoreRequest) -> Outcome {
        match self.execute(request) {
            Ok(raw) => classify(&raw),
            Err(e) => Outcome::transport_failure(e.message),
        }
    }

    /// Number of requests issued so far.
    pub fn interactions(&self) -> usize {
        self.interactions
    }

    /// Close the transport now and surface any error.
    pub fn close(mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.transport.close()
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "failed to close store session");
        }
    }
}

/// Read the index catalog of `database`.
///
/// Returns the catalog, or the classified outcome of a reply that is not a listing.
pub fn current_indexes<T: Transport>(
    session: &mut Session<T>,
    database: &DatabaseName,
) -> Result<IndexCatalog, Outcome> {
    let request = StoreRequest::ListDesignDocuments {
        database: database.clone(),
    };
    let raw = session
        .execute(&request)
        .map_err(|e| Outcome::transport_failure(e.message))?;

    match raw.get("rows").and_then(|r| r.as_array()) {
        Some(rows) => Ok(IndexCatalog::from_listing(rows.iter().filter_map(|row| {
            let id = row.get("id")?.as_str()?;
            let field = row
                .get("doc")
                .and_then(|doc| doc.get("field"))
                .and_then(|f| f.as_str());
            Some((id, field))
        }))),
        None => match classify(&raw) {
            Outcome::Ok => Err(Outcome::Fatal {
                cause: FatalCause::UnknownResponse,
                message: format!("expected a design document listing, got {raw}"),
            }),
            failure => Err(failure),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use serde_json::json;

    use super::{
        current_indexes, Connector, DatabaseName, RawResponse, RequestMethod, Session,
        StoreRequest, Transport, TransportError,
    };
    use crate::index::IndexDefinition;
    use crate::outcome::{FatalCause, Outcome, Severity};

    struct Canned {
        reply: RawResponse,
        closes: Rc<Cell<usize>>,
    }

    impl Transport for Canned {
        fn execute(&mut self, _request: &StoreRequest) -> Result<RawResponse, TransportError> {
            Ok(self.reply.clone())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.closes.set(self.closes.get() + 1);
            Ok(())
        }
    }

    struct CannedConnector {
        reply: RawResponse,
        closes: Rc<Cell<usize>>,
    }

    impl Connector for CannedConnector {
        type Transport = Canned;

        fn connect(&self) -> Result<Canned, TransportError> {
            Ok(Canned {
                reply: self.reply.clone(),
                closes: Rc::clone(&self.closes),
            })
        }
    }

    fn connector(reply: RawResponse) -> CannedConnector {
        CannedConnector {
            reply,
            closes: Rc::new(Cell::new(0)),
        }
    }

    fn db() -> DatabaseName {
        DatabaseName::new("climate").unwrap()
    }

    #[test]
    fn database_names_are_lowercased_and_validated() {
        assert_eq!(DatabaseName::new("West_Island").unwrap().as_str(), "west_island");
        assert!(DatabaseName::new("").is_err());
        assert!(DatabaseName::new("1abc").is_err());
        let err = DatabaseName::new("my db").unwrap_err();
        assert!(err.to_string().contains("character ' ' is not allowed"));
    }

    #[test]
    fn requests_describe_their_http_shape() {
        let put = StoreRequest::PutDesignDocument {
            database: db(),
            index: IndexDefinition::for_field("tempC").unwrap(),
        };
        assert_eq!(put.method(), RequestMethod::Put);
        assert_eq!(put.path(), "/climate/_design/tempC");
        assert_eq!(put.body().unwrap().unwrap()["_id"], "_design/tempC");

        let bulk = StoreRequest::BulkDocs {
            database: db(),
            docs: Vec::new(),
        };
        assert_eq!(bulk.method(), RequestMethod::Post);
        assert_eq!(bulk.path(), "/climate/_bulk_docs");
        assert_eq!(bulk.body().unwrap(), Some(json!({"docs": []})));
    }

    #[test]
    fn session_closes_once_on_drop() {
        let c = connector(json!({"ok": true}));
        {
            let mut session = Session::open(&c).unwrap();
            let out = session.submit(&StoreRequest::CreateDatabase { database: db() });
            assert_eq!(out, Outcome::Ok);
            assert_eq!(session.interactions(), 1);
        }
        assert_eq!(c.closes.get(), 1);

        let session = Session::open(&c).unwrap();
        session.close().unwrap();
        assert_eq!(c.closes.get(), 2);
    }

    #[test]
    fn catalog_is_read_from_listing_rows() {
        let c = connector(json!({
            "total_rows": 2,
            "offset": 0,
            "rows": [
                {"id": "_design/timestamp", "key": "_design/timestamp", "value": {"rev": "1-a"}},
                {
                    "id": "_design/wind_speed",
                    "key": "_design/wind_speed",
                    "value": {"rev": "1-b"},
                    "doc": {"_id": "_design/wind_speed", "field": "wind speed"}
                }
            ]
        }));
        let mut session = Session::open(&c).unwrap();
        let catalog = current_indexes(&mut session, &db()).unwrap();
        assert!(catalog.contains("wind_speed"));
        assert!(catalog.contains("timestamp"));
        assert_eq!(catalog.owner("wind_speed"), Some("wind speed"));
        assert_eq!(catalog.owner("timestamp"), None);
    }

    #[test]
    fn catalog_failures_are_classified() {
        let c = connector(json!({"error": "not_found", "reason": "Database does not exist."}));
        let mut session = Session::open(&c).unwrap();
        let err = current_indexes(&mut session, &db()).unwrap_err();
        assert_eq!(err.severity(), Severity::Recoverable);

        let c = connector(json!({"ok": true}));
        let mut session = Session::open(&c).unwrap();
        match current_indexes(&mut session, &db()).unwrap_err() {
            Outcome::Fatal {
                cause: FatalCause::UnknownResponse,
                ..
            } => {}
            other => panic!("unexpected {other:?}"),
        }
    }
}
