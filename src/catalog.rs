//! Index catalog and schema diffing.

use std::collections::BTreeMap;

use crate::error::{IngestionError, IngestionResult};
use crate::index::{index_name, IndexDefinition};
use crate::types::{Schema, TIMESTAMP_FIELD};

/// Prefix of design document ids; stripping it yields the index name.
pub const DESIGN_PREFIX: &str = "_design/";

/// Index names currently registered on the store, with the field each one was built for when
/// the store reports it.
///
/// Read fresh for every run; the store is the source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexCatalog {
    names: BTreeMap<String, Option<String>>,
}

impl IndexCatalog {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(|n| (n.into(), None)).collect(),
        }
    }

    /// Build a catalog from `(design id, field)` pairs as listed by the store.
    ///
    /// Ids without the design prefix are ignored. A missing field leaves the owner unknown.
    pub fn from_listing<'a>(entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        Self {
            names: entries
                .into_iter()
                .filter_map(|(id, field)| {
                    let name = id.strip_prefix(DESIGN_PREFIX)?;
                    Some((name.to_owned(), field.map(str::to_owned)))
                })
                .collect(),
        }
    }

    /// Build a catalog from design document ids, ignoring ids without the design prefix.
    pub fn from_design_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_listing(ids.into_iter().map(|id| (id, None)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Field the index `name` was built for, if the index exists and its field is known.
    pub fn owner(&self, name: &str) -> Option<&str> {
        self.names.get(name).and_then(|f| f.as_deref())
    }

    /// Record an index as present.
    pub fn insert(&mut self, definition: &IndexDefinition) {
        self.names
            .insert(definition.name.clone(), Some(definition.field.clone()));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Fields of `schema` that have no index in `catalog`, in schema order.
///
/// The timestamp field is never reported; its index is installed when the database is created.
pub fn diff(schema: &Schema, catalog: &IndexCatalog) -> Vec<String> {
    schema
        .field_names()
        .filter(|f| *f != TIMESTAMP_FIELD)
        .filter(|f| !catalog.contains(&index_name(f)))
        .map(str::to_owned)
        .collect()
}

/// Fail if a field of `schema` maps to an index name the store already uses for another field.
///
/// Indexes whose field the store does not report are taken to belong to the field that maps to
/// their name.
pub fn check_owners(schema: &Schema, catalog: &IndexCatalog) -> IngestionResult<()> {
    for field in schema.field_names().filter(|f| *f != TIMESTAMP_FIELD) {
        let name = index_name(field);
        if let Some(owner) = catalog.owner(&name) {
            if owner != field {
                return Err(IngestionError::InvalidIndexName {
                    field: field.to_string(),
                    reason: format!("index name '{name}' is already used by field '{owner}'"),
                });
            }
        }
    }
    Ok(())
}
