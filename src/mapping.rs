//! Row-to-document mapping.

use std::collections::HashMap;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Document, ID_FIELD, TIMESTAMP_FIELD};

/// Documents mapped from one dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedDocuments {
    /// One document per distinct timestamp.
    pub documents: Vec<Document>,
    /// Ids whose earlier row was replaced by a later row with the same timestamp.
    pub overwritten: Vec<String>,
}

impl MappedDocuments {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Map every row of `dataset` to a [`Document`] keyed by its timestamp.
///
/// A later row with an already-seen timestamp replaces the earlier document in place, and its id
/// is listed in [`MappedDocuments::overwritten`]. A missing timestamp column, or any row with a
/// blank timestamp, fails the whole mapping with [`IngestionError::MissingKeyField`]; rows are
/// numbered from 1.
pub fn map_documents(dataset: &DataSet) -> IngestionResult<MappedDocuments> {
    let key_idx = dataset
        .schema
        .index_of(TIMESTAMP_FIELD)
        .ok_or_else(|| IngestionError::MissingKeyField {
            field: TIMESTAMP_FIELD.to_string(),
            row: None,
        })?;

    let mut out = MappedDocuments::default();
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(dataset.row_count());

    for (idx0, row) in dataset.rows.iter().enumerate() {
        let id = row
            .get(key_idx)
            .and_then(|v| v.as_key())
            .ok_or_else(|| IngestionError::MissingKeyField {
                field: TIMESTAMP_FIELD.to_string(),
                row: Some(idx0 + 1),
            })?;

        let fields: serde_json::Map<String, serde_json::Value> = dataset
            .schema
            .field_names()
            .zip(row.iter())
            .filter(|(name, _)| *name != ID_FIELD)
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();

        let doc = Document {
            id: id.clone(),
            fields,
        };
        match positions.get(&id) {
            Some(&pos) => {
                out.documents[pos] = doc;
                out.overwritten.push(id);
            }
            None => {
                positions.insert(id, out.documents.len());
                out.documents.push(doc);
            }
        }
    }

    Ok(out)
}
