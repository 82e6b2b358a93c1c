//! Index (view) synthesis.
//!
//! Each source field gets one design document named after the field, holding a single view that
//! emits `(timestamp, value)` for documents carrying both. Index names are the field names with
//! every character outside `[A-Za-z0-9_-]` replaced by `_`; the view itself addresses the field
//! by its original name.

use std::collections::HashMap;

use crate::catalog::DESIGN_PREFIX;
use crate::error::{IngestionError, IngestionResult};
use crate::types::TIMESTAMP_FIELD;

/// Name of the view inside every generated design document.
pub const VIEW_NAME: &str = "show_specs";

/// A named index over one field, keyed by `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Store-side index name (design document name without prefix).
    pub name: String,
    /// Source field the index exposes.
    pub field: String,
    /// JavaScript map function.
    pub map_function: String,
}

impl IndexDefinition {
    /// Synthesize the index for `field`.
    pub fn for_field(field: &str) -> IngestionResult<Self> {
        let name = index_name(field);
        if name.is_empty() {
            return Err(IngestionError::InvalidIndexName {
                field: field.to_string(),
                reason: "field name is empty".to_string(),
            });
        }

        let accessor = js_string_literal(field);
        let map_function = format!(
            "function(doc) {{ var v = doc[{accessor}]; \
             if (doc.{TIMESTAMP_FIELD} !== undefined && doc.{TIMESTAMP_FIELD} !== null \
             && v !== undefined && v !== null) emit(doc.{TIMESTAMP_FIELD}, v); }}"
        );

        Ok(Self {
            name,
            field: field.to_string(),
            map_function,
        })
    }

    /// The index installed when a database is initialized.
    ///
    /// It is not part of per-run reconciliation.
    pub fn timestamp() -> Self {
        Self {
            name: TIMESTAMP_FIELD.to_string(),
            field: TIMESTAMP_FIELD.to_string(),
            map_function: format!(
                "function(doc) {{ if (doc.{TIMESTAMP_FIELD} !== undefined && doc.{TIMESTAMP_FIELD} !== null) \
                 emit(doc.{TIMESTAMP_FIELD}, doc.{TIMESTAMP_FIELD}); }}"
            ),
        }
    }

    /// Document id of the design document holding this index.
    pub fn design_id(&self) -> String {
        format!("{DESIGN_PREFIX}{}", self.name)
    }

    /// The design document body sent to the store.
    pub fn design_document(&self) -> serde_json::Value {
        serde_json::json!({
            "_id": self.design_id(),
            "language": "javascript",
            "field": self.field,
            "views": {
                VIEW_NAME: { "map": self.map_function }
            }
        })
    }
}

/// Deterministic index name for a field.
pub fn index_name(field: &str) -> String {
    field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Build one definition per missing field, in input order.
///
/// Fails if a field name is empty or if two fields map to the same index name.
pub fn build(missing: &[String]) -> IngestionResult<Vec<IndexDefinition>> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(missing.len());
    let mut out = Vec::with_capacity(missing.len());
    for field in missing {
        let def = IndexDefinition::for_field(field)?;
        if let Some(previous) = seen.insert(def.name.clone(), field) {
            return Err(IngestionError::InvalidIndexName {
                field: field.clone(),
                reason: format!("index name '{}' is already used by field '{previous}'", def.name),
            });
        }
        out.push(def);
    }
    Ok(out)
}

fn js_string_literal(s: &str) -> String {
    // JSON string literals are JavaScript string literals once the two line separators JSON
    // allows raw are escaped.
    serde_json::Value::String(s.to_string())
        .to_string()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

#[cfg(test)]
mod tests {
    use super::{build, index_name, IndexDefinition, VIEW_NAME};

    #[test]
    fn names_are_sanitized_deterministically() {
        assert_eq!(index_name("tempC"), "tempC");
        assert_eq!(index_name("temp C (out)"), "temp_C__out_");
        assert_eq!(index_name("rel-hum_2"), "rel-hum_2");
        assert_eq!(index_name("temp C"), index_name("temp C"));
    }

    #[test]
    fn map_function_requires_timestamp_and_field() {
        let def = IndexDefinition::for_field("tempC").unwrap();
        assert_eq!(def.design_id(), "_design/tempC");
        assert!(def.map_function.contains(r#"doc["tempC"]"#));
        assert!(def.map_function.contains("doc.timestamp !== undefined"));
        assert!(def.map_function.contains("emit(doc.timestamp, v)"));
    }

    #[test]
    fn field_names_with_quotes_stay_inside_the_literal() {
        let def = IndexDefinition::for_field("sensor \"a\"").unwrap();
        assert_eq!(def.name, "sensor__a_");
        assert!(def.map_function.contains(r#"doc["sensor \"a\""]"#));
    }

    #[test]
    fn design_document_shape() {
        let doc = IndexDefinition::for_field("tempC").unwrap().design_document();
        assert_eq!(doc["_id"], "_design/tempC");
        assert_eq!(doc["field"], "tempC");
        assert!(doc["views"][VIEW_NAME]["map"].as_str().unwrap().starts_with("function(doc)"));
    }

    #[test]
    fn build_preserves_order() {
        let defs = build(&["b".to_string(), "a".to_string()]).unwrap();
        let fields: Vec<&str> = defs.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["b", "a"]);
    }

    #[test]
    fn build_rejects_empty_and_colliding_names() {
        let err = build(&[String::new()]).unwrap_err();
        assert!(err.to_string().contains("field name is empty"));

        let err = build(&["temp C".to_string(), "temp_C".to_string()]).unwrap_err();
        assert!(err.to_string().contains("already used by field 'temp C'"));
    }

    #[test]
    fn timestamp_index_emits_timestamp() {
        let def = IndexDefinition::timestamp();
        assert_eq!(def.design_id(), "_design/timestamp");
        assert!(def.map_function.contains("emit(doc.timestamp, doc.timestamp)"));
    }
}
