//! JSON source reader.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"timestamp":"T1"}, {"timestamp":"T2"}]`
//! - Newline-delimited JSON (NDJSON): `{"timestamp":"T1"}\n{"timestamp":"T2"}\n`
//!
//! The schema is the union of object keys in first-seen order; keys absent from a row read as
//! [`Value::Null`]. Nested objects and arrays are rejected.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Schema, Value};

/// Read a JSON or NDJSON file into an in-memory [`DataSet`].
pub fn read_json_from_path(path: impl AsRef<Path>) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IngestionError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => IngestionError::Io(e),
    })?;
    let ds = read_json_from_str(&text)?;
    if ds.schema.is_empty() {
        return Err(IngestionError::EmptySource {
            source_name: path.display().to_string(),
        });
    }
    Ok(ds)
}

/// Read JSON from an in-memory string into a [`DataSet`].
///
/// Blank input yields a dataset with an empty schema.
pub fn read_json_from_str(input: &str) -> IngestionResult<DataSet> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(DataSet::new(Schema::default(), Vec::new()));
    }

    // First try parsing as a single JSON value (array or object).
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match v {
            serde_json::Value::Array(items) => read_json_values(&items),
            serde_json::Value::Object(_) => read_json_values(std::slice::from_ref(&v)),
            _ => Err(IngestionError::SchemaMismatch {
                message: "json must be an object, an array of objects, or NDJSON".to_string(),
            }),
        }
    } else {
        // Fall back to NDJSON.
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                IngestionError::SchemaMismatch {
                    message: format!("invalid ndjson at line {}: {}", i + 1, e),
                }
            })?;
            values.push(v);
        }
        read_json_values(&values)
    }
}

fn read_json_values(values: &[serde_json::Value]) -> IngestionResult<DataSet> {
    let mut objects = Vec::with_capacity(values.len());
    for (idx0, v) in values.iter().enumerate() {
        let obj = v.as_object().ok_or_else(|| IngestionError::SchemaMismatch {
            message: format!("row {} is not a json object", idx0 + 1),
        })?;
        objects.push(obj);
    }

    let schema = Schema::new(objects.iter().flat_map(|o| o.keys().cloned()));

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(objects.len());
    for (idx0, obj) in objects.iter().enumerate() {
        let mut row = Vec::with_capacity(schema.len());
        for field in schema.field_names() {
            let cell = match obj.get(field) {
                None => Value::Null,
                Some(jv) => convert_json_value(idx0 + 1, field, jv)?,
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema, rows))
}

fn convert_json_value(row: usize, column: &str, v: &serde_json::Value) -> IngestionResult<Value> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::String(s) => Ok(Value::Utf8(s.clone())),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Int64(i)),
            None => Ok(Value::Float64(n.as_f64().unwrap_or(f64::NAN))),
        },
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            Err(IngestionError::SchemaMismatch {
                message: format!("row {row} field '{column}' is not a scalar value"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::read_json_from_str;
    use crate::types::Value;

    #[test]
    fn array_schema_is_union_of_keys_in_first_seen_order() {
        let ds = read_json_from_str(
            r#"[{"timestamp":"T1","tempC":20},{"timestamp":"T2","humidity":0.4}]"#,
        )
        .unwrap();
        assert_eq!(ds.schema.fields, vec!["timestamp", "tempC", "humidity"]);
        assert_eq!(ds.rows[0][2], Value::Null);
        assert_eq!(ds.rows[1][1], Value::Null);
        assert_eq!(ds.rows[1][2], Value::Float64(0.4));
    }

    #[test]
    fn ndjson_is_accepted() {
        let input = "{\"timestamp\":\"T1\",\"ok\":true}\n\n{\"timestamp\":\"T2\",\"ok\":false}\n";
        let ds = read_json_from_str(input).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[1][1], Value::Bool(false));
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = read_json_from_str(r#"[{"timestamp":"T1","gauge":{"id":3}}]"#).unwrap_err();
        assert!(err.to_string().contains("field 'gauge' is not a scalar value"));
    }

    #[test]
    fn non_object_rows_are_rejected() {
        let err = read_json_from_str("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("row 1 is not a json object"));
    }
}
