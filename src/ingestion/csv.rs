//! CSV source reader.

use std::fs::File;
use std::io;
use std::path::Path;

use crate::config::ValueMode;
use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Schema, Value};

/// Read a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - The first record is the header; a missing or blank header is [`IngestionError::EmptySource`].
/// - A UTF-8 byte order mark and surrounding whitespace are stripped from header names.
/// - Short rows are padded with [`Value::Null`]; cells beyond the header are ignored.
/// - A repeated header name keeps its first column; later columns with that name are skipped.
pub fn read_csv_from_path(path: impl AsRef<Path>, mode: ValueMode) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    let mut rdr = reader_builder().from_reader(open(path)?);
    let ds = read_csv_from_reader(&mut rdr, mode)?;
    if ds.schema.is_empty() {
        return Err(IngestionError::EmptySource {
            source_name: path.display().to_string(),
        });
    }
    Ok(ds)
}

/// Read only the header of a CSV file.
pub fn read_csv_header_from_path(path: impl AsRef<Path>) -> IngestionResult<Schema> {
    let path = path.as_ref();
    let mut rdr = reader_builder().from_reader(open(path)?);
    let (schema, _) = header_columns(&mut rdr)?;
    if schema.is_empty() {
        return Err(IngestionError::EmptySource {
            source_name: path.display().to_string(),
        });
    }
    Ok(schema)
}

/// Read CSV data from an existing CSV reader.
///
/// The reader must be configured with `has_headers(true)`. An input without a header yields a
/// dataset with an empty schema.
pub fn read_csv_from_reader<R: io::Read>(
    rdr: &mut csv::Reader<R>,
    mode: ValueMode,
) -> IngestionResult<DataSet> {
    let (schema, columns) = header_columns(rdr)?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row: Vec<Value> = columns
            .iter()
            .map(|&col| match record.get(col) {
                Some(raw) => parse_cell(raw, mode),
                None => Value::Null,
            })
            .collect();
        rows.push(row);
    }

    Ok(DataSet::new(schema, rows))
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).flexible(true);
    builder
}

fn open(path: &Path) -> IngestionResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => IngestionError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => IngestionError::Io(e),
    })
}

/// Header schema plus the raw column each schema field is read from.
fn header_columns<R: io::Read>(
    rdr: &mut csv::Reader<R>,
) -> IngestionResult<(Schema, Vec<usize>)> {
    let headers = rdr.headers()?;
    let names: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_owned()
        })
        .collect();

    // A lone blank header cell is what an empty file or a blank first line looks like.
    if names.iter().all(|n| n.is_empty()) {
        return Ok((Schema::default(), Vec::new()));
    }

    let schema = Schema::new(names.iter().cloned());
    let columns = schema
        .field_names()
        .filter_map(|field| names.iter().position(|n| n == field))
        .collect();
    Ok((schema, columns))
}

fn parse_cell(raw: &str, mode: ValueMode) -> Value {
    match mode {
        ValueMode::Text => Value::Utf8(raw.to_owned()),
        ValueMode::Inferred => infer_value(raw),
    }
}

fn infer_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int64(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_finite() {
            return Value::Float64(v);
        }
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Utf8(trimmed.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::{infer_value, read_csv_from_reader};
    use crate::config::ValueMode;
    use crate::types::Value;

    fn reader(input: &str) -> csv::Reader<&[u8]> {
        csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input.as_bytes())
    }

    #[test]
    fn text_mode_keeps_cells_verbatim() {
        let ds = read_csv_from_reader(&mut reader("timestamp,tempC\nT1, 20\n"), ValueMode::Text)
            .unwrap();
        assert_eq!(ds.schema.fields, vec!["timestamp", "tempC"]);
        assert_eq!(ds.rows[0][1], Value::Utf8(" 20".to_string()));
    }

    #[test]
    fn bom_is_stripped_from_first_header() {
        let ds = read_csv_from_reader(
            &mut reader("\u{feff}timestamp,tempC\nT1,20\n"),
            ValueMode::Text,
        )
        .unwrap();
        assert_eq!(ds.schema.index_of("timestamp"), Some(0));
    }

    #[test]
    fn short_rows_are_padded_with_nulls() {
        let ds = read_csv_from_reader(&mut reader("timestamp,a,b\nT1,1\n"), ValueMode::Text)
            .unwrap();
        assert_eq!(ds.rows[0].len(), 3);
        assert_eq!(ds.rows[0][2], Value::Null);
    }

    #[test]
    fn repeated_header_keeps_first_column_and_later_fields_stay_aligned() {
        let ds = read_csv_from_reader(&mut reader("timestamp,a,a,b\nT1,1,2,3\n"), ValueMode::Text)
            .unwrap();
        assert_eq!(ds.schema.fields, vec!["timestamp", "a", "b"]);
        assert_eq!(ds.value(0, "a"), Some(&Value::Utf8("1".to_string())));
        assert_eq!(ds.value(0, "b"), Some(&Value::Utf8("3".to_string())));
    }

    #[test]
    fn repeated_header_in_a_short_row_pads_by_column() {
        let ds = read_csv_from_reader(&mut reader("timestamp,a,a,b\nT1,1,2\n"), ValueMode::Text)
            .unwrap();
        assert_eq!(ds.value(0, "b"), Some(&Value::Null));
    }

    #[test]
    fn inference_recognizes_scalars() {
        assert_eq!(infer_value(" 21 "), Value::Int64(21));
        assert_eq!(infer_value("20.5"), Value::Float64(20.5));
        assert_eq!(infer_value("TRUE"), Value::Bool(true));
        assert_eq!(infer_value(""), Value::Null);
        assert_eq!(infer_value("NaN"), Value::Utf8("NaN".to_string()));
        assert_eq!(infer_value("2021-01-01"), Value::Utf8("2021-01-01".to_string()));
    }

    #[test]
    fn empty_input_has_empty_schema() {
        let ds = read_csv_from_reader(&mut reader(""), ValueMode::Text).unwrap();
        assert!(ds.schema.is_empty());
        assert_eq!(ds.row_count(), 0);
    }
}
