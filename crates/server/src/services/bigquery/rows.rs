//! Decoding of `BigQuery` REST result rows.
//!
//! The REST API returns every cell as a string inside `{"f": [{"v": ...}]}`
//! envelopes; the schema says how to read it back.

use serde::Deserialize;
use serde_json::{Map, Number, Value};

use super::BigQueryError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TableSchema {
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

/// Decode raw `rows` against `schema`.
pub(crate) fn decode_rows(schema: &TableSchema, rows: &[Value]) -> Result<Vec<Row>, BigQueryError> {
    rows.iter()
        .map(|row| decode_record(&schema.fields, row))
        .collect()
}

fn decode_record(fields: &[FieldSchema], record: &Value) -> Result<Row, BigQueryError> {
    let cells = record
        .get("f")
        .and_then(Value::as_array)
        .ok_or_else(|| BigQueryError::Decode("row is missing its cell list".to_string()))?;

    if cells.len() != fields.len() {
        return Err(BigQueryError::Decode(format!(
            "row has {} cells but schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    fields
        .iter()
        .zip(cells)
        .map(|(field, cell)| {
            let raw = cell.get("v").unwrap_or(&Value::Null);
            decode_field(field, raw).map(|v| (field.name.clone(), v))
        })
        .collect()
}

fn decode_field(field: &FieldSchema, raw: &Value) -> Result<Value, BigQueryError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    if field.is_repeated() {
        let items = raw.as_array().ok_or_else(|| {
            BigQueryError::Decode(format!("repeated field {} is not an array", field.name))
        })?;
        return items
            .iter()
            .map(|item| decode_scalar(field, item.get("v").unwrap_or(&Value::Null)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }

    decode_scalar(field, raw)
}

fn decode_scalar(field: &FieldSchema, raw: &Value) -> Result<Value, BigQueryError> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => decode_record(&field.fields, raw).map(Value::Object),
        "INTEGER" | "INT64" => {
            let text = cell_text(field, raw)?;
            text.parse::<i64>()
                .map(Value::from)
                .map_err(|_| bad_cell(field, text))
        }
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            let text = cell_text(field, raw)?;
            let number = text.parse::<f64>().map_err(|_| bad_cell(field, text))?;
            // NaN and +/-Infinity have no JSON number form; keep BigQuery's text
            Ok(Number::from_f64(number).map_or_else(|| Value::from(text), Value::Number))
        }
        "BOOLEAN" | "BOOL" => match cell_text(field, raw)? {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(bad_cell(field, other)),
        },
        // STRING, BYTES, TIMESTAMP, DATE, JSON, ... stay as text
        _ => Ok(raw.clone()),
    }
}

fn cell_text<'a>(field: &FieldSchema, raw: &'a Value) -> Result<&'a str, BigQueryError> {
    raw.as_str()
        .ok_or_else(|| BigQueryError::Decode(format!("field {} is not a string cell", field.name)))
}

fn bad_cell(field: &FieldSchema, text: &str) -> BigQueryError {
    BigQueryError::Decode(format!(
        "field {} of type {} has unreadable value {text:?}",
        field.name, field.field_type
    ))
}
