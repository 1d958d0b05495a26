//! Row to JSON conversion
//!
//! Tool servers answer with JSON objects, so most reads go straight from a
//! statement to `serde_json::Value` keyed by column name.

use anyhow::Result;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params, Row};
use serde_json::{Map, Value};

/// Run a query and return every row as a JSON object
pub fn query_rows<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_json(row, &columns)?);
    }
    Ok(out)
}

/// Run a query and return the first row, if any
pub fn query_one<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<Value>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut rows = stmt.query(params)?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_json(row, &columns)?)),
        None => Ok(None),
    }
}

pub fn row_to_json(row: &Row<'_>, columns: &[String]) -> Result<Value> {
    let mut obj = Map::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        obj.insert(name.clone(), value_to_json(row.get_ref(idx)?));
    }
    Ok(Value::Object(obj))
}

pub fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

/// Numeric field of a JSON row (integers and reals alike)
pub fn num(row: &Value, key: &str) -> f64 {
    row.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

pub fn int(row: &Value, key: &str) -> i64 {
    row.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

pub fn text<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

/// SQLite stores booleans as integers
pub fn flag(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(v) => v.as_i64().map(|i| i != 0).unwrap_or(false),
        None => false,
    }
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
