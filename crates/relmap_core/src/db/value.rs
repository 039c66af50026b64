use super::{DbError, DbResult};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

/// JSON value -> SQLite bind value. Booleans bind as 0/1; arrays and
/// objects bind as JSON text.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// SQLite column value -> JSON value. BLOB columns are rejected.
pub fn json_from_sql(column: &str, value: ValueRef<'_>) -> DbResult<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(integer) => Ok(Value::from(integer)),
        ValueRef::Real(real) => Ok(Number::from_f64(real).map_or(Value::Null, Value::Number)),
        ValueRef::Text(bytes) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(DbError::UnsupportedValue {
            column: column.to_string(),
            storage: "BLOB".to_string(),
        }),
    }
}
