//! Statement execution seam and its SQLite implementation.

use super::RepoResult;
use crate::db::{json_from_sql, json_to_sql, DbResult};
use crate::mapper::Row;
use crate::query::Query;
use log::{debug, error};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::rc::Rc;
use std::time::Instant;

/// Blocking SQL execution for one table.
pub trait Executor {
    fn select_rows(&self, query: &Query) -> RepoResult<Vec<Row>>;

    /// Inserts `row`; returns the stored primary key value.
    fn insert(&self, row: &Row) -> RepoResult<Value>;

    /// Updates the row with primary key `id`; returns affected row count.
    fn update(&self, row: &Row, id: &Value) -> RepoResult<usize>;

    fn delete_by_id(&self, id: &Value) -> RepoResult<usize>;
}

/// SQLite executor sharing one connection between repositories.
#[derive(Debug, Clone)]
pub struct SqliteExecutor {
    conn: Rc<Connection>,
    table: String,
    primary_key: String,
}

impl SqliteExecutor {
    pub fn new(conn: Rc<Connection>, table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn execute(&self, operation: &str, sql: &str, params: Vec<Value>) -> RepoResult<usize> {
        let started_at = Instant::now();
        let result = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(json_to_sql)));
        match result {
            Ok(affected) => {
                debug!(
                    "event=db_{} module=executor status=ok table={} affected={} duration_ms={}",
                    operation,
                    self.table,
                    affected,
                    started_at.elapsed().as_millis()
                );
                Ok(affected)
            }
            Err(err) => {
                error!(
                    "event=db_{} module=executor status=error table={} duration_ms={} error={}",
                    operation,
                    self.table,
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    fn query_rows(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query(params_from_iter(params.iter().map(json_to_sql)))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = Row::new();
            for (index, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), json_from_sql(column, row.get_ref(index)?)?);
            }
            result.push(mapped);
        }
        Ok(result)
    }
}

impl Executor for SqliteExecutor {
    fn select_rows(&self, query: &Query) -> RepoResult<Vec<Row>> {
        let started_at = Instant::now();
        let rendered = query.render();
        match self.query_rows(&rendered.sql, &rendered.params) {
            Ok(rows) => {
                debug!(
                    "event=db_select module=executor status=ok table={} rows={} duration_ms={} sql={}",
                    self.table,
                    rows.len(),
                    started_at.elapsed().as_millis(),
                    rendered.sql
                );
                Ok(rows)
            }
            Err(err) => {
                error!(
                    "event=db_select module=executor status=error table={} duration_ms={} sql={} error={}",
                    self.table,
                    started_at.elapsed().as_millis(),
                    rendered.sql,
                    err
                );
                Err(err.into())
            }
        }
    }

    fn insert(&self, row: &Row) -> RepoResult<Value> {
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table,
                columns.join(", "),
                placeholders
            )
        };
        self.execute("insert", &sql, row.values().cloned().collect())?;

        match row.get(&self.primary_key) {
            Some(id) if !id.is_null() => Ok(id.clone()),
            _ => Ok(Value::from(self.conn.last_insert_rowid())),
        }
    }

    fn update(&self, row: &Row, id: &Value) -> RepoResult<usize> {
        if row.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = row.keys().map(|column| format!("{column} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table,
            assignments.join(", "),
            self.primary_key
        );
        let mut params: Vec<Value> = row.values().cloned().collect();
        params.push(id.clone());
        self.execute("update", &sql, params)
    }

    fn delete_by_id(&self, id: &Value) -> RepoResult<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", self.table, self.primary_key);
        self.execute("delete", &sql, vec![id.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::{Executor, SqliteExecutor};
    use crate::db::open_db_in_memory;
    use crate::query::Query;
    use serde_json::{json, Map, Value};
    use std::rc::Rc;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn executor() -> SqliteExecutor {
        let conn = open_db_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, score REAL);",
        )
        .unwrap();
        SqliteExecutor::new(Rc::new(conn), "users", "id")
    }

    #[test]
    fn insert_returns_generated_or_supplied_id() {
        let executor = executor();
        let generated = executor.insert(&row(json!({ "name": "a" }))).unwrap();
        assert_eq!(generated, json!(1));
        let supplied = executor.insert(&row(json!({ "id": 10, "name": "b" }))).unwrap();
        assert_eq!(supplied, json!(10));
    }

    #[test]
    fn update_and_delete_report_affected_rows() {
        let executor = executor();
        let id = executor.insert(&row(json!({ "name": "a" }))).unwrap();

        assert_eq!(executor.update(&row(json!({ "name": "z" })), &id).unwrap(), 1);
        assert_eq!(executor.update(&row(json!({ "name": "z" })), &json!(99)).unwrap(), 0);
        assert_eq!(executor.delete_by_id(&id).unwrap(), 1);
        assert_eq!(executor.delete_by_id(&id).unwrap(), 0);
    }

    #[test]
    fn select_rows_maps_columns_to_json() {
        let executor = executor();
        executor
            .insert(&row(json!({ "name": "a", "score": 1.5 })))
            .unwrap();
        executor.insert(&row(json!({ "name": null }))).unwrap();

        let rows = executor.select_rows(&Query::new("users")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            Value::Object(rows[0].clone()),
            json!({ "id": 1, "name": "a", "score": 1.5 })
        );
        assert_eq!(rows[1]["name"], Value::Null);

        let count = executor
            .select_rows(&Query::new("users").into_count())
            .unwrap();
        assert_eq!(count[0]["row_count"], json!(2));
    }
}
