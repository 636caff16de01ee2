//! Schema Introspector
//!
//! Builds the [`SchemaDocument`] once at startup: every user table, its columns in
//! declaration order, and a few sample rows. The document is immutable afterwards and is
//! shared read-only by every request.

use crate::error::{AskError, Result};
use crate::sql_engine::{ColumnInfo, RelationalStore, SqliteStore};
use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub examples: Vec<Map<String, Value>>,
}

impl TableSchema {
    fn to_json(&self) -> Value {
        let columns: Map<String, Value> = self
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::String(c.data_type.clone())))
            .collect();
        serde_json::json!({
            "columns": columns,
            "examples": self.examples,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDocument {
    tables: Vec<TableSchema>,
    rendered: String,
}

impl SchemaDocument {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        let rendered = Self::render(&tables).to_string();
        Self { tables, rendered }
    }

    fn render(tables: &[TableSchema]) -> Value {
        let map: Map<String, Value> = tables
            .iter()
            .map(|t| (t.name.clone(), t.to_json()))
            .collect();
        Value::Object(map)
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Every column name across all tables, without duplicates
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for column in self.tables.iter().flat_map(|t| t.columns.iter()) {
            if !names.contains(&column.name.as_str()) {
                names.push(&column.name);
            }
        }
        names
    }

    /// `{"<table>": {"columns": {...}, "examples": [...]}}`, rendered once
    pub fn as_json_str(&self) -> &str {
        &self.rendered
    }

    pub fn to_json(&self) -> Value {
        Self::render(&self.tables)
    }
}

impl Serialize for SchemaDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Enumerate the store and build the schema document. Any store failure is fatal.
pub fn introspect(store: &dyn RelationalStore, sample_rows: usize) -> Result<SchemaDocument> {
    let unavailable = |e: AskError| AskError::SchemaUnavailable(e.to_string());

    let table_names = store.list_tables().map_err(unavailable)?;
    let mut tables = Vec::with_capacity(table_names.len());

    for name in table_names {
        let columns = store.table_columns(&name).map_err(unavailable)?;
        let sample = store.sample_rows(&name, sample_rows).map_err(unavailable)?;
        let examples = sample
            .rows
            .into_iter()
            .map(|row| sample.columns.iter().cloned().zip(row).collect::<Map<String, Value>>())
            .collect::<Vec<_>>();

        debug!("Table {}: {} columns, {} sample rows", name, columns.len(), examples.len());
        tables.push(TableSchema {
            name,
            columns,
            examples,
        });
    }

    info!("📚 Introspected {} tables", tables.len());
    Ok(SchemaDocument::new(tables))
}

/// Introspect a SQLite file opened read-only, without wiring up the rest of the pipeline
pub fn introspect_file(path: impl AsRef<Path>, sample_rows: usize) -> Result<SchemaDocument> {
    let store = SqliteStore::open(path, true)?;
    introspect(&store, sample_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE departments (dept_no TEXT, dept_name TEXT);
            INSERT INTO departments VALUES
                ('d001', 'Marketing'), ('d002', 'Finance'),
                ('d003', 'Human Resources'), ('d004', 'Production');
            CREATE TABLE titles (emp_no INTEGER, title TEXT, from_date DATE);
            INSERT INTO titles VALUES (10001, 'Senior Engineer', '1986-06-26');
            CREATE TABLE audit_log (id INTEGER);
            "#,
        )
        .unwrap();
        SqliteStore::from_connection(conn)
    }

    #[test]
    fn test_introspect_caps_samples_at_three() {
        let schema = introspect(&store(), 3).unwrap();
        let names: Vec<&str> = schema.table_names().collect();
        assert_eq!(names, vec!["departments", "titles", "audit_log"]);

        assert_eq!(schema.table("departments").unwrap().examples.len(), 3);
        assert_eq!(schema.table("titles").unwrap().examples.len(), 1);
        assert!(schema.table("audit_log").unwrap().examples.is_empty());
    }

    #[test]
    fn test_schema_json_shape() {
        let schema = introspect(&store(), 3).unwrap();
        let json: Value = serde_json::from_str(schema.as_json_str()).unwrap();
        assert_eq!(json["titles"]["columns"]["from_date"], "DATE");
        assert_eq!(json["titles"]["examples"][0]["title"], "Senior Engineer");
        assert_eq!(json["departments"]["examples"][0]["dept_name"], "Marketing");

        let columns: Vec<&String> = json["titles"]["columns"].as_object().unwrap().keys().collect();
        assert_eq!(columns, vec!["emp_no", "title", "from_date"]);
    }

    #[test]
    fn test_column_names_are_unique() {
        let schema = introspect(&store(), 3).unwrap();
        let columns = schema.column_names();
        assert_eq!(columns.iter().filter(|c| **c == "emp_no").count(), 1);
        assert!(columns.contains(&"dept_name"));
    }

    #[test]
    fn test_introspect_file_opens_read_only() {
        let path = std::env::temp_dir().join(format!("askdb-schema-{}.db", uuid::Uuid::new_v4()));
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE titles (emp_no INTEGER, title TEXT);
             INSERT INTO titles VALUES (10001, 'Senior Engineer');",
        )
        .unwrap();
        drop(conn);

        let schema = introspect_file(&path, 3).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["titles"]);
        assert_eq!(schema.table("titles").unwrap().examples[0]["title"], "Senior Engineer");
    }

    #[test]
    fn test_introspect_file_missing() {
        let path = std::env::temp_dir().join(format!("askdb-missing-{}.db", uuid::Uuid::new_v4()));
        assert!(matches!(
            introspect_file(&path, 3),
            Err(AskError::SchemaUnavailable(_))
        ));
    }
}
