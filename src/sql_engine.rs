//! SQL Engine Module
//!
//! The relational store behind the pipeline and the executor that runs guarded queries
//! against it. SQLite (rusqlite) is the shipped store; anything that can list tables,
//! describe columns and run a statement can implement [`RelationalStore`].

use crate::error::{AskError, Result, Stage};
use crate::execution::result::ResultSet;
use crate::safety_guardrails::GuardedQuery;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Column name and declared type, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Raw output of one statement: labels as reported by the store, then positional rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

pub trait RelationalStore: Send + Sync {
    /// User tables, in catalogue order
    fn list_tables(&self) -> Result<Vec<String>>;

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryOutput>;

    /// Run one statement. Store failures come back as `AskError::Execution` carrying the
    /// store's own message.
    fn execute(&self, sql: &str) -> Result<QueryOutput>;

    /// Abort whatever statement is currently running, if the store supports it
    fn interrupt(&self) {}
}

/// SQLite store over a single shared connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
    interrupt: InterruptHandle,
}

impl SqliteStore {
    /// Open a database file. Read-only stores cannot be modified by any generated query.
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AskError::SchemaUnavailable(format!(
                "database file not found: {}",
                path.display()
            )));
        }

        let flags = if read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::default()
        };
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            AskError::SchemaUnavailable(format!("failed to open {}: {}", path.display(), e))
        })?;

        info!("Opened SQLite store {} (read_only={})", path.display(), read_only);
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Mutex::new(conn),
            interrupt,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AskError::Execution("store connection lock poisoned".to_string()))
    }
}

fn store_error(e: rusqlite::Error) -> AskError {
    AskError::Execution(e.to_string())
}

/// Double-quote an identifier for interpolation into catalogue queries
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(bytes) => serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => serde_json::Value::String(format!("<{} byte blob>", bytes.len())),
    }
}

fn run_statement(conn: &Connection, sql: &str) -> Result<QueryOutput> {
    let mut stmt = conn.prepare(sql).map_err(store_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let column_count = columns.len();

    let mut rows = stmt.query([]).map_err(store_error)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(store_error)? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(value_to_json(row.get_ref(idx).map_err(store_error)?));
        }
        out.push(values);
    }

    Ok(QueryOutput { columns, rows: out })
}

impl RelationalStore for SqliteStore {
    fn list_tables(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
            .map_err(store_error)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(store_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(names)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(store_error)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: row.get(2)?,
                })
            })
            .map_err(store_error)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(columns)
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryOutput> {
        let conn = self.lock()?;
        run_statement(&conn, &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit))
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput> {
        let conn = self.lock()?;
        run_statement(&conn, sql)
    }

    fn interrupt(&self) {
        self.interrupt.interrupt();
    }
}

/// Runs guarded statements against the store without blocking the async runtime
#[derive(Clone)]
pub struct SqlEngine {
    store: Arc<dyn RelationalStore>,
    timeout: Duration,
}

impl SqlEngine {
    pub fn new(store: Arc<dyn RelationalStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Execute a guarded query and label every row with the store's column names
    pub async fn execute(&self, guarded: &GuardedQuery) -> Result<ResultSet> {
        let start_time = Instant::now();
        info!("🔍 Executing SQL: {}", guarded.sql);

        let store = Arc::clone(&self.store);
        let sql = guarded.sql.clone();
        let task = tokio::task::spawn_blocking(move || store.execute(&sql));

        let output = match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(|e| AskError::Execution(format!("query task failed: {}", e)))??,
            Err(_) => {
                warn!("Query exceeded {:?}, interrupting", self.timeout);
                self.store.interrupt();
                return Err(AskError::Timeout {
                    stage: Stage::Execution,
                    after: self.timeout,
                });
            }
        };

        let result = ResultSet::new(output.columns, output.rows);
        info!(
            "✅ Query completed in {}ms, returned {} rows",
            start_time.elapsed().as_millis(),
            result.len()
        );
        Ok(result)
    }
}
