#![allow(dead_code)]

use askdb::config::{AskConfig, LlmConfig, Provider};
use askdb::error::{Result, Stage};
use askdb::llm::{CompletionOracle, OracleCall};
use askdb::pipeline::Pipeline;
use askdb::sql_engine::{ColumnInfo, QueryOutput, RelationalStore, SqliteStore};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Small slice of the classic employees sample database
pub fn employees_store() -> SqliteStore {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE employees (
            emp_no INTEGER PRIMARY KEY,
            birth_date DATE,
            first_name TEXT,
            last_name TEXT,
            gender TEXT,
            hire_date DATE
        );
        INSERT INTO employees VALUES
            (10001, '1953-09-02', 'Georgi', 'Facello', 'M', '1986-06-26'),
            (10002, '1964-06-02', 'Bezalel', 'Simmel', 'F', '1985-11-21'),
            (10003, '1959-12-03', 'Parto', 'Bamford', 'M', '1986-08-28'),
            (10004, '1954-05-01', 'Chirstian', 'Koblick', 'M', '2000-12-01');

        CREATE TABLE departments (dept_no TEXT PRIMARY KEY, dept_name TEXT);
        INSERT INTO departments VALUES
            ('d001', 'Marketing'), ('d002', 'Finance'),
            ('d003', 'Human Resources'), ('d005', 'Development');

        CREATE TABLE dept_emp (emp_no INTEGER, dept_no TEXT, from_date DATE, to_date DATE);
        INSERT INTO dept_emp VALUES
            (10001, 'd005', '1986-06-26', '9999-01-01'),
            (10002, 'd005', '1985-11-21', '9999-01-01'),
            (10003, 'd003', '1986-08-28', '1995-01-01'),
            (10003, 'd002', '1995-01-01', '9999-01-01');

        CREATE TABLE salaries (emp_no INTEGER, salary INTEGER, from_date DATE, to_date DATE);
        INSERT INTO salaries VALUES
            (10001, 88958, '2002-06-22', '9999-01-01'),
            (10002, 72527, '2001-08-02', '9999-01-01'),
            (10003, 43311, '2001-12-01', '9999-01-01'),
            (10004, 74057, '2001-11-27', '9999-01-01');
        "#,
    )
    .unwrap();
    SqliteStore::from_connection(conn)
}

/// Wraps a store and counts executed statements
pub struct CountingStore {
    inner: SqliteStore,
    pub executed: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            executed: AtomicUsize::new(0),
        }
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }
}

impl RelationalStore for CountingStore {
    fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables()
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.inner.table_columns(table)
    }

    fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryOutput> {
        self.inner.sample_rows(table, limit)
    }

    fn execute(&self, sql: &str) -> Result<QueryOutput> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(sql)
    }

    fn interrupt(&self) {
        self.inner.interrupt()
    }
}

/// Oracle replaying canned replies per stage. The last reply of a stage repeats once
/// the queue is drained.
#[derive(Default)]
pub struct ScriptedOracle {
    synthesis: Mutex<VecDeque<String>>,
    summary: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(Stage, String, f32)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(self, sql: &str) -> Self {
        self.with_synthesis_reply(&serde_json::json!({"query": [{"SQL": sql}]}).to_string())
    }

    pub fn with_synthesis_reply(self, reply: &str) -> Self {
        self.synthesis.lock().unwrap().push_back(reply.to_string());
        self
    }

    pub fn with_summary(self, reply: &str) -> Self {
        self.summary.lock().unwrap().push_back(reply.to_string());
        self
    }

    pub fn calls(&self, stage: Stage) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _, _)| *s == stage)
            .map(|(_, prompt, _)| prompt.clone())
            .collect()
    }

    pub fn temperatures(&self) -> Vec<(Stage, f32)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(s, _, t)| (*s, *t))
            .collect()
    }
}

#[async_trait]
impl CompletionOracle for ScriptedOracle {
    async fn complete(&self, call: OracleCall<'_>) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((call.stage, call.prompt.to_string(), call.temperature));

        let queue = match call.stage {
            Stage::Summary => &self.summary,
            _ => &self.synthesis,
        };
        let mut queue = queue.lock().unwrap();
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(reply.unwrap_or_default())
    }
}

/// Oracle that never answers in time
pub struct SlowOracle(pub Duration);

#[async_trait]
impl CompletionOracle for SlowOracle {
    async fn complete(&self, _call: OracleCall<'_>) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok(String::new())
    }
}

pub fn test_config() -> AskConfig {
    let mut config = AskConfig::new(":memory:", LlmConfig::new(Provider::Gemini, "test-key".to_string()));
    config.retry_base_delay = Duration::ZERO;
    config
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub oracle: Arc<ScriptedOracle>,
    pub store: Arc<CountingStore>,
}

pub fn harness(oracle: ScriptedOracle) -> Harness {
    harness_with(test_config(), oracle)
}

pub fn harness_with(config: AskConfig, oracle: ScriptedOracle) -> Harness {
    let oracle = Arc::new(oracle);
    let store = Arc::new(CountingStore::new(employees_store()));
    let pipeline = Pipeline::bootstrap(
        config,
        Arc::clone(&store) as Arc<dyn RelationalStore>,
        Arc::clone(&oracle) as Arc<dyn CompletionOracle>,
    )
    .unwrap();
    Harness {
        pipeline,
        oracle,
        store,
    }
}
