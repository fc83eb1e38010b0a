//! Mock query executor for testing.
//!
//! Routes each query to the table named after `FROM`. Unfiltered queries get
//! the table's full rows; queries with a `WHERE` clause get the rows scripted
//! as "recently updated" for that table.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::domain::errors::QueryError;
use crate::domain::models::{Row, Value};
use crate::domain::ports::QueryExecutor;

/// A query observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub query: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct MockState {
    tables: HashMap<String, Vec<Row>>,
    recent: HashMap<String, Vec<Row>>,
    failures: VecDeque<String>,
    calls: Vec<RecordedQuery>,
}

/// Mock executor for testing.
#[derive(Default)]
pub struct MockQueryExecutor {
    state: Mutex<MockState>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query, to keep a pass in flight.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rows returned by unfiltered queries against `table`.
    pub fn set_rows(&self, table: &str, rows: Vec<Row>) {
        self.state.lock().tables.insert(table.to_string(), rows);
    }

    /// Rows returned by filtered (incremental) queries against `table`.
    pub fn set_recent_rows(&self, table: &str, rows: Vec<Row>) {
        self.state.lock().recent.insert(table.to_string(), rows);
    }

    /// Make the next query fail with an execution error.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.state.lock().failures.push_back(message.into());
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Highest number of queries observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

fn table_name(query: &str) -> Option<&str> {
    let (_, rest) = query.split_once(" FROM ")?;
    rest.split_whitespace().next()
}

#[async_trait]
impl QueryExecutor for MockQueryExecutor {
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, QueryError> {
        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(running, Ordering::AcqRel);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let mut state = self.state.lock();
        state.calls.push(RecordedQuery {
            query: query.to_string(),
            params: params.to_vec(),
        });

        if let Some(message) = state.failures.pop_front() {
            return Err(QueryError::Execution(message));
        }

        let table = table_name(query)
            .ok_or_else(|| QueryError::Execution(format!("unsupported query: {query}")))?;
        let source = if query.contains(" WHERE ") {
            &state.recent
        } else {
            &state.tables
        };
        source
            .get(table)
            .cloned()
            .ok_or_else(|| QueryError::Execution(format!("no such table: {table}")))
    }
}
