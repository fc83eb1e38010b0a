use async_trait::async_trait;

use crate::domain::errors::QueryError;
use crate::domain::models::{Row, Value};

/// Query collaborator consumed by the sync engine.
///
/// Implementations execute `query` with positional `?` parameters and return
/// every resulting row. No retries are expected; a failure is reported as a
/// `QueryError` and aborts the calling fetch pass.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, QueryError>;
}
