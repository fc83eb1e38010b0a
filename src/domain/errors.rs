//! Domain errors for the entity graph cache.

use thiserror::Error;

/// Failure reported by the query collaborator.
///
/// A query error aborts the fetch pass that issued it and is surfaced to the
/// caller of `initialize`, `refresh` or the sync engine fetch operations.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("Query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => Self::Decode {
                column: index,
                reason: source.to_string(),
            },
            other => Self::Execution(other.to_string()),
        }
    }
}

/// Invalid graph specification.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Entity '{0}' must declare at least one primary key field")]
    EmptyPrimaryKey(String),

    #[error("Invalid foreign key reference '{reference}' on {entity}.{field}: expected '<entity>.<field>'")]
    InvalidReference {
        entity: String,
        field: String,
        reference: String,
    },

    #[error("Invalid foreign key reference '{0}': expected '<entity>.<field>'")]
    MalformedReference(String),

    #[error("Failed to parse graph spec: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Failed to read graph spec: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the public entity graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("Graph {0} is already initialized")]
    AlreadyInitialized(uuid::Uuid),

    #[error("Graph {0} has not been initialized")]
    NotInitialized(uuid::Uuid),

    #[error("Graph {0} has been torn down")]
    TornDown(uuid::Uuid),
}

pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_pool_errors_map_to_connection() {
        let err: QueryError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, QueryError::Connection(_)));
    }

    #[test]
    fn test_sqlx_other_errors_map_to_execution() {
        let err: QueryError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, QueryError::Execution(_)));
    }

    #[test]
    fn test_graph_error_is_transparent_over_query_error() {
        let err = GraphError::from(QueryError::Timeout { timeout_ms: 250 });
        assert_eq!(err.to_string(), "Query timed out after 250ms");
    }
}
