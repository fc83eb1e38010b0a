//! Entity Graph - in-memory entity graph cache over relational tables
//!
//! Loads declared entities from a relational source into shared in-memory
//! records, indexes them by composite primary key and by external identifier
//! fields, and materializes foreign keys as link containers on the parent
//! records. An optional scheduler keeps the graph current with incremental
//! fetches of recently updated rows.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): data model, errors and the query port
//! - **Adapters** (`adapters`): SQLite query executor and a scripted mock
//! - **Service Layer** (`services`): store, id maps, sync, links, scheduler
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use entity_graph::adapters::sqlite;
//! use entity_graph::{DatabaseConfig, EntityGraph, EntitySpec, GraphOptions, GraphSpec};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let spec = GraphSpec::new()
//!     .entity("student", EntitySpec::new(["id"]).columns(["name"]).id_maps(["external_id"]))
//!     .entity(
//!         "score",
//!         EntitySpec::new(["student_id", "subject_id"])
//!             .columns(["score"])
//!             .foreign_key("student_id", "student.id")?,
//!     );
//! let executor = sqlite::connect(&DatabaseConfig::default()).await?;
//! let graph = EntityGraph::new(spec, GraphOptions::default(), Arc::new(executor))?;
//! graph.initialize().await?;
//!
//! if let Some(student) = graph.get_by_identifier("student", "external_id", 1000) {
//!     println!("{} has {} scores", student.key(), student.link_count("scores"));
//! }
//! graph.teardown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    CompositeKey, Config, DatabaseConfig, EntitySpec, ForeignKey, GraphOptions, GraphSpec,
    LoggingConfig, Record, RecordRef, Row, Value,
};
pub use domain::ports::QueryExecutor;
pub use domain::{GraphError, GraphResult, QueryError, SpecError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    EntityGraph, GraphState, GraphStats, LinkReport, LinkSkip, RefreshEvent, RefreshReport,
};
