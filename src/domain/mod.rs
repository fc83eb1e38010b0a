//! Domain layer for the entity graph cache
//!
//! This module contains the data model, the error taxonomy and the ports
//! the cache core consumes.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{GraphError, GraphResult, QueryError, SpecError};
