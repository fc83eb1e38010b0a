//! Port trait definitions (Hexagonal Architecture)
//!
//! - QueryExecutor: relational query execution consumed by the sync engine
//!
//! These traits keep the cache core independent of a specific database
//! driver.

pub mod query_executor;

pub use query_executor::QueryExecutor;
