//! CLI command implementations.

pub mod load;
pub mod lookup;
pub mod watch;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite;
use crate::domain::models::{Config, GraphOptions, GraphSpec};
use crate::services::EntityGraph;

/// Build an uninitialized graph for the spec file, connected to the
/// configured source database.
pub(crate) async fn open_graph(
    spec_path: &Path,
    config: &Config,
    options: GraphOptions,
) -> Result<EntityGraph> {
    let spec = GraphSpec::from_file(spec_path)
        .with_context(|| format!("Failed to load graph spec from {}", spec_path.display()))?;
    let executor = sqlite::connect(&config.database)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database.url))?;
    let graph = EntityGraph::new(spec, options, Arc::new(executor))?;
    Ok(graph)
}
