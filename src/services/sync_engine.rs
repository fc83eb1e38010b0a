//! Sync engine: pulls rows from the source and merges them into the store.
//!
//! Entities are fetched one at a time, in declaration order. Every fetched
//! batch is merged into the entity store and fed to the id map index before
//! the next entity is queried, so a failure part way through leaves the
//! entities fetched so far merged.

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

use crate::domain::errors::QueryError;
use crate::domain::models::{CompositeKey, EntitySpec, GraphSpec, Row, Value};
use crate::domain::ports::QueryExecutor;
use crate::services::entity_store::EntityStore;
use crate::services::id_map_index::IdMapIndex;

/// Text format of the incremental cutoff parameter.
///
/// This is the UTC text form SQL `CURRENT_TIMESTAMP` produces. The cutoff is
/// compared with the last-updated column as text, so that column must hold
/// UTC timestamps in this same form. The cutoff is taken from the local
/// clock: skew between this host and the database server widens or narrows
/// the effective window by the same amount.
pub const CUTOFF_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Keys of the records touched by one fetch pass, per entity.
///
/// Every entity queried by the pass has an entry, even when no rows came
/// back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entities: IndexMap<String, IndexSet<CompositeKey>>,
}

impl ChangeSet {
    pub(crate) fn record(&mut self, entity: &str, keys: impl IntoIterator<Item = CompositeKey>) {
        self.entities
            .entry(entity.to_string())
            .or_default()
            .extend(keys);
    }

    /// Touched keys of `entity`, in fetch order.
    pub fn keys(&self, entity: &str) -> Option<&IndexSet<CompositeKey>> {
        self.entities.get(entity)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Touched record count per entity.
    pub fn counts(&self) -> IndexMap<String, usize> {
        self.entities
            .iter()
            .map(|(entity, keys)| (entity.clone(), keys.len()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.entities.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Build the select statement for one entity.
///
/// With `since`, only rows whose last-updated column is strictly after the
/// cutoff are selected; the cutoff is bound as the single parameter.
pub fn select_statement(
    entity: &str,
    spec: &EntitySpec,
    since: Option<DateTime<Utc>>,
) -> (String, Vec<Value>) {
    let columns = spec.projection().join(", ");
    match since {
        Some(cutoff) => (
            format!(
                "SELECT {columns} FROM {entity} WHERE {} > ?",
                spec.last_updated_column
            ),
            vec![Value::Text(cutoff.format(CUTOFF_FORMAT).to_string())],
        ),
        None => (format!("SELECT {columns} FROM {entity}"), Vec::new()),
    }
}

/// Cutoff for an incremental pass started at `now` with the given window.
pub fn cutoff_for(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Runs fetch passes against the query collaborator.
pub struct SyncEngine {
    spec: Arc<GraphSpec>,
    executor: Arc<dyn QueryExecutor>,
    query_timeout: Option<Duration>,
}

impl SyncEngine {
    pub fn new(spec: Arc<GraphSpec>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            spec,
            executor,
            query_timeout: None,
        }
    }

    /// Bound every query by `timeout`.
    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Fetch every row of every declared entity.
    pub async fn fetch_all(
        &self,
        store: &EntityStore,
        ids: &IdMapIndex,
    ) -> Result<ChangeSet, QueryError> {
        self.fetch(store, ids, None).await
    }

    /// Fetch the rows updated within `window` of now, by the local clock.
    ///
    /// See [`CUTOFF_FORMAT`] for the timestamp form and clock assumptions.
    pub async fn fetch_incremental(
        &self,
        store: &EntityStore,
        ids: &IdMapIndex,
        window: Duration,
    ) -> Result<ChangeSet, QueryError> {
        self.fetch_since(store, ids, cutoff_for(Utc::now(), window))
            .await
    }

    /// Fetch the rows updated strictly after `cutoff`.
    pub async fn fetch_since(
        &self,
        store: &EntityStore,
        ids: &IdMapIndex,
        cutoff: DateTime<Utc>,
    ) -> Result<ChangeSet, QueryError> {
        self.fetch(store, ids, Some(cutoff)).await
    }

    async fn fetch(
        &self,
        store: &EntityStore,
        ids: &IdMapIndex,
        since: Option<DateTime<Utc>>,
    ) -> Result<ChangeSet, QueryError> {
        let mut changes = ChangeSet::default();
        self.fetch_into(store, ids, since, &mut changes).await?;
        Ok(changes)
    }

    /// Fetch every entity, recording touched keys into `changes` as each
    /// entity is merged.
    ///
    /// On error, `changes` still holds the keys of the entities merged
    /// before the failing query.
    #[instrument(skip(self, store, ids, changes), fields(incremental = since.is_some()))]
    pub async fn fetch_into(
        &self,
        store: &EntityStore,
        ids: &IdMapIndex,
        since: Option<DateTime<Utc>>,
        changes: &mut ChangeSet,
    ) -> Result<(), QueryError> {
        for (entity, spec) in self.spec.iter() {
            let (query, params) = select_statement(entity, spec, since);
            info!(entity, "Fetching entity");
            debug!(entity, %query, "Executing select");

            let started = Instant::now();
            let rows = self.execute(&query, &params).await?;
            info!(
                entity,
                rows = rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Fetched entity rows"
            );

            let touched = store.load(entity, spec, rows);
            for field in &spec.id_maps {
                ids.update(entity, field, &touched);
            }
            changes.record(entity, touched.iter().map(|record| record.key().clone()));
        }

        Ok(())
    }

    async fn execute(&self, query: &str, params: &[Value]) -> Result<Vec<Row>, QueryError> {
        let Some(timeout) = self.query_timeout else {
            return self.executor.execute(query, params).await;
        };
        tokio::time::timeout(timeout, self.executor.execute(query, params))
            .await
            .map_err(|_| QueryError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?
    }
}
