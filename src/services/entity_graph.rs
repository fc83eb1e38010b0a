//! Entity graph facade.
//!
//! Owns one instance's store, id map index, sync engine and scheduler. All
//! fetch and link passes of an instance are serialized through its pass
//! lock: a manual [`EntityGraph::refresh`] waits for it, a scheduled one
//! skips its tick when the lock is taken.

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{GraphError, GraphResult};
use crate::domain::models::{CompositeKey, GraphOptions, GraphSpec, RecordRef, Value};
use crate::domain::ports::QueryExecutor;
use crate::services::entity_store::{EntityStore, EntityTable};
use crate::services::id_map_index::{IdMap, IdMapIndex};
use crate::services::link_builder::{LinkBuilder, LinkReport};
use crate::services::refresh_scheduler::{
    RefreshEvent, RefreshScheduler, RefreshTarget, SchedulerConfig, SchedulerHandle,
    SchedulerStatus,
};
use crate::services::sync_engine::{cutoff_for, ChangeSet, SyncEngine};

/// Lifecycle of a graph instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphState {
    Constructed,
    Ready,
    TornDown,
}

/// Kind of fetch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Full,
    Incremental,
}

/// Outcome of one fetch and link pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub kind: PassKind,
    /// Records touched per entity, in declaration order.
    pub fetched: IndexMap<String, usize>,
    pub links: LinkReport,
    pub duration_ms: u64,
}

impl RefreshReport {
    pub fn empty(kind: PassKind) -> Self {
        Self {
            kind,
            fetched: IndexMap::new(),
            links: LinkReport::default(),
            duration_ms: 0,
        }
    }

    pub fn total_fetched(&self) -> usize {
        self.fetched.values().sum()
    }
}

/// Record and link totals of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub entity: String,
    pub records: usize,
    /// Children held per link container name, summed over all records.
    pub links: IndexMap<String, usize>,
}

/// Snapshot of an instance's contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub instance: Uuid,
    pub state: GraphState,
    pub entities: Vec<EntityStats>,
    /// Entries per `entity.field` id map.
    pub id_maps: IndexMap<String, usize>,
}

struct GraphInner {
    id: Uuid,
    spec: Arc<GraphSpec>,
    options: GraphOptions,
    engine: SyncEngine,
    store: EntityStore,
    ids: IdMapIndex,
    state: RwLock<GraphState>,
    pass_lock: Mutex<()>,
    events: broadcast::Sender<RefreshEvent>,
}

impl GraphInner {
    fn ensure_ready(&self) -> GraphResult<()> {
        match *self.state.read() {
            GraphState::Ready => Ok(()),
            GraphState::Constructed => Err(GraphError::NotInitialized(self.id)),
            GraphState::TornDown => Err(GraphError::TornDown(self.id)),
        }
    }

    /// Fetch, then link what the fetch touched. Callers hold the pass lock.
    ///
    /// If a query fails part way, the entities merged before it are still
    /// linked before the error is returned.
    async fn run_pass(&self, kind: PassKind) -> GraphResult<RefreshReport> {
        let started = Instant::now();
        let since = match kind {
            PassKind::Full => None,
            PassKind::Incremental => Some(cutoff_for(Utc::now(), self.options.update_window())),
        };
        let mut changes = ChangeSet::default();
        let fetched = self
            .engine
            .fetch_into(&self.store, &self.ids, since, &mut changes)
            .await;
        let links = LinkBuilder::new(&self.spec, &self.store, &self.ids).link(&changes);

        if let Err(e) = fetched {
            warn!(
                instance = %self.id,
                kind = ?kind,
                fetched = changes.total(),
                attached = links.attached,
                error = %e,
                "Pass failed, linked the entities fetched before the failure"
            );
            return Err(e.into());
        }

        let report = RefreshReport {
            kind,
            fetched: changes.counts(),
            links,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            instance = %self.id,
            kind = ?report.kind,
            fetched = report.total_fetched(),
            attached = report.links.attached,
            skipped = report.links.skipped.len(),
            duration_ms = report.duration_ms,
            "Pass completed"
        );
        Ok(report)
    }
}

#[async_trait]
impl RefreshTarget for GraphInner {
    async fn try_refresh(&self) -> Option<GraphResult<RefreshReport>> {
        let Ok(_pass) = self.pass_lock.try_lock() else {
            return None;
        };
        Some(match self.ensure_ready() {
            Ok(()) => self.run_pass(PassKind::Incremental).await,
            Err(e) => Err(e),
        })
    }

    fn instance_id(&self) -> Uuid {
        self.id
    }
}

/// In-memory entity graph over a relational source.
///
/// Every cached row is held as exactly one shared [`Record`](crate::domain::models::Record).
/// Parents carry link containers of their children, built from the
/// foreign keys declared in the [`GraphSpec`].
pub struct EntityGraph {
    inner: Arc<GraphInner>,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl EntityGraph {
    /// Build an empty, uninitialized graph. Nothing is fetched until
    /// [`initialize`](Self::initialize).
    pub fn new(
        spec: GraphSpec,
        options: GraphOptions,
        executor: Arc<dyn QueryExecutor>,
    ) -> GraphResult<Self> {
        spec.validate()?;
        let id = Uuid::new_v4();
        let spec = Arc::new(spec);
        let engine = SyncEngine::new(Arc::clone(&spec), executor)
            .with_query_timeout(options.query_timeout());
        let (events, _) = broadcast::channel(64);

        info!(instance = %id, entities = spec.len(), "Graph instance constructed");

        Ok(Self {
            inner: Arc::new(GraphInner {
                id,
                spec,
                options,
                engine,
                store: EntityStore::new(),
                ids: IdMapIndex::new(),
                state: RwLock::new(GraphState::Constructed),
                pass_lock: Mutex::new(()),
                events,
            }),
            scheduler: Mutex::new(None),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn spec(&self) -> &GraphSpec {
        &self.inner.spec
    }

    pub fn options(&self) -> &GraphOptions {
        &self.inner.options
    }

    pub fn state(&self) -> GraphState {
        *self.inner.state.read()
    }

    /// Run the full fetch and link pass, then start periodic refresh if an
    /// interval is configured.
    ///
    /// A failed initialization leaves the graph `Constructed`, with whatever
    /// entities were fetched before the failure merged; it may be retried.
    #[instrument(skip(self), fields(instance = %self.inner.id))]
    pub async fn initialize(&self) -> GraphResult<RefreshReport> {
        let _pass = self.inner.pass_lock.lock().await;
        let state = *self.inner.state.read();
        match state {
            GraphState::Constructed => {}
            GraphState::Ready => return Err(GraphError::AlreadyInitialized(self.inner.id)),
            GraphState::TornDown => return Err(GraphError::TornDown(self.inner.id)),
        }

        let report = self.inner.run_pass(PassKind::Full).await?;
        *self.inner.state.write() = GraphState::Ready;

        if let Some(interval) = self.inner.options.refresh_interval() {
            let scheduler = RefreshScheduler::new(
                Arc::clone(&self.inner),
                SchedulerConfig::with_interval(interval),
            )
            .with_events(self.inner.events.clone());
            *self.scheduler.lock().await = Some(scheduler.start());
        }

        info!(records = self.inner.store.total_records(), "Graph initialized");
        Ok(report)
    }

    /// Run one incremental pass now, waiting for any pass in flight.
    pub async fn refresh(&self) -> GraphResult<RefreshReport> {
        let _pass = self.inner.pass_lock.lock().await;
        self.inner.ensure_ready()?;
        self.inner.run_pass(PassKind::Incremental).await
    }

    /// Record whose `field` identifier equals `value`.
    pub fn get_by_identifier(
        &self,
        entity: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> Option<RecordRef> {
        self.inner.ids.lookup(entity, field, &value.into())
    }

    /// Snapshot of the identifier map for `entity.field`.
    pub fn id_map(&self, entity: &str, field: &str) -> Option<IdMap> {
        self.inner.ids.get(entity, field)
    }

    /// Snapshot of an entity table; the records in it are live.
    pub fn entity_table(&self, entity: &str) -> Option<EntityTable> {
        self.inner.store.table(entity)
    }

    pub fn record(&self, entity: &str, key: &CompositeKey) -> Option<RecordRef> {
        self.inner.store.get(entity, key)
    }

    pub fn stats(&self) -> GraphStats {
        let entities = self
            .inner
            .spec
            .iter()
            .map(|(entity, _)| {
                let records = self.inner.store.records(entity);
                let mut links: IndexMap<String, usize> = IndexMap::new();
                for record in &records {
                    for name in record.link_names() {
                        *links.entry(name.clone()).or_default() += record.link_count(&name);
                    }
                }
                links.sort_keys();
                EntityStats {
                    entity: entity.to_string(),
                    records: records.len(),
                    links,
                }
            })
            .collect();

        GraphStats {
            instance: self.inner.id,
            state: self.state(),
            entities,
            id_maps: self.inner.ids.sizes().into_iter().collect(),
        }
    }

    /// Status of the periodic refresh, if one is running.
    pub async fn scheduler_status(&self) -> Option<SchedulerStatus> {
        match self.scheduler.lock().await.as_ref() {
            Some(handle) => Some(handle.status().await),
            None => None,
        }
    }

    /// Receive refresh scheduler events of this instance.
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.inner.events.subscribe()
    }

    /// Stop periodic refresh and empty the entity tables.
    ///
    /// Waits for a pass in flight to finish. Id maps and link containers are
    /// left as they are. Calling it again is a no-op.
    #[instrument(skip(self), fields(instance = %self.inner.id))]
    pub async fn teardown(&self) {
        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.stop();
        }
        let _pass = self.inner.pass_lock.lock().await;
        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.stop();
        }

        if *self.inner.state.read() == GraphState::TornDown {
            return;
        }
        *self.inner.state.write() = GraphState::TornDown;
        self.inner.store.clear();
        info!("Graph torn down");
    }
}

impl Drop for EntityGraph {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.get_mut().take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{row, MockQueryExecutor};
    use crate::domain::models::EntitySpec;
    use crate::services::link_builder::LinkSkip;
    use std::time::Duration;

    fn school() -> GraphSpec {
        GraphSpec::new()
            .entity(
                "student",
                EntitySpec::new(["id"]).columns(["name"]).id_maps(["external_id"]),
            )
            .entity(
                "score",
                EntitySpec::new(["student_id", "subject_id"])
                    .columns(["score"])
                    .foreign_key("student_id", "student.id")
                    .unwrap(),
            )
    }

    fn student(id: i64, name: &str) -> crate::domain::models::Row {
        row([
            ("id", Value::Integer(id)),
            ("name", Value::from(name)),
            ("external_id", Value::Integer(id + 999)),
        ])
    }

    fn score(student_id: i64, subject_id: i64, value: i64) -> crate::domain::models::Row {
        row([
            ("student_id", student_id),
            ("subject_id", subject_id),
            ("score", value),
        ])
    }

    fn seeded_mock() -> Arc<MockQueryExecutor> {
        let mock = Arc::new(MockQueryExecutor::new());
        mock.set_rows("student", vec![student(1, "a"), student(2, "b"), student(3, "c")]);
        mock.set_rows("score", vec![score(1, 1, 90), score(1, 2, 80), score(2, 1, 70)]);
        mock.set_recent_rows("student", vec![]);
        mock.set_recent_rows("score", vec![]);
        mock
    }

    fn graph(mock: &Arc<MockQueryExecutor>, options: GraphOptions) -> EntityGraph {
        EntityGraph::new(school(), options, Arc::clone(mock) as Arc<dyn QueryExecutor>).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_populates_and_links() {
        let mock = seeded_mock();
        let graph = graph(&mock, GraphOptions::default());

        let report = graph.initialize().await.unwrap();

        assert_eq!(report.kind, PassKind::Full);
        assert_eq!(report.fetched["student"], 3);
        assert_eq!(report.links.attached, 3);
        assert_eq!(graph.state(), GraphState::Ready);
        assert_eq!(graph.entity_table("student").unwrap().len(), 3);

        let first = graph.get_by_identifier("student", "external_id", 1000).unwrap();
        assert_eq!(first.get("id"), Some(Value::Integer(1)));
        assert_eq!(first.link_count("scores"), 2);
    }

    #[tokio::test]
    async fn test_refresh_overwrites_in_place() {
        let mock = seeded_mock();
        let graph = graph(&mock, GraphOptions::default());
        graph.initialize().await.unwrap();
        let before = graph.record("student", &"1".into()).unwrap();

        mock.set_recent_rows("student", vec![student(1, "renamed")]);
        mock.set_recent_rows("score", vec![score(1, 1, 95), score(3, 1, 60)]);
        let report = graph.refresh().await.unwrap();

        assert_eq!(report.kind, PassKind::Incremental);
        assert_eq!(report.links.attached, 1);
        assert_eq!(report.links.already_linked, 1);
        assert_eq!(before.get("name"), Some(Value::from("renamed")));
        assert_eq!(before.link_count("scores"), 2);
        assert_eq!(graph.entity_table("student").unwrap().len(), 3);
        assert_eq!(
            graph.record("student", &"3".into()).unwrap().link_count("scores"),
            1
        );
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let mock = seeded_mock();
        let graph = graph(&mock, GraphOptions::default());

        assert!(matches!(graph.refresh().await, Err(GraphError::NotInitialized(_))));
        graph.initialize().await.unwrap();
        assert!(matches!(graph.initialize().await, Err(GraphError::AlreadyInitialized(_))));

        graph.teardown().await;
        graph.teardown().await;
        assert_eq!(graph.state(), GraphState::TornDown);
        assert!(matches!(graph.refresh().await, Err(GraphError::TornDown(_))));
        assert!(matches!(graph.initialize().await, Err(GraphError::TornDown(_))));
        assert_eq!(graph.entity_table("student").map(|t| t.len()), Some(0));
    }

    #[tokio::test]
    async fn test_failed_initialize_can_be_retried() {
        let mock = seeded_mock();
        mock.fail_next("connection reset");
        let graph = graph(&mock, GraphOptions::default());

        assert!(matches!(graph.initialize().await, Err(GraphError::Query(_))));
        assert_eq!(graph.state(), GraphState::Constructed);
        assert!(graph.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_dangling_reference_does_not_fail_pass() {
        let mock = seeded_mock();
        mock.set_rows("score", vec![score(9, 1, 10)]);
        let graph = graph(&mock, GraphOptions::default());

        let report = graph.initialize().await.unwrap();

        assert!(matches!(&report.links.skipped[..], [LinkSkip::LookupMiss { .. }]));
    }

    #[tokio::test]
    async fn test_stats() {
        let mock = seeded_mock();
        let graph = graph(&mock, GraphOptions::default());
        graph.initialize().await.unwrap();

        let stats = graph.stats();

        assert_eq!(stats.state, GraphState::Ready);
        assert_eq!(stats.entities[0].entity, "student");
        assert_eq!(stats.entities[0].records, 3);
        assert_eq!(stats.entities[0].links["scores"], 3);
        assert_eq!(stats.id_maps["student.external_id"], 3);
    }

    #[tokio::test]
    async fn test_zero_refresh_interval_means_no_scheduler() {
        let mock = seeded_mock();
        let options = GraphOptions {
            refresh_interval_ms: Some(0),
            ..GraphOptions::default()
        };
        let graph = graph(&mock, options);

        graph.initialize().await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(graph.scheduler_status().await.is_none());
        assert_eq!(mock.call_count(), 2, "only the initial full pass runs");
        graph.teardown().await;
    }

    #[tokio::test]
    async fn test_sub_millisecond_interval_schedules_refresh() {
        let mock = seeded_mock();
        let graph = graph(
            &mock,
            GraphOptions::default().with_refresh_interval(Duration::from_micros(500)),
        );
        let mut events = graph.subscribe();
        graph.initialize().await.unwrap();

        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(RefreshEvent::Completed { .. })) => break,
                Ok(Ok(_) | Err(broadcast::error::RecvError::Lagged(_))) => {}
                other => panic!("no scheduled refresh completed: {other:?}"),
            }
        }
        let status = graph.scheduler_status().await.unwrap();
        assert!(status.running);
        graph.teardown().await;
    }

    #[tokio::test]
    async fn test_failed_refresh_links_entities_fetched_before_failure() {
        let mock = seeded_mock();
        mock.set_rows("subject", vec![]);
        let spec = school().entity("subject", EntitySpec::new(["id"]));
        let graph = EntityGraph::new(
            spec,
            GraphOptions::default(),
            Arc::clone(&mock) as Arc<dyn QueryExecutor>,
        )
        .unwrap();
        graph.initialize().await.unwrap();

        // `subject` has no recent rows scripted, so its query fails.
        mock.set_recent_rows("score", vec![score(3, 1, 60)]);
        let result = graph.refresh().await;

        assert!(matches!(result, Err(GraphError::Query(_))));
        let chloe = graph.record("student", &"3".into()).unwrap();
        assert_eq!(chloe.link_count("scores"), 1);
    }

    #[tokio::test]
    async fn test_scheduler_starts_with_interval_and_stops_on_teardown() {
        let mock = seeded_mock();
        let graph = graph(
            &mock,
            GraphOptions::default().with_refresh_interval(Duration::from_millis(20)),
        );
        let mut events = graph.subscribe();
        graph.initialize().await.unwrap();

        loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await {
                Ok(Ok(RefreshEvent::Completed { .. })) => break,
                Ok(Ok(_)) => {}
                other => panic!("no scheduled refresh completed: {other:?}"),
            }
        }
        assert!(graph.scheduler_status().await.unwrap().successful_runs >= 1);

        graph.teardown().await;
        assert!(graph.scheduler_status().await.is_none());
        let calls = mock.call_count();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(mock.call_count(), calls);
    }
}
