//! Cache core: storage, fetching, linking and scheduling.

pub mod entity_graph;
pub mod entity_store;
pub mod id_map_index;
pub mod link_builder;
pub mod refresh_scheduler;
pub mod sync_engine;

pub use entity_graph::{
    EntityGraph, EntityStats, GraphState, GraphStats, PassKind, RefreshReport,
};
pub use entity_store::{EntityStore, EntityTable};
pub use id_map_index::{IdMap, IdMapIndex};
pub use link_builder::{LinkBuilder, LinkReport, LinkSkip};
pub use refresh_scheduler::{
    RefreshEvent, RefreshScheduler, RefreshTarget, SchedulerConfig, SchedulerHandle,
    SchedulerStatus,
};
pub use sync_engine::{ChangeSet, SyncEngine};
