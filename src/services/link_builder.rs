//! Link builder: attaches child records to the parents their foreign keys
//! reference.
//!
//! Each parent receives one link container per child entity, named by
//! [`container_name`]. Containers are keyed by the child's composite key, so
//! re-linking a child that is already attached is a no-op.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::domain::models::{
    container_name, CompositeKey, ForeignKey, GraphSpec, RecordRef, Value,
};
use crate::services::entity_store::EntityStore;
use crate::services::id_map_index::IdMapIndex;
use crate::services::sync_engine::ChangeSet;

/// A foreign key reference that could not be linked.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkSkip {
    /// The referenced entity has no table. Reported once per declaration.
    #[error("No entity found for {target} (referenced by {entity}.{field})")]
    UnknownEntity {
        entity: String,
        field: String,
        target: ForeignKey,
    },

    /// The referenced field is neither the target's single primary key field
    /// nor one of its identifier fields. Reported once per declaration.
    #[error("{entity}.{field} references {target}, which is neither the primary key nor an id map of its entity")]
    UnresolvableReference {
        entity: String,
        field: String,
        target: ForeignKey,
    },

    /// No parent record carries the child's foreign key value.
    #[error("{entity} {key}: no {target} matches {field} = {value}")]
    LookupMiss {
        entity: String,
        key: CompositeKey,
        field: String,
        value: String,
        target: ForeignKey,
    },
}

/// Outcome of one linking pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    /// Children newly attached to a parent.
    pub attached: usize,
    /// Children whose parent already held them.
    pub already_linked: usize,
    pub skipped: Vec<LinkSkip>,
}

impl LinkReport {
    pub fn lookup_misses(&self) -> usize {
        self.skipped
            .iter()
            .filter(|skip| matches!(skip, LinkSkip::LookupMiss { .. }))
            .count()
    }

    pub fn configuration_errors(&self) -> usize {
        self.skipped.len() - self.lookup_misses()
    }
}

/// How the parent of a foreign key value is found.
enum ParentLookup<'a> {
    /// Through the target's entity table, by composite key.
    PrimaryKey,
    /// Through the id map index, by identifier field.
    IdMap(&'a str),
}

/// Resolves foreign keys of changed records against the store and the id
/// map index.
pub struct LinkBuilder<'a> {
    spec: &'a GraphSpec,
    store: &'a EntityStore,
    ids: &'a IdMapIndex,
}

impl<'a> LinkBuilder<'a> {
    pub const fn new(spec: &'a GraphSpec, store: &'a EntityStore, ids: &'a IdMapIndex) -> Self {
        Self { spec, store, ids }
    }

    /// Link every record named in `changes` that declares foreign keys.
    ///
    /// Never fails: unresolvable declarations and dangling values are
    /// logged and collected in the report.
    pub fn link(&self, changes: &ChangeSet) -> LinkReport {
        let mut report = LinkReport::default();

        for (entity, spec) in self.spec.iter() {
            if spec.fk.is_empty() {
                continue;
            }
            let Some(keys) = changes.keys(entity) else {
                continue;
            };
            let container = container_name(entity);

            for (field, target) in &spec.fk {
                let lookup = match self.parent_lookup(entity, field, target) {
                    Ok(lookup) => lookup,
                    Err(skip) => {
                        error!(%skip, "Skipping foreign key");
                        report.skipped.push(skip);
                        continue;
                    }
                };

                for key in keys {
                    let Some(child) = self.store.get(entity, key) else {
                        continue;
                    };
                    let value = match child.get(field) {
                        Some(value) if !value.is_null() => value,
                        _ => {
                            debug!(entity, %key, field, "Foreign key is null, not linking");
                            continue;
                        }
                    };

                    let Some(parent) = self.find_parent(target, &lookup, &value) else {
                        let skip = LinkSkip::LookupMiss {
                            entity: entity.to_string(),
                            key: key.clone(),
                            field: field.clone(),
                            value: value.key_fragment(),
                            target: target.clone(),
                        };
                        warn!(%skip, "Dangling foreign key");
                        report.skipped.push(skip);
                        continue;
                    };

                    if parent.attach(&container, &child) {
                        report.attached += 1;
                    } else {
                        report.already_linked += 1;
                    }
                }
            }
        }

        debug!(
            attached = report.attached,
            already_linked = report.already_linked,
            skipped = report.skipped.len(),
            "Linking pass finished"
        );
        report
    }

    fn parent_lookup(
        &self,
        entity: &str,
        field: &str,
        target: &'a ForeignKey,
    ) -> Result<ParentLookup<'a>, LinkSkip> {
        let target_spec = self
            .spec
            .get(&target.entity)
            .filter(|_| self.store.contains_entity(&target.entity));
        let Some(target_spec) = target_spec else {
            return Err(LinkSkip::UnknownEntity {
                entity: entity.to_string(),
                field: field.to_string(),
                target: target.clone(),
            });
        };

        if target_spec.pk.len() == 1 && target_spec.pk[0] == target.field {
            Ok(ParentLookup::PrimaryKey)
        } else if target_spec.id_maps.contains(&target.field) {
            Ok(ParentLookup::IdMap(&target.field))
        } else {
            Err(LinkSkip::UnresolvableReference {
                entity: entity.to_string(),
                field: field.to_string(),
                target: target.clone(),
            })
        }
    }

    fn find_parent(
        &self,
        target: &ForeignKey,
        lookup: &ParentLookup<'_>,
        value: &Value,
    ) -> Option<RecordRef> {
        match lookup {
            ParentLookup::PrimaryKey => self
                .store
                .get(&target.entity, &CompositeKey::from_value(value)),
            ParentLookup::IdMap(field) => self.ids.lookup(&target.entity, field, value),
        }
    }
}
