//! Authoritative in-memory tables, one per entity.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::domain::models::{CompositeKey, EntitySpec, Record, RecordRef, Row};

/// Composite key to canonical record.
pub type EntityTable = HashMap<CompositeKey, RecordRef>;

/// Owns the canonical record of every cached row.
///
/// Loads merge by composite key and never remove records, so rows deleted at
/// the source stay cached until teardown.
#[derive(Default)]
pub struct EntityStore {
    tables: RwLock<HashMap<String, EntityTable>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `rows` into the table of `entity`.
    ///
    /// A row whose key already exists overwrites that record's values in
    /// place; otherwise a new record is inserted. Returns the canonical
    /// records touched, in row order. Rows missing a primary key column are
    /// skipped.
    pub fn load(&self, entity: &str, spec: &EntitySpec, rows: Vec<Row>) -> Vec<RecordRef> {
        let mut tables = self.tables.write();
        let table = tables.entry(entity.to_string()).or_default();
        let mut touched = Vec::with_capacity(rows.len());

        for row in rows {
            let Some(key) = CompositeKey::from_row(&spec.pk, &row) else {
                warn!(entity, pk = ?spec.pk, "row is missing a primary key column, skipping");
                continue;
            };

            let record = if let Some(existing) = table.get(&key) {
                existing.overwrite(row);
                Arc::clone(existing)
            } else {
                let record = Arc::new(Record::new(entity, key.clone(), row));
                table.insert(key, Arc::clone(&record));
                record
            };
            touched.push(record);
        }

        touched
    }

    pub fn get(&self, entity: &str, key: &CompositeKey) -> Option<RecordRef> {
        self.tables.read().get(entity)?.get(key).cloned()
    }

    /// Snapshot of an entity table. The records are the live shared objects;
    /// only the key set is a copy.
    pub fn table(&self, entity: &str) -> Option<EntityTable> {
        self.tables.read().get(entity).cloned()
    }

    /// Records of `entity`, in no particular order.
    pub fn records(&self, entity: &str) -> Vec<RecordRef> {
        self.tables
            .read()
            .get(entity)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, HashMap::len)
    }

    pub fn contains_entity(&self, entity: &str) -> bool {
        self.tables.read().contains_key(entity)
    }

    pub fn total_records(&self) -> usize {
        self.tables.read().values().map(HashMap::len).sum()
    }

    /// Empty every entity table. The tables themselves stay registered.
    pub fn clear(&self) {
        for table in self.tables.write().values_mut() {
            table.clear();
        }
    }
}
