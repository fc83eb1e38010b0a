//! Secondary lookup from external identifier values to records.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::{RecordRef, Value};

/// Identifier value (canonical string form) to record.
pub type IdMap = HashMap<String, RecordRef>;

/// One map per `entity.field` identifier declaration.
///
/// Populated from every fetch pass and never pruned: a value keeps pointing
/// at the last record fetched with it.
#[derive(Default)]
pub struct IdMapIndex {
    maps: RwLock<HashMap<String, IdMap>>,
}

fn index_key(entity: &str, field: &str) -> String {
    format!("{entity}.{field}")
}

impl IdMapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `records` by their current `field` value. NULL values are not
    /// indexed.
    pub fn update(&self, entity: &str, field: &str, records: &[RecordRef]) {
        let mut maps = self.maps.write();
        let map = maps.entry(index_key(entity, field)).or_default();
        for record in records {
            match record.get(field) {
                Some(value) if !value.is_null() => {
                    map.insert(value.key_fragment(), Arc::clone(record));
                }
                _ => {}
            }
        }
    }

    /// Snapshot of the `entity.field` map, or `None` if never populated.
    pub fn get(&self, entity: &str, field: &str) -> Option<IdMap> {
        self.maps.read().get(&index_key(entity, field)).cloned()
    }

    pub fn lookup(&self, entity: &str, field: &str, value: &Value) -> Option<RecordRef> {
        self.maps
            .read()
            .get(&index_key(entity, field))?
            .get(&value.key_fragment())
            .cloned()
    }

    /// Entry count per `entity.field` map, sorted by map name.
    pub fn sizes(&self) -> Vec<(String, usize)> {
        let mut sizes: Vec<_> = self
            .maps
            .read()
            .iter()
            .map(|(key, map)| (key.clone(), map.len()))
            .collect();
        sizes.sort();
        sizes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::row;
    use crate::domain::models::{CompositeKey, Record};

    fn student(id: i64, external_id: Option<i64>, name: &str) -> RecordRef {
        Arc::new(Record::new(
            "student",
            CompositeKey::from_value(&Value::Integer(id)),
            row([
                ("id", Value::Integer(id)),
                ("external_id", Value::from(external_id)),
                ("name", Value::from(name)),
            ]),
        ))
    }

    #[test]
    fn test_lookup_by_any_value_form() {
        let index = IdMapIndex::new();
        index.update("student", "external_id", &[student(1, Some(1000), "a")]);

        let found = index
            .lookup("student", "external_id", &Value::Integer(1000))
            .expect("should be indexed");
        assert_eq!(found.get("id"), Some(Value::Integer(1)));
        assert!(index.lookup("student", "external_id", &Value::from("1000")).is_some());
        assert!(index.lookup("student", "external_id", &Value::Integer(9)).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let index = IdMapIndex::new();
        index.update("student", "external_id", &[student(1, Some(1000), "first")]);
        index.update("student", "external_id", &[student(2, Some(1000), "second")]);

        let found = index.lookup("student", "external_id", &Value::Integer(1000)).unwrap();
        assert_eq!(found.get("name"), Some(Value::from("second")));
    }

    #[test]
    fn test_never_populated_map_is_none() {
        let index = IdMapIndex::new();
        assert!(index.get("student", "external_id").is_none());

        index.update("student", "external_id", &[]);
        assert_eq!(index.get("student", "external_id").map(|m| m.len()), Some(0));
    }

    #[test]
    fn test_null_identifiers_are_skipped() {
        let index = IdMapIndex::new();
        index.update("student", "external_id", &[student(1, None, "a")]);
        assert_eq!(index.sizes(), vec![("student.external_id".to_string(), 0)]);
    }
}
