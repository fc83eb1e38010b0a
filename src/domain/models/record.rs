//! Canonical in-memory records and their link containers.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::sync::Arc;

use super::value::{Row, Value};

/// Separator placed between primary key fragments.
pub const KEY_SEPARATOR: &str = "|";

/// Identity of a record within its entity table.
///
/// Built from the canonical string form of each primary key field, in the
/// declared order, joined with `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    /// Build the key for `row` from the ordered primary key fields.
    ///
    /// Returns `None` if the row lacks one of the primary key columns.
    pub fn from_row(pk: &[String], row: &Row) -> Option<Self> {
        let mut parts = Vec::with_capacity(pk.len());
        for field in pk {
            parts.push(row.get(field)?.key_fragment());
        }
        Some(Self(parts.join(KEY_SEPARATOR)))
    }

    /// Single-field key, as used when resolving a foreign key value.
    pub fn from_value(value: &Value) -> Self {
        Self(value.key_fragment())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CompositeKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CompositeKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Shared handle to a canonical record.
pub type RecordRef = Arc<Record>;

/// Ordered set of child records keyed by their composite key.
pub type LinkContainer = IndexMap<CompositeKey, RecordRef>;

/// The single canonical object for one logical row.
///
/// The same `Arc<Record>` is held by the entity table, the id map index and
/// every link container it is attached to, so value overwrites and newly
/// attached links are visible through all of them.
pub struct Record {
    entity: String,
    key: CompositeKey,
    values: RwLock<Row>,
    links: RwLock<IndexMap<String, LinkContainer>>,
}

impl Record {
    pub fn new(entity: impl Into<String>, key: CompositeKey, values: Row) -> Self {
        Self {
            entity: entity.into(),
            key,
            values: RwLock::new(values),
            links: RwLock::new(IndexMap::new()),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub const fn key(&self) -> &CompositeKey {
        &self.key
    }

    /// Current value of `column`, if the column was fetched.
    pub fn get(&self, column: &str) -> Option<Value> {
        self.values.read().get(column).cloned()
    }

    /// Snapshot of all column values.
    pub fn values(&self) -> Row {
        self.values.read().clone()
    }

    /// Replace the column values in place, keeping identity and links.
    pub(crate) fn overwrite(&self, values: Row) {
        *self.values.write() = values;
    }

    /// Children attached under `container`, in attachment order.
    pub fn links(&self, container: &str) -> Vec<RecordRef> {
        self.links
            .read()
            .get(container)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of the link containers present on this record.
    pub fn link_names(&self) -> Vec<String> {
        self.links.read().keys().cloned().collect()
    }

    pub fn link_count(&self, container: &str) -> usize {
        self.links.read().get(container).map_or(0, IndexMap::len)
    }

    /// Attach `child` under `container`.
    ///
    /// Returns `false` if a child with the same composite key was already
    /// attached; the container is left unchanged in that case.
    pub(crate) fn attach(&self, container: &str, child: &RecordRef) -> bool {
        let mut links = self.links.write();
        let slot = links.entry(container.to_string()).or_default();
        if slot.contains_key(child.key()) {
            return false;
        }
        slot.insert(child.key().clone(), Arc::clone(child));
        true
    }

    /// JSON view of the record: its columns plus one array of child keys per
    /// link container.
    pub fn to_json(&self) -> JsonValue {
        let mut object = Map::new();
        for (column, value) in self.values.read().iter() {
            object.insert(
                column.clone(),
                serde_json::to_value(value).unwrap_or(JsonValue::Null),
            );
        }
        for (name, container) in self.links.read().iter() {
            let keys = container
                .keys()
                .map(|k| JsonValue::String(k.to_string()))
                .collect();
            object.insert(name.clone(), JsonValue::Array(keys));
        }
        JsonValue::Object(object)
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("entity", &self.entity)
            .field("key", &self.key)
            .field("values", &*self.values.read())
            .field("links", &self.link_names())
            .finish()
    }
}

/// Link container name for a child entity: lower camel case, naively
/// pluralized with a trailing `s` (`campaign_line` becomes `campaignLines`).
pub fn container_name(child_entity: &str) -> String {
    let mut name = String::with_capacity(child_entity.len() + 1);
    for (i, word) in child_entity.split('_').enumerate() {
        if i == 0 {
            name.push_str(word);
            continue;
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name.push('s');
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_composite_key_respects_declared_order() {
        let r = row(&[("a", Value::Integer(1)), ("b", Value::from("x"))]);
        let ab = CompositeKey::from_row(&["a".into(), "b".into()], &r).unwrap();
        let ba = CompositeKey::from_row(&["b".into(), "a".into()], &r).unwrap();
        assert_eq!(ab.as_str(), "1|x");
        assert_eq!(ba.as_str(), "x|1");
    }

    #[test]
    fn test_composite_key_missing_field() {
        let r = row(&[("a", Value::Integer(1))]);
        assert!(CompositeKey::from_row(&["a".into(), "b".into()], &r).is_none());
    }

    #[test]
    fn test_single_value_key_matches_single_field_pk() {
        let r = row(&[("id", Value::Integer(10))]);
        let pk = CompositeKey::from_row(&["id".into()], &r).unwrap();
        assert_eq!(pk, CompositeKey::from_value(&Value::Integer(10)));
    }

    #[test]
    fn test_container_name() {
        assert_eq!(container_name("score"), "scores");
        assert_eq!(container_name("campaign_line"), "campaignLines");
        assert_eq!(container_name("campaign_product_tag"), "campaignProductTags");
    }

    #[test]
    fn test_attach_deduplicates_by_key() {
        let parent = Record::new("student", "1".into(), Row::new());
        let child: RecordRef = Arc::new(Record::new("score", "1|1".into(), Row::new()));
        let same_key: RecordRef = Arc::new(Record::new("score", "1|1".into(), Row::new()));

        assert!(parent.attach("scores", &child));
        assert!(!parent.attach("scores", &child));
        assert!(!parent.attach("scores", &same_key));
        assert_eq!(parent.link_count("scores"), 1);
    }

    #[test]
    fn test_overwrite_keeps_links() {
        let parent = Record::new("student", "1".into(), row(&[("name", Value::from("a"))]));
        let child: RecordRef = Arc::new(Record::new("score", "1|1".into(), Row::new()));
        parent.attach("scores", &child);

        parent.overwrite(row(&[("name", Value::from("b"))]));

        assert_eq!(parent.get("name"), Some(Value::from("b")));
        assert_eq!(parent.link_count("scores"), 1);
    }

    #[test]
    fn test_to_json_includes_link_keys() {
        let parent = Record::new("student", "1".into(), row(&[("id", Value::Integer(1))]));
        let child: RecordRef = Arc::new(Record::new("score", "1|2".into(), Row::new()));
        parent.attach("scores", &child);

        let json = parent.to_json();
        assert_eq!(json["id"], serde_json::json!(1));
        assert_eq!(json["scores"], serde_json::json!(["1|2"]));
    }
}
