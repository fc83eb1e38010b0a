//! Caller-declared description of the cached entities.
//!
//! Entity and field names are trusted identifiers: they are embedded into
//! generated query text without escaping, so a graph spec must never be built
//! from untrusted input.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::domain::errors::SpecError;

/// Default name of the last-updated timestamp column.
pub const DEFAULT_LAST_UPDATED_COLUMN: &str = "last_updated";

/// A `<entity>.<field>` foreign key target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ForeignKey {
    pub entity: String,
    pub field: String,
}

impl FromStr for ForeignKey {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((entity, field))
                if !entity.is_empty() && !field.is_empty() && !field.contains('.') =>
            {
                Ok(Self {
                    entity: entity.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Err(SpecError::MalformedReference(s.to_string())),
        }
    }
}

impl TryFrom<String> for ForeignKey {
    type Error = SpecError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ForeignKey> for String {
    fn from(fk: ForeignKey) -> Self {
        fk.to_string()
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// Declaration of one cached entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EntitySpec {
    /// Ordered primary key fields.
    pub pk: Vec<String>,

    /// Value columns fetched alongside the key.
    #[serde(default)]
    pub columns: Vec<String>,

    /// External identifier fields indexed in the id map index.
    #[serde(default)]
    pub id_maps: Vec<String>,

    /// Timestamp column used by incremental fetches.
    #[serde(default = "default_last_updated_column")]
    pub last_updated_column: String,

    /// Local field to `<entity>.<field>` references.
    #[serde(default)]
    pub fk: IndexMap<String, ForeignKey>,
}

fn default_last_updated_column() -> String {
    DEFAULT_LAST_UPDATED_COLUMN.to_string()
}

impl EntitySpec {
    pub fn new<I, S>(pk: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pk: pk.into_iter().map(Into::into).collect(),
            columns: Vec::new(),
            id_maps: Vec::new(),
            last_updated_column: default_last_updated_column(),
            fk: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn id_maps<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.id_maps = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn last_updated_column(mut self, column: impl Into<String>) -> Self {
        self.last_updated_column = column.into();
        self
    }

    /// Declare `field` as referencing `reference` (`"<entity>.<field>"`).
    pub fn foreign_key(mut self, field: impl Into<String>, reference: &str) -> Result<Self, SpecError> {
        self.fk.insert(field.into(), reference.parse()?);
        Ok(self)
    }

    /// Columns selected for this entity: primary key, value columns,
    /// identifier fields and foreign key fields, first occurrence wins.
    pub fn projection(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        let candidates = self
            .pk
            .iter()
            .chain(&self.columns)
            .chain(&self.id_maps)
            .chain(self.fk.keys());
        for column in candidates {
            if !out.contains(&column.as_str()) {
                out.push(column);
            }
        }
        out
    }
}

/// All cached entities, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphSpec {
    entities: IndexMap<String, EntitySpec>,
}

impl GraphSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entity declaration.
    #[must_use]
    pub fn entity(mut self, name: impl Into<String>, spec: EntitySpec) -> Self {
        self.entities.insert(name.into(), spec);
        self
    }

    pub fn get(&self, entity: &str) -> Option<&EntitySpec> {
        self.entities.get(entity)
    }

    /// Entities in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntitySpec)> {
        self.entities.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Structural validation.
    ///
    /// References to entities that are not declared are accepted here; they
    /// are reported when the link builder tries to resolve them.
    pub fn validate(&self) -> Result<(), SpecError> {
        for (name, entity) in &self.entities {
            if entity.pk.is_empty() || entity.pk.iter().any(String::is_empty) {
                return Err(SpecError::EmptyPrimaryKey(name.clone()));
            }
            for (field, target) in &entity.fk {
                if field.is_empty() || target.entity.is_empty() || target.field.is_empty() {
                    return Err(SpecError::InvalidReference {
                        entity: name.clone(),
                        field: field.clone(),
                        reference: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHOOL: &str = r"
student:
  pk: [id]
  columns: [name]
  id_maps: [external_id]
score:
  pk: [student_id, subject_id]
  columns: [score]
  last_updated_column: updated_at
  fk:
    student_id: student.id
";

    #[test]
    fn test_yaml_preserves_declaration_order() {
        let spec = GraphSpec::from_yaml(SCHOOL).expect("spec should parse");
        let names: Vec<_> = spec.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["student", "score"]);
    }

    #[test]
    fn test_yaml_defaults_and_fk() {
        let spec = GraphSpec::from_yaml(SCHOOL).unwrap();
        let student = spec.get("student").unwrap();
        assert_eq!(student.last_updated_column, "last_updated");
        assert!(student.fk.is_empty());

        let score = spec.get("score").unwrap();
        assert_eq!(score.last_updated_column, "updated_at");
        let target = &score.fk["student_id"];
        assert_eq!(target.entity, "student");
        assert_eq!(target.field, "id");
    }

    #[test]
    fn test_malformed_reference_rejected() {
        let yaml = "score:\n  pk: [id]\n  fk:\n    student_id: student\n";
        assert!(GraphSpec::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_pk_rejected() {
        let spec = GraphSpec::new().entity("student", EntitySpec::new(Vec::<String>::new()));
        assert!(matches!(spec.validate(), Err(SpecError::EmptyPrimaryKey(e)) if e == "student"));
    }

    #[test]
    fn test_undeclared_fk_target_is_structurally_valid() {
        let spec = GraphSpec::new().entity(
            "score",
            EntitySpec::new(["id"])
                .foreign_key("mentor_id", "mentor.id")
                .unwrap(),
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_projection_deduplicates() {
        let spec = EntitySpec::new(["student_id", "subject_id"])
            .columns(["score", "student_id"])
            .id_maps(["external_id"])
            .foreign_key("student_id", "student.id")
            .unwrap()
            .foreign_key("mentor_id", "mentor.id")
            .unwrap();
        assert_eq!(
            spec.projection(),
            vec!["student_id", "subject_id", "score", "external_id", "mentor_id"]
        );
    }

    #[test]
    fn test_foreign_key_round_trips_as_string() {
        let fk: ForeignKey = "campaign.id".parse().unwrap();
        assert_eq!(String::from(fk), "campaign.id");
        assert!("campaign.id.x".parse::<ForeignKey>().is_err());
        assert!(".id".parse::<ForeignKey>().is_err());
    }
}
