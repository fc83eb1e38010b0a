//! Scalar column values and rows as returned by the query collaborator.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single row: column name to value, in projection order.
pub type Row = IndexMap<String, Value>;

/// Scalar column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Canonical string form used to build composite keys and id map keys.
    ///
    /// Integers and reals use their decimal form (`1.0` becomes `1`), so an
    /// integer foreign key resolves against a real-typed primary key of the
    /// same numeric value. NULL canonicalizes to the empty string.
    pub fn key_fragment(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Real(r) => r.to_string(),
            Self::Text(s) => s.clone(),
            Self::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            other => f.write_str(&other.key_fragment()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_fragment_forms() {
        assert_eq!(Value::Integer(42).key_fragment(), "42");
        assert_eq!(Value::Real(1.0).key_fragment(), "1");
        assert_eq!(Value::Real(2.5).key_fragment(), "2.5");
        assert_eq!(Value::from("abc").key_fragment(), "abc");
        assert_eq!(Value::Bool(true).key_fragment(), "true");
        assert_eq!(Value::Null.key_fragment(), "");
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7_i64)), Value::Integer(7));
    }

    #[test]
    fn test_display_null() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(3).to_string(), "3");
    }

    proptest! {
        #[test]
        fn integer_and_text_forms_agree(n in any::<i64>()) {
            prop_assert_eq!(Value::Integer(n).key_fragment(), Value::Text(n.to_string()).key_fragment());
        }

        #[test]
        fn whole_reals_match_integers(n in -1_000_000_i64..1_000_000) {
            #[allow(clippy::cast_precision_loss)]
            let real = Value::Real(n as f64);
            prop_assert_eq!(real.key_fragment(), Value::Integer(n).key_fragment());
        }
    }
}
