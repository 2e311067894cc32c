use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AccessError, AccessResult};

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Primary key of a record: one or more ordered components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<Value>);

impl Key {
    /// A single-component key.
    pub fn single(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// A composite key from ordered components.
    pub fn composite(components: Vec<Value>) -> Self {
        Self(components)
    }

    /// The ordered key components.
    pub fn components(&self) -> &[Value] {
        &self.0
    }

    /// Stable textual form, usable as a map key.
    pub fn canonical(&self) -> String {
        Value::Array(self.0.clone()).to_string()
    }

    /// Returns `true` if `prefix` matches the leading components of this key.
    pub fn starts_with(&self, prefix: &[Value]) -> bool {
        self.0.len() >= prefix.len() && self.0.iter().zip(prefix).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::single(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self::single(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Self::single(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self::single(value)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One row crossing the accessor boundary.
///
/// The dispatch layer never interprets `fields`; only specifications and
/// backends do.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Logical entity type (table-like name before sharding resolution).
    pub entity_type: String,
    /// Primary key.
    pub key: Key,
    /// Column values.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no fields.
    pub fn new(entity_type: impl Into<String>, key: impl Into<Key>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key: key.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Convert a typed entity into a record.
    pub fn from_entity<E: Entity>(entity: &E) -> AccessResult<Self> {
        let value =
            serde_json::to_value(entity).map_err(|e| AccessError::Serialization(e.to_string()))?;
        match value {
            Value::Object(fields) => Ok(Self {
                entity_type: E::ENTITY_TYPE.to_string(),
                key: entity.key(),
                fields,
            }),
            other => Err(AccessError::Serialization(format!(
                "{} did not serialize to an object: {other}",
                E::ENTITY_TYPE
            ))),
        }
    }

    /// Decode this record's fields into a typed entity.
    pub fn to_entity<E: Entity>(&self) -> AccessResult<E> {
        if self.entity_type != E::ENTITY_TYPE {
            return Err(AccessError::Serialization(format!(
                "expected {}, got {}",
                E::ENTITY_TYPE,
                self.entity_type
            )));
        }
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|e| AccessError::Serialization(e.to_string()))
    }
}

/// A typed entity with a fixed entity type name and a primary key.
pub trait Entity: Serialize + DeserializeOwned {
    /// Entity type name used for every record of this type.
    const ENTITY_TYPE: &'static str;

    /// Primary key of this instance.
    fn key(&self) -> Key;
}

// ---------------------------------------------------------------------------
// Statement
// ---------------------------------------------------------------------------

/// A raw statement with positional parameters.
///
/// Schema and table placeholders are substituted by the access-options
/// collaborator before the text reaches an accessor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    pub params: Vec<Value>,
}

impl Statement {
    /// A statement with no parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Append a positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Positional parameter by zero-based index.
    pub fn param(&self, index: usize) -> Option<&Value> {
        self.params.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: i64,
        customer: String,
        total: i64,
    }

    impl Entity for Order {
        const ENTITY_TYPE: &'static str = "order";

        fn key(&self) -> Key {
            Key::from(self.id)
        }
    }

    #[test]
    fn key_canonical_is_stable() {
        let a = Key::composite(vec![json!("eu"), json!(7)]);
        let b = Key::composite(vec![json!("eu"), json!(7)]);
        assert_eq!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), Key::single("eu").canonical());
        assert_eq!(a.to_string(), "eu,7");
    }

    #[test]
    fn key_prefix_match() {
        let key = Key::composite(vec![json!("eu"), json!(7)]);
        assert!(key.starts_with(&[json!("eu")]));
        assert!(key.starts_with(&[]));
        assert!(!key.starts_with(&[json!("us")]));
        assert!(!key.starts_with(&[json!("eu"), json!(7), json!(1)]));
    }

    #[test]
    fn entity_conversion() {
        let order = Order {
            id: 42,
            customer: "ada".into(),
            total: 1200,
        };
        let record = Record::from_entity(&order).unwrap();
        assert_eq!(record.entity_type, "order");
        assert_eq!(record.key, Key::from(42));
        assert_eq!(record.field("customer"), Some(&json!("ada")));
        assert_eq!(record.to_entity::<Order>().unwrap(), order);
    }

    #[test]
    fn entity_type_mismatch() {
        let record = Record::new("invoice", 1).with_field("id", 1);
        assert!(matches!(
            record.to_entity::<Order>(),
            Err(AccessError::Serialization(_))
        ));
    }

    #[test]
    fn statement_params() {
        let stmt = Statement::new("SELECT * FROM {table} WHERE id = ?")
            .bind(3)
            .bind("x");
        assert_eq!(stmt.param(0), Some(&json!(3)));
        assert_eq!(stmt.param(1), Some(&json!("x")));
        assert!(stmt.param(2).is_none());
    }
}
