use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Item;

/// The primary key of an item: collections use either integer or string keys.
///
/// Two keys are only equal when both kind and value match, so `5` and `"5"`
/// are different keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    Str(String),
}

impl PrimaryKey {
    /// Read a key from a JSON value. Floats, booleans, `null` and composite
    /// values are not keys.
    pub fn from_value(value: &Value) -> Option<PrimaryKey> {
        match value {
            Value::Number(n) => n.as_i64().map(PrimaryKey::Int),
            Value::String(s) => Some(PrimaryKey::Str(s.clone())),
            _ => None,
        }
    }

    /// Read the key stored under `field` in `item`.
    pub fn of_item(item: &Item, field: &str) -> Option<PrimaryKey> {
        item.get(field).and_then(PrimaryKey::from_value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Int(i) => Value::from(*i),
            PrimaryKey::Str(s) => Value::String(s.clone()),
        }
    }
}

impl Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryKey::Int(i) => write!(f, "{}", i),
            PrimaryKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(i: i64) -> Self {
        PrimaryKey::Int(i)
    }
}

impl From<&str> for PrimaryKey {
    fn from(s: &str) -> Self {
        PrimaryKey::Str(s.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(s: String) -> Self {
        PrimaryKey::Str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value() {
        assert_eq!(PrimaryKey::from_value(&json!(5)), Some(PrimaryKey::Int(5)));
        assert_eq!(
            PrimaryKey::from_value(&json!("abc")),
            Some(PrimaryKey::Str("abc".to_string()))
        );
        assert_eq!(PrimaryKey::from_value(&json!(1.5)), None);
        assert_eq!(PrimaryKey::from_value(&json!(null)), None);
        assert_eq!(PrimaryKey::from_value(&json!({"id": 1})), None);
    }

    #[test]
    fn test_int_and_string_keys_differ() {
        assert_ne!(PrimaryKey::from(5), PrimaryKey::from("5"));
    }

    #[test]
    fn test_untagged_serde() {
        let keys: Vec<PrimaryKey> = serde_json::from_value(json!([1, "two", 3])).unwrap();
        assert_eq!(
            keys,
            vec![PrimaryKey::Int(1), PrimaryKey::from("two"), PrimaryKey::Int(3)]
        );
        assert_eq!(serde_json::to_value(&keys).unwrap(), json!([1, "two", 3]));
    }
}
