//! The value of a relational field, as exchanged with the host's save pipeline.

use anyhow::{bail, Context, Result};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{key::PrimaryKey, Item};

/// Pending edits against the related collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// New related items, not yet saved anywhere.
    #[serde(default)]
    pub create: Vec<Item>,
    /// Patches to existing items. An entry that carries the reverse junction
    /// field links an existing item to the owning record.
    #[serde(default)]
    pub update: Vec<Item>,
    /// Keys of related items to delete or unlink.
    #[serde(default)]
    pub delete: Vec<PrimaryKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// The bound value of an O2M field.
///
/// The host hands us whatever it has stored: nothing at all, the plain list
/// of linked keys (no pending changes), or a [`ChangeSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FieldValue {
    #[default]
    Absent,
    PrimaryKeys(Vec<PrimaryKey>),
    Changes(ChangeSet),
}

impl FieldValue {
    /// Decode a JSON field value. `null` is [`FieldValue::Absent`], an array
    /// is a key list and an object is a change set. Other shapes are rejected.
    pub fn decode(value: &Value) -> Result<FieldValue> {
        match value {
            Value::Null => Ok(FieldValue::Absent),
            Value::Array(elements) => {
                let keys = elements
                    .iter()
                    .enumerate()
                    .map(|(i, v)| match PrimaryKey::from_value(v) {
                        Some(key) => Ok(key),
                        None => bail!("element {} of the key list is not a primary key: {}", i, v),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(FieldValue::PrimaryKeys(keys))
            }
            Value::Object(_) => {
                let changes = ChangeSet::deserialize(value)
                    .context("could not decode relational change set")?;
                Ok(FieldValue::Changes(changes))
            }
            other => bail!("unexpected relational field value: {}", other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Absent => Value::Null,
            FieldValue::PrimaryKeys(keys) => {
                Value::Array(keys.iter().map(PrimaryKey::to_value).collect())
            }
            FieldValue::Changes(changes) => {
                serde_json::to_value(changes).expect("change sets always serialize")
            }
        }
    }

    /// Whether this value holds at least one pending create, update or delete.
    pub fn has_pending_changes(&self) -> bool {
        match self {
            FieldValue::Changes(changes) => !changes.is_empty(),
            _ => false,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Absent => serializer.serialize_none(),
            FieldValue::PrimaryKeys(keys) => keys.serialize(serializer),
            FieldValue::Changes(changes) => changes.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FieldValue::decode(&value).map_err(|e| D::Error::custom(format!("{:#}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_absent() {
        assert_eq!(FieldValue::decode(&json!(null)).unwrap(), FieldValue::Absent);
    }

    #[test]
    fn test_decode_key_list() {
        assert_eq!(
            FieldValue::decode(&json!([1, 2, "x"])).unwrap(),
            FieldValue::PrimaryKeys(vec![1.into(), 2.into(), "x".into()])
        );
    }

    #[test]
    fn test_decode_change_set_with_missing_lists() {
        let value = FieldValue::decode(&json!({"delete": [3]})).unwrap();
        assert_eq!(
            value,
            FieldValue::Changes(ChangeSet {
                delete: vec![3.into()],
                ..Default::default()
            })
        );
        assert!(value.has_pending_changes());
    }

    #[test]
    fn test_decode_rejects_other_shapes() {
        assert!(FieldValue::decode(&json!(true)).is_err());
        assert!(FieldValue::decode(&json!("1,2")).is_err());
        assert!(FieldValue::decode(&json!([{"id": 1}])).is_err());
        assert!(FieldValue::decode(&json!({"create": 5})).is_err());
    }

    #[test]
    fn test_serialize() {
        let changes = ChangeSet {
            create: vec![json!({"name": "A"}).as_object().unwrap().clone()],
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(FieldValue::Changes(changes)).unwrap(),
            json!({"create": [{"name": "A"}], "update": [], "delete": []})
        );
        assert_eq!(serde_json::to_value(FieldValue::Absent).unwrap(), json!(null));
        assert_eq!(
            FieldValue::PrimaryKeys(vec![1.into()]).to_json(),
            json!([1])
        );
    }

    #[test]
    fn test_deserialize_in_struct() {
        #[derive(Deserialize)]
        struct Edits {
            #[serde(default)]
            comments: FieldValue,
        }
        let edits: Edits = serde_json::from_value(json!({})).unwrap();
        assert_eq!(edits.comments, FieldValue::Absent);
        let edits: Edits = serde_json::from_value(json!({"comments": [4]})).unwrap();
        assert_eq!(edits.comments, FieldValue::PrimaryKeys(vec![4.into()]));
    }
}
