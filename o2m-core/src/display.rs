use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{key::PrimaryKey, Item};

/// Where a display item came from, relative to the pending [`ChangeSet`](crate::change_set::ChangeSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Created,
    Updated,
    Deleted,
}

/// An item as shown to the user: the related item's fields, annotated with
/// the change set list it belongs to.
///
/// `index` refers to the list named by `kind` (`create`, `update` or
/// `delete`). `edits` is the position of the update entry that a deleted
/// item shadows. An item without `kind` is an unmodified, already linked item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayItem {
    #[serde(rename = "$type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ItemType>,
    #[serde(rename = "$index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(rename = "$edits", default, skip_serializing_if = "Option::is_none")]
    pub edits: Option<usize>,
    #[serde(flatten)]
    pub fields: Item,
}

impl DisplayItem {
    /// An unmodified item.
    pub fn existing(fields: Item) -> Self {
        DisplayItem {
            fields,
            ..Default::default()
        }
    }

    pub fn annotated(fields: Item, kind: ItemType, index: usize) -> Self {
        DisplayItem {
            kind: Some(kind),
            index: Some(index),
            edits: None,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn primary_key(&self, field: &str) -> Option<PrimaryKey> {
        PrimaryKey::of_item(&self.fields, field)
    }

    /// Look up a possibly nested field by a dotted path, e.g. `author.name`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = self.fields.get(parts.next()?)?;
        parts.try_fold(first, |value, part| value.get(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_serialize_annotations() {
        let display = DisplayItem::annotated(item(json!({"name": "A"})), ItemType::Created, 0);
        assert_eq!(
            serde_json::to_value(&display).unwrap(),
            json!({"name": "A", "$type": "created", "$index": 0})
        );
        let plain = DisplayItem::existing(item(json!({"id": 1})));
        assert_eq!(serde_json::to_value(&plain).unwrap(), json!({"id": 1}));
    }

    #[test]
    fn test_deserialize_annotations() {
        let display: DisplayItem = serde_json::from_value(json!({
            "id": 5, "name": "Y", "$type": "deleted", "$index": 2, "$edits": 0
        }))
        .unwrap();
        assert_eq!(display.kind, Some(ItemType::Deleted));
        assert_eq!(display.index, Some(2));
        assert_eq!(display.edits, Some(0));
        assert_eq!(display.fields, item(json!({"id": 5, "name": "Y"})));
        assert_eq!(display.primary_key("id"), Some(PrimaryKey::Int(5)));
    }

    #[test]
    fn test_get_path() {
        let display = DisplayItem::existing(item(json!({"author": {"name": "Ann"}})));
        assert_eq!(display.get_path("author.name"), Some(&json!("Ann")));
        assert_eq!(display.get_path("author.age"), None);
        assert_eq!(display.get_path("missing"), None);
    }
}
