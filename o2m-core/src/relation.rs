//! Relation metadata and the identity of the record that owns the relation.

use std::{convert::Infallible, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::key::PrimaryKey;

/// What happens to a related item when it is removed from the relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeselectAction {
    /// The related item is deleted.
    Delete,
    /// The reverse junction field of the related item is set to `null`.
    #[default]
    Nullify,
}

/// A one-to-many relation, seen from the "one" side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationO2M {
    pub related_collection: String,
    pub related_primary_key_field: String,
    /// Field on the related collection that points back to the owning record.
    pub reverse_junction_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_field: Option<String>,
    #[serde(default)]
    pub one_deselect_action: DeselectAction,
}

impl RelationO2M {
    pub fn new(
        related_collection: impl Into<String>,
        related_primary_key_field: impl Into<String>,
        reverse_junction_field: impl Into<String>,
    ) -> Self {
        RelationO2M {
            related_collection: related_collection.into(),
            related_primary_key_field: related_primary_key_field.into(),
            reverse_junction_field: reverse_junction_field.into(),
            sort_field: None,
            one_deselect_action: DeselectAction::default(),
        }
    }

    pub fn with_sort_field(mut self, sort_field: impl Into<String>) -> Self {
        self.sort_field = Some(sort_field.into());
        self
    }

    pub fn with_deselect_action(mut self, action: DeselectAction) -> Self {
        self.one_deselect_action = action;
        self
    }
}

/// The relation of a field, which may not be known yet while the host is
/// still loading its relation schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelationState {
    #[default]
    Unresolved,
    O2M(RelationO2M),
}

impl RelationState {
    pub fn o2m(&self) -> Option<&RelationO2M> {
        match self {
            RelationState::Unresolved => None,
            RelationState::O2M(relation) => Some(relation),
        }
    }
}

impl From<RelationO2M> for RelationState {
    fn from(relation: RelationO2M) -> Self {
        RelationState::O2M(relation)
    }
}

impl From<Option<RelationO2M>> for RelationState {
    fn from(relation: Option<RelationO2M>) -> Self {
        relation.map_or(RelationState::Unresolved, RelationState::O2M)
    }
}

/// The primary key of the record being edited. Records that have not been
/// saved yet are addressed as `+` by the admin app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ItemId {
    #[default]
    New,
    Existing(PrimaryKey),
}

impl ItemId {
    pub fn existing(&self) -> Option<&PrimaryKey> {
        match self {
            ItemId::New => None,
            ItemId::Existing(key) => Some(key),
        }
    }
}

impl FromStr for ItemId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "+" {
            return Ok(ItemId::New);
        }
        Ok(match s.parse::<i64>() {
            Ok(i) => ItemId::Existing(PrimaryKey::Int(i)),
            Err(_) => ItemId::Existing(PrimaryKey::Str(s.to_string())),
        })
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::New => write!(f, "+"),
            ItemId::Existing(key) => write!(f, "{}", key),
        }
    }
}

impl From<PrimaryKey> for ItemId {
    fn from(key: PrimaryKey) -> Self {
        ItemId::Existing(key)
    }
}

/// A content version of the owning record (a draft kept next to the main
/// record). Only its presence matters to the relational interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentVersion {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_id_from_str() {
        assert_eq!("+".parse::<ItemId>().unwrap(), ItemId::New);
        assert_eq!("".parse::<ItemId>().unwrap(), ItemId::New);
        assert_eq!(
            "42".parse::<ItemId>().unwrap(),
            ItemId::Existing(PrimaryKey::Int(42))
        );
        assert_eq!(
            "a1b2".parse::<ItemId>().unwrap(),
            ItemId::Existing(PrimaryKey::from("a1b2"))
        );
    }

    #[test]
    fn test_relation_from_json() {
        let relation: RelationO2M = serde_json::from_value(json!({
            "relatedCollection": "comments",
            "relatedPrimaryKeyField": "id",
            "reverseJunctionField": "article",
            "oneDeselectAction": "delete"
        }))
        .unwrap();
        assert_eq!(
            relation,
            RelationO2M::new("comments", "id", "article")
                .with_deselect_action(DeselectAction::Delete)
        );
    }

    #[test]
    fn test_relation_state_from_option() {
        assert_eq!(RelationState::from(None), RelationState::Unresolved);
        let relation = RelationO2M::new("comments", "id", "article");
        assert_eq!(
            RelationState::from(Some(relation.clone())).o2m(),
            Some(&relation)
        );
    }
}
