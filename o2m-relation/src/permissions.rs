//! What the current user may do with a related collection.

use o2m_core::relation::{DeselectAction, RelationState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

/// The host's permission store.
pub trait PermissionOracle: Send + Sync {
    fn has_permission(&self, collection: &str, action: Action) -> bool;
}

/// Permissions on collection level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPermissions {
    pub read_allowed: bool,
    pub create_allowed: bool,
    pub update_allowed: bool,
    pub delete_allowed: bool,
}

pub fn collection_permissions(
    oracle: &dyn PermissionOracle,
    collection: Option<&str>,
) -> Option<CollectionPermissions> {
    let collection = collection?;
    Some(CollectionPermissions {
        read_allowed: oracle.has_permission(collection, Action::Read),
        create_allowed: oracle.has_permission(collection, Action::Create),
        update_allowed: oracle.has_permission(collection, Action::Update),
        delete_allowed: oracle.has_permission(collection, Action::Delete),
    })
}

/// What may be done to the items of an O2M field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationPermissions {
    pub create_allowed: bool,
    pub update_allowed: bool,
    /// Whether items may be removed from the relation. Unless removing
    /// deletes the item, it only clears the item's reverse junction field,
    /// which takes update rights.
    pub delete_allowed: bool,
}

pub fn relation_permissions_o2m(
    oracle: &dyn PermissionOracle,
    relation: &RelationState,
) -> Option<RelationPermissions> {
    let relation = relation.o2m()?;
    let related = collection_permissions(oracle, Some(&relation.related_collection))?;
    let delete_allowed = match relation.one_deselect_action {
        DeselectAction::Delete => related.delete_allowed,
        DeselectAction::Nullify => related.update_allowed,
    };
    Some(RelationPermissions {
        create_allowed: related.create_allowed,
        update_allowed: related.update_allowed,
        delete_allowed,
    })
}
