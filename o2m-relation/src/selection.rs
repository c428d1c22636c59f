//! Items that already exist elsewhere and are being linked to the record.
//!
//! In an O2M relation, linking an existing item means setting its reverse
//! junction field to the record. Such a link is stored as an update entry
//! carrying that field, which sets it apart from an edit of an item that is
//! linked already.

use o2m_core::{
    change_set::ChangeSet,
    display::{DisplayItem, ItemType},
    key::PrimaryKey,
    query::PreviewQuery,
    relation::RelationO2M,
    Item,
};

use crate::merge::get_page;

/// Whether `fields` link the item to a record, i.e. carry a non-null reverse
/// junction field.
pub fn is_item_selected(relation: &RelationO2M, fields: &Item) -> bool {
    fields
        .get(&relation.reverse_junction_field)
        .is_some_and(|value| !value.is_null())
}

/// Whether `fields` select an item for linking. An entry for one of the
/// `linked` items, which the server lists as linked already, is an edit.
pub fn is_selection(relation: &RelationO2M, fields: &Item, linked: &[PrimaryKey]) -> bool {
    is_item_selected(relation, fields)
        && !PrimaryKey::of_item(fields, &relation.related_primary_key_field)
            .is_some_and(|key| linked.contains(&key))
}

/// The primary keys of `items`.
pub fn linked_keys(relation: &RelationO2M, items: &[Item]) -> Vec<PrimaryKey> {
    items
        .iter()
        .filter_map(|item| PrimaryKey::of_item(item, &relation.related_primary_key_field))
        .collect()
}

/// The update entries that link an item, annotated with their position in
/// the update list. `linked` are the items fetched as linked on the server.
pub fn selected(relation: &RelationO2M, changes: &ChangeSet, linked: &[Item]) -> Vec<DisplayItem> {
    let linked = linked_keys(relation, linked);
    changes
        .update
        .iter()
        .enumerate()
        .filter(|(_, edits)| is_selection(relation, edits, &linked))
        .map(|(index, edits)| DisplayItem::annotated(edits.clone(), ItemType::Updated, index))
        .collect()
}

/// The part of `selected` that falls on the current page. Selected items are
/// listed after all items linked on the server.
pub fn selected_on_page(
    query: &PreviewQuery,
    existing_item_count: u64,
    selected: &[DisplayItem],
) -> Vec<DisplayItem> {
    get_page(query, existing_item_count, selected).to_vec()
}

/// The fields to request for related items: those of the query, plus the
/// ones the engine relies on.
pub fn preview_fields(relation: &RelationO2M, query: &PreviewQuery) -> Vec<String> {
    let mut fields: Vec<String> = Vec::with_capacity(query.fields.len() + 2);
    let required = [
        Some(&relation.related_primary_key_field),
        relation.sort_field.as_ref(),
    ];
    for field in query.fields.iter().chain(required.into_iter().flatten()) {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    fields
}
