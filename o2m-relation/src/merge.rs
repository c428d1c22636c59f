//! Combining server state and pending changes into the list of items shown
//! for one page.
//!
//! The virtual list of an O2M field is ordered as follows: items linked on
//! the server first, then items selected for linking, then newly created
//! items. Pages are cut from that list, so a page can span more than one of
//! these sources.

use std::cmp::Ordering;

use o2m_core::{
    change_set::ChangeSet,
    display::{DisplayItem, ItemType},
    key::PrimaryKey,
    query::PreviewQuery,
    relation::RelationO2M,
    Item,
};
use serde_json::Value;

use crate::selection;

/// What the display list is computed from.
pub struct MergeInput<'a> {
    pub relation: &'a RelationO2M,
    pub query: &'a PreviewQuery,
    pub changes: &'a ChangeSet,
    /// The current page of items linked on the server.
    pub fetched_items: &'a [Item],
    /// Server data of the selected items on the current page.
    pub fetched_select_items: &'a [Item],
    pub existing_item_count: u64,
}

/// The slice of `items` that lands on the query's page, when `items` follow
/// `offset` other items in the virtual list.
pub fn get_page<'a, T>(query: &PreviewQuery, offset: u64, items: &'a [T]) -> &'a [T] {
    let Some(limit) = query.limit.per_page() else {
        return items;
    };
    let len = items.len() as i128;
    let clamp = |n: i128| n.clamp(0, len) as usize;
    let (page, limit, offset) = (query.page as i128, limit as i128, offset as i128);
    let start = clamp((page - 1) * limit - offset);
    let end = clamp(page * limit - offset);
    &items[start..end]
}

/// The pending creations, annotated with their position.
pub fn created_items(changes: &ChangeSet) -> Vec<DisplayItem> {
    changes
        .create
        .iter()
        .enumerate()
        .map(|(index, fields)| DisplayItem::annotated(fields.clone(), ItemType::Created, index))
        .collect()
}

/// Number of items in the virtual list.
pub fn total_item_count(existing_item_count: u64, changes: &ChangeSet, selected: usize) -> u64 {
    existing_item_count + changes.create.len() as u64 + selected as u64
}

/// The items to show for the current page.
pub fn display_items(input: &MergeInput) -> Vec<DisplayItem> {
    let pk_field = input.relation.related_primary_key_field.as_str();

    let mut items: Vec<DisplayItem> = input
        .fetched_items
        .iter()
        .map(|fetched| annotate_fetched(fetched, pk_field, input.changes))
        .collect();

    let selected = selection::selected(input.relation, input.changes, input.fetched_items);
    let selected_on_page =
        selection::selected_on_page(input.query, input.existing_item_count, &selected);
    items.extend(
        selected_on_page
            .iter()
            .map(|edits| hydrate_selected(edits, pk_field, input.fetched_select_items)),
    );

    let created = created_items(input.changes);
    let offset = input.existing_item_count + selected.len() as u64;
    items.extend_from_slice(get_page(input.query, offset, &created));

    let total = total_item_count(input.existing_item_count, input.changes, selected.len());
    sort_single_page(&mut items, input.query, input.relation, total);
    items
}

/// Apply pending updates and deletions to an item fetched from the server.
/// A deletion wins over an update, but keeps a reference to the edits.
fn annotate_fetched(fetched: &Item, pk_field: &str, changes: &ChangeSet) -> DisplayItem {
    let mut display = DisplayItem::existing(fetched.clone());
    let Some(key) = PrimaryKey::of_item(fetched, pk_field) else {
        return display;
    };

    let update = changes
        .update
        .iter()
        .position(|edits| PrimaryKey::of_item(edits, pk_field).as_ref() == Some(&key));
    if let Some(index) = update {
        display
            .fields
            .extend(changes.update[index].iter().map(|(k, v)| (k.clone(), v.clone())));
        display.kind = Some(ItemType::Updated);
        display.index = Some(index);
        display.edits = Some(index);
    }

    if let Some(index) = changes.delete.iter().position(|deleted| *deleted == key) {
        display.kind = Some(ItemType::Deleted);
        display.index = Some(index);
    }

    display
}

/// Fill in the server data of a selected item, with its pending edits on top.
fn hydrate_selected(edits: &DisplayItem, pk_field: &str, fetched: &[Item]) -> DisplayItem {
    let Some(key) = edits.primary_key(pk_field) else {
        return edits.clone();
    };
    let Some(fetched) = fetched
        .iter()
        .find(|item| PrimaryKey::of_item(item, pk_field).as_ref() == Some(&key))
    else {
        return edits.clone();
    };

    let mut fields = fetched.clone();
    deep_merge(&mut fields, &edits.fields);
    DisplayItem {
        fields,
        ..edits.clone()
    }
}

/// Merge `source` into `target`. Nested objects are merged member by
/// member and arrays element by element, so `target` keeps the elements
/// past the end of `source`. Everything else in `source` replaces what
/// `target` has.
pub fn deep_merge(target: &mut Item, source: &Item) {
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => deep_merge(target, source),
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => merge_value(existing, value),
                    None => target.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// The field the list is sorted by: the first sort field of the query, or
/// the relation's manual sort field.
fn sort_field<'a>(query: &'a PreviewQuery, relation: &'a RelationO2M) -> Option<&'a str> {
    match &query.sort {
        Some(sort) => sort.first().map(String::as_str),
        None => relation.sort_field.as_deref(),
    }
}

/// Sort the page locally, but only when the whole list fits on it. Otherwise
/// the server's order of the fetched items is kept as is.
fn sort_single_page(
    items: &mut [DisplayItem],
    query: &PreviewQuery,
    relation: &RelationO2M,
    total: u64,
) {
    let Some(field) = sort_field(query, relation) else {
        return;
    };
    if let Some(limit) = query.limit.per_page() {
        if limit > 0 && total > limit {
            return;
        }
    }

    let (field, descending) = match field.strip_prefix('-') {
        Some(field) => (field, true),
        None => (field, false),
    };
    items.sort_by(|a, b| {
        let ordering = compare_values(a.get_path(field), b.get_path(field));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

/// Loose ordering of field values. Numbers compare numerically, strings
/// lexically, `false` before `true`. Anything else, including a missing
/// value or values of different kinds, compares equal, which leaves such
/// items where the stable sort found them.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
