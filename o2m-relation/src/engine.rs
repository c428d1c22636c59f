//! The state behind one O2M field of an open record.
//!
//! [`RelationMultiple`] holds the field's bound value and the server data it
//! refers to, and derives the list of items to display from both. Inputs are
//! set through its setters; each setter records what changed, and
//! [`RelationMultiple::flush`] runs the fetches that depend on the changed
//! inputs, once each. A fetch only stores its result if no fetch of the same
//! kind was triggered after it.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context as _, Result};
use futures_util::future::join_all;
use o2m_core::{
    change_set::{ChangeSet, FieldValue},
    display::{DisplayItem, ItemType},
    key::PrimaryKey,
    query::{filter_and, filter_field, filter_in, PreviewQuery, QueryParams},
    relation::{ContentVersion, ItemId, RelationO2M, RelationState},
    Item,
};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument as _};

use crate::{
    api::{endpoint, response_data},
    control::{
        generation::{Generation, Ticket},
        scheduler::Scheduler,
    },
    fetch_all::fetch_all,
    host::HostContext,
    merge::{self, MergeInput},
    permissions::{relation_permissions_o2m, RelationPermissions},
    selection,
    store::ChangeSetStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Input {
    /// Any part of the preview query.
    Query,
    /// The filter and search of the preview query.
    QueryScope,
    ItemId,
    Relation,
    /// The host replaced pending changes with a key list after saving.
    ValueReset,
    /// The keys of the selected items on the current page.
    SelectedOnPage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Task {
    FetchItems,
    FetchCount,
    FetchSelected,
}

struct ItemsFetch;
struct CountFetch;
struct SelectedFetch;

/// The initial inputs of a [`RelationMultiple`].
#[derive(Debug, Clone, Default)]
pub struct RelationInputs {
    pub value: FieldValue,
    pub query: PreviewQuery,
    pub relation: RelationState,
    pub item_id: ItemId,
    pub version: Option<ContentVersion>,
}

struct State {
    store: ChangeSetStore,
    query: PreviewQuery,
    relation: RelationState,
    item_id: ItemId,
    version: Option<ContentVersion>,

    fetched_items: Vec<Item>,
    existing_item_count: u64,
    fetched_select_items: Vec<Item>,
    /// Fetches in flight.
    loading: usize,

    scheduler: Scheduler<Input, Task>,
    items_generation: Generation<ItemsFetch>,
    count_generation: Generation<CountFetch>,
    selected_generation: Generation<SelectedFetch>,
    /// Last observed keys of the selected items on the current page. `None`
    /// until first observed.
    selected_on_page: Option<Vec<PrimaryKey>>,
}

impl State {
    fn pk_field(&self) -> Option<&str> {
        self.relation
            .o2m()
            .map(|relation| relation.related_primary_key_field.as_str())
    }

    fn selected(&self) -> Vec<DisplayItem> {
        match self.relation.o2m() {
            Some(relation) => {
                selection::selected(relation, &self.store.get(), &self.fetched_items)
            }
            None => Vec::new(),
        }
    }

    /// Store changes made by the engine itself.
    fn set_changes(&mut self, changes: ChangeSet) {
        let is_version = self.version.is_some();
        let fetched_items = &self.fetched_items;
        let pk_field = self
            .relation
            .o2m()
            .map_or("id", |relation| relation.related_primary_key_field.as_str());
        self.store.set(changes, is_version, || {
            fetched_items
                .iter()
                .filter_map(|item| PrimaryKey::of_item(item, pk_field))
                .collect()
        });
        self.observe_selected_on_page();
    }

    /// Schedule a fetch of the selected items if the set of them on the
    /// current page changed.
    fn observe_selected_on_page(&mut self) {
        let keys: Vec<PrimaryKey> = match self.pk_field() {
            Some(pk_field) => {
                let selected = self.selected();
                selection::selected_on_page(&self.query, self.existing_item_count, &selected)
                    .iter()
                    .filter_map(|item| item.primary_key(pk_field))
                    .collect()
            }
            None => Vec::new(),
        };
        if self.selected_on_page.as_ref() != Some(&keys) {
            self.selected_on_page = Some(keys);
            self.scheduler.notify(Input::SelectedOnPage);
        }
    }

    /// Whether `item` stands for a selection rather than an edit. For an
    /// updated item this is decided by its pending update entry.
    fn is_item_selected(&self, relation: &RelationO2M, item: &DisplayItem) -> bool {
        let changes = self.store.get();
        let entry = match (item.kind, item.index) {
            (Some(ItemType::Updated), Some(index)) => changes.update.get(index),
            _ => None,
        };
        let linked = selection::linked_keys(relation, &self.fetched_items);
        selection::is_selection(relation, entry.unwrap_or(&item.fields), &linked)
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().expect("mutex poisoned")
}

/// Counts a fetch as in flight while alive.
struct Loading {
    state: Arc<Mutex<State>>,
}

impl Loading {
    fn start(state: &Arc<Mutex<State>>) -> Self {
        lock(state).loading += 1;
        Loading {
            state: state.clone(),
        }
    }
}

impl Drop for Loading {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.loading -= 1;
        }
    }
}

/// Reconciles the pending changes of an O2M field with the related items on
/// the server.
pub struct RelationMultiple {
    host: HostContext,
    state: Arc<Mutex<State>>,
}

impl RelationMultiple {
    /// Set up the engine. Nothing is fetched until the first
    /// [`flush`](Self::flush).
    pub fn new(host: HostContext, inputs: RelationInputs) -> Self {
        let mut scheduler = Scheduler::new();
        scheduler.declare(
            Task::FetchItems,
            [Input::Query, Input::ItemId, Input::Relation, Input::ValueReset],
        );
        scheduler.declare(
            Task::FetchCount,
            [Input::QueryScope, Input::ItemId, Input::Relation],
        );
        scheduler.declare(Task::FetchSelected, [Input::SelectedOnPage]);
        scheduler.request(Task::FetchItems);
        scheduler.request(Task::FetchCount);

        let mut state = State {
            store: ChangeSetStore::new(inputs.value),
            query: inputs.query,
            relation: inputs.relation,
            item_id: inputs.item_id,
            version: inputs.version,
            fetched_items: Vec::new(),
            existing_item_count: 0,
            fetched_select_items: Vec::new(),
            loading: 0,
            scheduler,
            items_generation: Generation::new(),
            count_generation: Generation::new(),
            selected_generation: Generation::new(),
            selected_on_page: None,
        };
        state.observe_selected_on_page();

        RelationMultiple {
            host,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    // Inputs

    /// Replace the bound value, e.g. after the host saved the record or the
    /// user edited an item elsewhere.
    pub fn set_value(&self, value: FieldValue) {
        let mut state = self.state();
        if *state.store.value() == value {
            return;
        }
        if state.store.replace(value) {
            debug!("pending changes were reset");
            state.scheduler.notify(Input::ValueReset);
        }
        state.observe_selected_on_page();
    }

    pub fn set_query(&self, query: PreviewQuery) {
        let mut state = self.state();
        if state.query == query {
            return;
        }
        if !state.query.same_scope(&query) {
            state.scheduler.notify(Input::QueryScope);
        }
        state.query = query;
        state.scheduler.notify(Input::Query);
        state.observe_selected_on_page();
    }

    pub fn set_relation(&self, relation: RelationState) {
        let mut state = self.state();
        if state.relation == relation {
            return;
        }
        state.relation = relation;
        state.scheduler.notify(Input::Relation);
        state.observe_selected_on_page();
    }

    pub fn set_item_id(&self, item_id: ItemId) {
        let mut state = self.state();
        if state.item_id == item_id {
            return;
        }
        state.item_id = item_id;
        state.scheduler.notify(Input::ItemId);
    }

    pub fn set_version(&self, version: Option<ContentVersion>) {
        self.state().version = version;
    }

    // Derived state

    pub fn value(&self) -> FieldValue {
        self.state().store.value().clone()
    }

    /// The bound value as the host would store it.
    pub fn value_json(&self) -> Value {
        self.state().store.value().to_json()
    }

    pub fn changes(&self) -> ChangeSet {
        self.state().store.get().into_owned()
    }

    pub fn query(&self) -> PreviewQuery {
        self.state().query.clone()
    }

    pub fn loading(&self) -> bool {
        self.state().loading > 0
    }

    pub fn fetched_items(&self) -> Vec<Item> {
        self.state().fetched_items.clone()
    }

    pub fn fetched_select_items(&self) -> Vec<Item> {
        self.state().fetched_select_items.clone()
    }

    /// Number of items linked on the server, as last counted.
    pub fn existing_item_count(&self) -> u64 {
        self.state().existing_item_count
    }

    /// Number of items in the list across all pages.
    pub fn total_item_count(&self) -> u64 {
        let state = self.state();
        merge::total_item_count(
            state.existing_item_count,
            &state.store.get(),
            state.selected().len(),
        )
    }

    /// The primary key field of the related collection, `id` while the
    /// relation is unresolved.
    pub fn target_primary_key_field(&self) -> String {
        self.state().pk_field().unwrap_or("id").to_string()
    }

    pub fn created_items(&self) -> Vec<DisplayItem> {
        merge::created_items(&self.state().store.get())
    }

    /// All items selected for linking, across pages.
    pub fn selected(&self) -> Vec<DisplayItem> {
        self.state().selected()
    }

    /// The items of the current page.
    pub fn display_items(&self) -> Vec<DisplayItem> {
        let state = self.state();
        let Some(relation) = state.relation.o2m() else {
            return Vec::new();
        };
        let changes = state.store.get();
        merge::display_items(&MergeInput {
            relation,
            query: &state.query,
            changes: &changes,
            fetched_items: &state.fetched_items,
            fetched_select_items: &state.fetched_select_items,
            existing_item_count: state.existing_item_count,
        })
    }

    pub fn permissions(&self) -> Option<RelationPermissions> {
        let state = self.state();
        relation_permissions_o2m(self.host.permissions.as_ref(), &state.relation)
    }

    // Operations on display items

    /// Undo or record the removal of `items` from the relation.
    ///
    /// A created item is dropped, as is a selection. A deleted item is
    /// restored. Anything else linked on the server is marked for deletion,
    /// including an item with pending edits; the edits are kept.
    pub fn remove(&self, items: &[DisplayItem]) {
        let mut state = self.state();
        let Some(relation) = state.relation.o2m().cloned() else {
            debug!("ignoring removal while the relation is unresolved");
            return;
        };
        let pk_field = relation.related_primary_key_field.as_str();
        let linked = selection::linked_keys(&relation, &state.fetched_items);
        let mut changes = state.store.get().into_owned();

        for item in items {
            match (item.kind, item.index) {
                (Some(ItemType::Created), Some(index)) => {
                    remove_at(&mut changes.create, index, "create")
                }
                (Some(ItemType::Updated), Some(index)) => {
                    let entry = changes.update.get(index).unwrap_or(&item.fields);
                    let selected = selection::is_selection(&relation, entry, &linked);
                    if selected {
                        remove_at(&mut changes.update, index, "update")
                    } else {
                        mark_deleted(&mut changes, item, pk_field)
                    }
                }
                (Some(ItemType::Deleted), Some(index)) => {
                    remove_at(&mut changes.delete, index, "delete")
                }
                _ => mark_deleted(&mut changes, item, pk_field),
            }
        }

        state.set_changes(changes);
    }

    /// Whether `item` is an unchanged item that only carries its primary key.
    pub fn is_empty(&self, item: &DisplayItem) -> bool {
        if item.kind != Some(ItemType::Updated) && item.edits.is_none() {
            return false;
        }
        let state = self.state();
        let Some(pk_field) = state.pk_field() else {
            return false;
        };
        let mut keys = item.fields.keys().filter(|key| !key.starts_with('$'));
        matches!((keys.next(), keys.next()), (Some(key), None) if key == pk_field)
    }

    /// Whether `item` only exists in the pending changes: a creation, a
    /// selection or a removal.
    pub fn is_local_item(&self, item: &DisplayItem) -> bool {
        match item.kind {
            None => false,
            Some(ItemType::Updated) => self.is_item_selected(item),
            Some(ItemType::Created | ItemType::Deleted) => true,
        }
    }

    pub fn is_item_selected(&self, item: &DisplayItem) -> bool {
        let state = self.state();
        match state.relation.o2m() {
            Some(relation) => state.is_item_selected(relation, item),
            None => false,
        }
    }

    /// The pending change entry behind `item`, annotated like `item`. Empty
    /// for an unmodified item.
    pub fn get_item_edits(&self, item: &DisplayItem) -> DisplayItem {
        let state = self.state();
        let changes = state.store.get();
        let entry = |list: &[Item], index: usize| list.get(index).cloned().unwrap_or_default();
        match (item.kind, item.index) {
            (Some(ItemType::Created), Some(index)) => {
                DisplayItem::annotated(entry(&changes.create, index), ItemType::Created, index)
            }
            (Some(ItemType::Updated), Some(index)) => {
                DisplayItem::annotated(entry(&changes.update, index), ItemType::Updated, index)
            }
            (Some(ItemType::Deleted), Some(index)) => match item.edits {
                Some(edits) => DisplayItem {
                    kind: Some(ItemType::Deleted),
                    index: Some(index),
                    edits: Some(edits),
                    fields: entry(&changes.update, edits),
                },
                None => DisplayItem::default(),
            },
            _ => DisplayItem::default(),
        }
    }

    /// The fields of `item`, without annotations.
    pub fn clean_item(&self, item: &DisplayItem) -> Item {
        clean_item(item)
    }

    // Fetching

    /// Refetch the current page. The count is left alone.
    pub fn refresh(&self) {
        self.state().scheduler.request(Task::FetchItems);
    }

    /// Run the fetches scheduled by input changes until there are none left.
    /// Fetches of the same tick run concurrently.
    pub async fn flush(&self) {
        loop {
            let tasks = self.state().scheduler.take_tick();
            if tasks.is_empty() {
                return;
            }
            debug!(?tasks, "running fetches");
            join_all(tasks.into_iter().map(|task| self.run(task))).await;
        }
    }

    async fn run(&self, task: Task) {
        match task {
            Task::FetchItems => self.fetch_items().await,
            Task::FetchCount => self.fetch_count().await,
            Task::FetchSelected => self.fetch_selected().await,
        }
    }

    async fn fetch_items(&self) {
        let (url, params, ticket) = {
            let mut state = self.state();
            let Some(relation) = state.relation.o2m().cloned() else {
                return;
            };
            let Some(item_id) = state.item_id.existing().cloned() else {
                state.items_generation.supersede();
                state.fetched_items.clear();
                state.observe_selected_on_page();
                return;
            };
            let params = QueryParams {
                fields: Some(selection::preview_fields(&relation, &state.query)),
                filter: Some(related_filter(&relation, &state.query, &item_id)),
                search: state.query.search.clone(),
                sort: state.query.sort.clone(),
                page: Some(state.query.page),
                limit: Some(state.query.limit),
                aggregate: None,
            };
            let ticket: Ticket<ItemsFetch> = state.items_generation.next();
            (endpoint(&relation.related_collection), params, ticket)
        };

        let _loading = Loading::start(&self.state);
        let result = async {
            let data = response_data(self.host.api.get(&url, &params).await?)?;
            serde_json::from_value::<Vec<Item>>(data).context("could not decode related items")
        }
        .instrument(info_span!("Fetching related items", url = url.as_str(), ticket = ticket.num()))
        .await;

        match result {
            Ok(items) => {
                let mut state = self.state();
                if state.items_generation.is_latest(&ticket) {
                    state.fetched_items = items;
                    state.observe_selected_on_page();
                } else {
                    debug!(ticket = ticket.num(), "discarding superseded related items");
                }
            }
            Err(e) => self.host.unexpected_error(&e),
        }
    }

    async fn fetch_count(&self) {
        let (url, params, pk_field, ticket) = {
            let mut state = self.state();
            let Some(relation) = state.relation.o2m().cloned() else {
                return;
            };
            let Some(item_id) = state.item_id.existing().cloned() else {
                state.count_generation.supersede();
                state.existing_item_count = 0;
                state.observe_selected_on_page();
                return;
            };
            let pk_field = relation.related_primary_key_field.clone();
            let params = QueryParams {
                filter: Some(related_filter(&relation, &state.query, &item_id)),
                search: state.query.search.clone(),
                aggregate: Some([("count".to_string(), pk_field.clone())].into()),
                ..Default::default()
            };
            let ticket: Ticket<CountFetch> = state.count_generation.next();
            (endpoint(&relation.related_collection), params, pk_field, ticket)
        };

        let result = async {
            let data = response_data(self.host.api.get(&url, &params).await?)?;
            parse_count(&data, &pk_field)
        }
        .instrument(info_span!("Counting related items", url = url.as_str()))
        .await;

        match result {
            Ok(count) => {
                let mut state = self.state();
                if state.count_generation.is_latest(&ticket) {
                    state.existing_item_count = count;
                    state.observe_selected_on_page();
                } else {
                    debug!(ticket = ticket.num(), "discarding superseded count");
                }
            }
            Err(e) => self.host.unexpected_error(&e),
        }
    }

    async fn fetch_selected(&self) {
        let (url, params, ticket) = {
            let mut state = self.state();
            let keys: Vec<Value> = state
                .selected_on_page
                .iter()
                .flatten()
                .map(PrimaryKey::to_value)
                .collect();
            let relation = match state.relation.o2m().cloned() {
                Some(relation) if !keys.is_empty() => relation,
                _ => {
                    state.selected_generation.supersede();
                    state.fetched_select_items.clear();
                    return;
                }
            };
            let params = QueryParams {
                fields: Some(selection::preview_fields(&relation, &state.query)),
                filter: Some(filter_in(&relation.related_primary_key_field, keys)),
                ..Default::default()
            };
            let ticket: Ticket<SelectedFetch> = state.selected_generation.next();
            (endpoint(&relation.related_collection), params, ticket)
        };

        let _loading = Loading::start(&self.state);
        let result = fetch_all::<Item>(
            self.host.api.as_ref(),
            &self.host.server,
            &url,
            &params,
            None,
        )
        .instrument(info_span!("Fetching selected items", url = url.as_str()))
        .await;

        match result {
            Ok(items) => {
                let mut state = self.state();
                if state.selected_generation.is_latest(&ticket) {
                    state.fetched_select_items = items;
                } else {
                    debug!(ticket = ticket.num(), "discarding superseded selected items");
                }
            }
            Err(e) => self.host.unexpected_error(&e),
        }
    }
}

/// The fields of `item`, without annotations.
pub fn clean_item(item: &DisplayItem) -> Item {
    item.fields
        .iter()
        .filter(|(key, _)| !key.starts_with('$'))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Items linked to `item_id`, narrowed by the query's own filter.
fn related_filter(relation: &RelationO2M, query: &PreviewQuery, item_id: &PrimaryKey) -> Value {
    let mut filters = vec![filter_field(
        &relation.reverse_junction_field,
        item_id.to_value(),
    )];
    filters.extend(query.filter.iter().cloned());
    filter_and(filters)
}

/// Read `data[0].count.<pk_field>`. Servers report counts as numbers or as
/// numeric strings.
fn parse_count(data: &Value, pk_field: &str) -> Result<u64> {
    let count = data
        .get(0)
        .and_then(|row| row.get("count"))
        .and_then(|count| count.get(pk_field));
    match count {
        Some(Value::Number(n)) => n
            .as_u64()
            .with_context(|| format!("count is not a non-negative integer: {}", n)),
        Some(Value::String(s)) => s
            .parse()
            .with_context(|| format!("count is not a number: {:?}", s)),
        _ => bail!("response has no count for {}: {}", pk_field, data),
    }
}

fn remove_at<T>(list: &mut Vec<T>, index: usize, list_name: &str) {
    if index < list.len() {
        list.remove(index);
    } else {
        warn!(index, list = list_name, "ignoring removal of a change that no longer exists");
    }
}

fn mark_deleted(changes: &mut ChangeSet, item: &DisplayItem, pk_field: &str) {
    match item.primary_key(pk_field) {
        Some(key) => changes.delete.push(key),
        None => warn!(pk_field, "ignoring removal of an item without primary key"),
    }
}

impl std::fmt::Debug for RelationMultiple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("RelationMultiple")
            .field("value", state.store.value())
            .field("relation", &state.relation)
            .field("item_id", &state.item_id)
            .field("existing_item_count", &state.existing_item_count)
            .field("loading", &state.loading)
            .finish_non_exhaustive()
    }
}
