//! In-memory stand-ins for the host services.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::{Arc, Mutex},
};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use o2m_core::{
    query::{Limit, QueryParams},
    Item,
};
use serde_json::{json, Map, Value};
use tokio::sync::Notify;

use crate::{
    api::{Api, ApiError},
    host::HostContext,
    notify::{Messages, Notification, NotificationSink},
    permissions::{Action, PermissionOracle},
    server::ServerInfo,
};

pub fn item(value: Value) -> Item {
    match value {
        Value::Object(fields) => fields,
        other => panic!("not an object: {}", other),
    }
}

/// An items API over in-memory collections.
///
/// Understands the subset of the filter language the relational core sends:
/// `_and`, `_or`, and per-field `_eq`, `_neq`, `_in` or plain equality.
/// `search` matches string fields by substring.
#[derive(Default)]
pub struct FakeServer {
    collections: Mutex<BTreeMap<String, Vec<Item>>>,
    requests: Mutex<Vec<(String, QueryParams)>>,
    failure: Mutex<Option<ApiError>>,
    gates: Mutex<VecDeque<Arc<Notify>>>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(self, name: &str, items: Vec<Item>) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_string(), items);
        self
    }

    pub fn requests(&self) -> Vec<(String, QueryParams)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Answer every following request with `error`.
    pub fn fail_with(&self, error: ApiError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Hold the response to the next request until the returned gate is
    /// notified. The response is computed when the request arrives.
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().push_back(gate.clone());
        gate
    }

    fn respond(&self, endpoint: &str, params: &QueryParams) -> Result<Value> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error.into());
        }
        let collection = endpoint
            .strip_prefix("/items/")
            .with_context(|| format!("unknown endpoint {}", endpoint))?;
        let items = self
            .collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default();

        let matching: Vec<Item> = items
            .into_iter()
            .filter(|item| params.filter.as_ref().map_or(true, |f| matches(item, f)))
            .filter(|item| params.search.as_deref().map_or(true, |s| contains(item, s)))
            .collect();

        if let Some(aggregate) = &params.aggregate {
            let mut result = Map::new();
            for (function, field) in aggregate {
                assert_eq!(function, "count", "only count is supported");
                let mut count = Map::new();
                count.insert(field.clone(), Value::String(matching.len().to_string()));
                result.insert("count".to_string(), Value::Object(count));
            }
            return Ok(json!({ "data": [result] }));
        }

        let page = match params.limit {
            Some(Limit::All) => matching,
            limit => {
                let limit = limit.and_then(|l| l.per_page()).unwrap_or(100) as usize;
                let page = params.page.unwrap_or(1).max(1) as usize;
                matching
                    .into_iter()
                    .skip((page - 1) * limit)
                    .take(limit)
                    .collect()
            }
        };
        let page: Vec<Item> = match &params.fields {
            Some(fields) => page.into_iter().map(|item| select(item, fields)).collect(),
            None => page,
        };
        Ok(json!({ "data": page }))
    }
}

#[async_trait]
impl Api for FakeServer {
    async fn get(&self, endpoint: &str, params: &QueryParams) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), params.clone()));
        let response = self.respond(endpoint, params);
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        response
    }
}

fn matches(item: &Item, filter: &Value) -> bool {
    let Some(filter) = filter.as_object() else {
        return true;
    };
    filter.iter().all(|(key, condition)| match key.as_str() {
        "_and" => condition
            .as_array()
            .map_or(true, |all| all.iter().all(|f| matches(item, f))),
        "_or" => condition
            .as_array()
            .map_or(true, |any| any.iter().any(|f| matches(item, f))),
        field => field_matches(item.get(field).unwrap_or(&Value::Null), condition),
    })
}

fn field_matches(value: &Value, condition: &Value) -> bool {
    let Some(operators) = condition.as_object() else {
        return value == condition;
    };
    operators.iter().all(|(operator, operand)| match operator.as_str() {
        "_eq" => value == operand,
        "_neq" => value != operand,
        "_in" => operand
            .as_array()
            .is_some_and(|candidates| candidates.contains(value)),
        other => panic!("unsupported filter operator {}", other),
    })
}

fn contains(item: &Item, search: &str) -> bool {
    item.values()
        .any(|value| value.as_str().is_some_and(|s| s.contains(search)))
}

fn select(item: Item, fields: &[String]) -> Item {
    if fields.iter().any(|f| f == "*") {
        return item;
    }
    item.into_iter()
        .filter(|(key, _)| fields.iter().any(|f| f == key))
        .collect()
}

pub struct FakePermissions {
    allowed: Option<BTreeSet<(String, Action)>>,
}

impl FakePermissions {
    pub fn new<'a>(allowed: impl IntoIterator<Item = (&'a str, Action)>) -> Self {
        FakePermissions {
            allowed: Some(
                allowed
                    .into_iter()
                    .map(|(collection, action)| (collection.to_string(), action))
                    .collect(),
            ),
        }
    }

    pub fn allow_all() -> Self {
        FakePermissions { allowed: None }
    }
}

impl PermissionOracle for FakePermissions {
    fn has_permission(&self, collection: &str, action: Action) -> bool {
        match &self.allowed {
            None => true,
            Some(allowed) => allowed.contains(&(collection.to_string(), action)),
        }
    }
}

#[derive(Default)]
pub struct FakeNotifications {
    added: Mutex<Vec<Notification>>,
}

impl FakeNotifications {
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.added.lock().unwrap())
    }
}

impl NotificationSink for FakeNotifications {
    fn add(&self, notification: Notification) {
        self.added.lock().unwrap().push(notification);
    }
}

#[derive(Default)]
pub struct FakeMessages {
    messages: BTreeMap<String, String>,
}

impl FakeMessages {
    pub fn new<'a>(messages: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        FakeMessages {
            messages: messages
                .into_iter()
                .map(|(key, text)| (key.to_string(), text.to_string()))
                .collect(),
        }
    }
}

impl Messages for FakeMessages {
    fn translate(&self, key: &str) -> Option<String> {
        self.messages.get(key).cloned()
    }
}

/// A host that talks to `server`, allows everything and collects its
/// notifications in the returned sink.
pub fn host(server: Arc<FakeServer>) -> (HostContext, Arc<FakeNotifications>) {
    let notifications = Arc::new(FakeNotifications::default());
    let host = HostContext {
        api: server,
        server: ServerInfo::default(),
        permissions: Arc::new(FakePermissions::allow_all()),
        notifications: notifications.clone(),
        messages: Arc::new(FakeMessages::new([("errors.UNKNOWN", "Unexpected Error")])),
    };
    (host, notifications)
}
