//! Preview queries issued by the interfaces and the request parameters they
//! turn into.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Page size of a query. On the wire, `-1` means "everything".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Limit {
    All,
    PerPage(u64),
}

impl Limit {
    pub fn per_page(&self) -> Option<u64> {
        match self {
            Limit::All => None,
            Limit::PerPage(n) => Some(*n),
        }
    }
}

impl From<i64> for Limit {
    fn from(n: i64) -> Self {
        if n < 0 {
            Limit::All
        } else {
            Limit::PerPage(n as u64)
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::All => -1,
            Limit::PerPage(n) => n as i64,
        }
    }
}

/// The page of related items an interface wants to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewQuery {
    /// 1-based page number.
    pub page: u64,
    pub limit: Limit,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Sort fields; a leading `-` sorts descending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl PreviewQuery {
    pub fn new(page: u64, limit: Limit) -> Self {
        PreviewQuery {
            page,
            limit,
            fields: Vec::new(),
            search: None,
            sort: None,
            filter: None,
        }
    }

    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort<S: Into<String>>(mut self, sort: impl IntoIterator<Item = S>) -> Self {
        self.sort = Some(sort.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether both queries select the same set of items, ignoring page,
    /// limit, sort and fields.
    pub fn same_scope(&self, other: &PreviewQuery) -> bool {
        self.filter == other.filter && self.search == other.search
    }
}

impl Default for PreviewQuery {
    fn default() -> Self {
        PreviewQuery::new(1, Limit::PerPage(15))
    }
}

/// Parameters of a request against an items endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,
    /// Aggregate function name to field, e.g. `count` to `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<BTreeMap<String, String>>,
}

impl QueryParams {
    /// Encode as URL query pairs. Lists are comma separated, filters are JSON.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(fields) = &self.fields {
            pairs.push(("fields".to_string(), fields.join(",")));
        }
        if let Some(filter) = &self.filter {
            pairs.push(("filter".to_string(), filter.to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search".to_string(), search.clone()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.join(",")));
        }
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), i64::from(limit).to_string()));
        }
        if let Some(aggregate) = &self.aggregate {
            for (function, field) in aggregate {
                pairs.push((format!("aggregate[{}]", function), field.clone()));
            }
        }
        pairs
    }
}

/// `{"_and": [...]}`
pub fn filter_and(filters: Vec<Value>) -> Value {
    json!({ "_and": filters })
}

/// `{"<field>": <value>}`
pub fn filter_field(field: &str, value: Value) -> Value {
    let mut filter = Map::new();
    filter.insert(field.to_string(), value);
    Value::Object(filter)
}

/// `{"<field>": {"_in": [...]}}`
pub fn filter_in(field: &str, values: Vec<Value>) -> Value {
    filter_field(field, json!({ "_in": values }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_wire_format() {
        assert_eq!(serde_json::to_value(Limit::All).unwrap(), json!(-1));
        assert_eq!(serde_json::from_value::<Limit>(json!(-1)).unwrap(), Limit::All);
        assert_eq!(
            serde_json::from_value::<Limit>(json!(25)).unwrap(),
            Limit::PerPage(25)
        );
    }

    #[test]
    fn test_preview_query_from_json() {
        let query: PreviewQuery = serde_json::from_value(json!({
            "page": 2, "limit": 10, "fields": ["id", "name"], "sort": ["-name"]
        }))
        .unwrap();
        assert_eq!(
            query,
            PreviewQuery::new(2, Limit::PerPage(10))
                .with_fields(["id", "name"])
                .with_sort(["-name"])
        );
    }

    #[test]
    fn test_same_scope_ignores_paging() {
        let a = PreviewQuery::new(1, Limit::PerPage(10)).with_search("x");
        let mut b = a.clone();
        b.page = 3;
        b.limit = Limit::All;
        b.sort = Some(vec!["name".to_string()]);
        assert!(a.same_scope(&b));
        b.filter = Some(json!({"status": {"_eq": "draft"}}));
        assert!(!a.same_scope(&b));
    }

    #[test]
    fn test_query_pairs() {
        let params = QueryParams {
            fields: Some(vec!["id".to_string(), "name".to_string()]),
            filter: Some(filter_in("id", vec![json!(1), json!(2)])),
            page: Some(3),
            limit: Some(Limit::All),
            aggregate: Some(BTreeMap::from([("count".to_string(), "id".to_string())])),
            ..Default::default()
        };
        assert_eq!(
            params.to_query_pairs(),
            vec![
                ("fields".to_string(), "id,name".to_string()),
                ("filter".to_string(), r#"{"id":{"_in":[1,2]}}"#.to_string()),
                ("page".to_string(), "3".to_string()),
                ("limit".to_string(), "-1".to_string()),
                ("aggregate[count]".to_string(), "id".to_string()),
            ]
        );
    }
}
