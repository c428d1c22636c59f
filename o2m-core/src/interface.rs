//! The two interfaces built on the relational core, and the option values
//! their configuration forms produce.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{Limit, PreviewQuery};

/// Registration metadata of an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
    pub types: &'static [&'static str],
    pub local_types: &'static [&'static str],
    pub group: &'static str,
    pub relational: bool,
    pub recommended_displays: &'static [&'static str],
}

pub const O2M_TABLE: InterfaceDefinition = InterfaceDefinition {
    id: "o2m-table",
    name: "O2M Table",
    icon: "box",
    description: "A compact table for O2M items",
    types: &["alias"],
    local_types: &["o2m"],
    group: "relational",
    relational: true,
    recommended_displays: &["related-values"],
};

pub const O2M_CONTENT: InterfaceDefinition = InterfaceDefinition {
    id: "o2m-content",
    name: "O2M Content View",
    icon: "box",
    description: "View more content from o2m items",
    types: &["alias"],
    local_types: &["o2m"],
    group: "relational",
    relational: true,
    recommended_displays: &["related-values"],
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "+")]
    Ascending,
    #[serde(rename = "-")]
    Descending,
}

/// Options of the `o2m-table` interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    /// Table columns.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default = "enabled")]
    pub enable_create: bool,
    #[serde(default = "enabled")]
    pub enable_select: bool,
    /// Restricts which existing items can be selected.
    #[serde(default)]
    pub filter: Option<Value>,
}

fn enabled() -> bool {
    true
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            fields: Vec::new(),
            sort: None,
            sort_direction: SortDirection::default(),
            enable_create: true,
            enable_select: true,
            filter: None,
        }
    }
}

impl TableOptions {
    pub fn preview_query(&self, page: u64, limit: Limit) -> PreviewQuery {
        let mut query = PreviewQuery::new(page, limit).with_fields(self.fields.iter().cloned());
        query.sort = sort_param(self.sort.as_deref(), self.sort_direction);
        query
    }

    /// The filter for the "select existing items" dialog, which only exists
    /// while selecting is enabled.
    pub fn selection_filter(&self) -> Option<&Value> {
        if self.enable_select {
            self.filter.as_ref()
        } else {
            None
        }
    }
}

/// Options of the `o2m-content` interface: a card per related item, each
/// showing a nested table of one of its own O2M fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentOptions {
    /// Display template for the card title.
    #[serde(default)]
    pub title: Option<String>,
    /// Text field shown under the title.
    #[serde(default)]
    pub description: Option<String>,
    /// O2M field of the related collection rendered as the nested table.
    /// Stored in snake case, unlike the other options.
    #[serde(default, rename = "table_field")]
    pub table_field: Option<String>,
    /// Field of the nested table's collection summed up per card.
    #[serde(default)]
    pub aggregation: Option<String>,
    #[serde(default)]
    pub enable_link: bool,
    #[serde(flatten)]
    pub table: TableOptions,
}

impl ContentOptions {
    pub fn preview_query(&self, page: u64, limit: Limit) -> PreviewQuery {
        let mut query = PreviewQuery::new(page, limit);
        query.sort = sort_param(self.table.sort.as_deref(), self.table.sort_direction);
        query
    }

    /// Columns of the nested table. They are only meaningful once the table
    /// field has been chosen.
    pub fn nested_fields(&self) -> &[String] {
        match self.table_field {
            Some(_) => &self.table.fields,
            None => &[],
        }
    }
}

fn sort_param(field: Option<&str>, direction: SortDirection) -> Option<Vec<String>> {
    let field = field.filter(|f| !f.is_empty())?;
    Some(vec![match direction {
        SortDirection::Ascending => field.to_string(),
        SortDirection::Descending => format!("-{}", field),
    }])
}
