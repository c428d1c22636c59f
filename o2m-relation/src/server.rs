use serde::{Deserialize, Serialize};

/// The parts of the server info the relational core cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub query_limit: Option<QueryLimit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLimit {
    #[serde(default)]
    pub default: Option<i64>,
    /// Largest page the server hands out; `-1` when unlimited.
    #[serde(default)]
    pub max: Option<i64>,
}

impl ServerInfo {
    pub fn with_max_page_size(max: i64) -> Self {
        ServerInfo {
            query_limit: Some(QueryLimit {
                default: None,
                max: Some(max),
            }),
        }
    }

    /// The page size cap imposed by the server, `None` if there is none.
    /// A cap that is not positive is no cap.
    pub fn max_page_size(&self) -> Option<u64> {
        let max = self.query_limit?.max?;
        u64::try_from(max).ok().filter(|&max| max > 0)
    }
}
