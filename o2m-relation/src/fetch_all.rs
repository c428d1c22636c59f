use anyhow::{bail, Context as _, Result};
use o2m_core::query::{Limit, QueryParams};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::{
    api::{response_data, Api},
    server::ServerInfo,
};

/// Fetch every item matching `params`, or the first `max_items` of them.
///
/// Servers without a page size cap are asked for everything at once
/// (`limit=-1`). Otherwise pages of the maximum size are requested one after
/// another, starting at page 1, until a page comes back empty or enough
/// items have been collected. `page` and `limit` of `params` are ignored;
/// everything else is sent with each request.
pub async fn fetch_all<T: DeserializeOwned>(
    api: &dyn Api,
    server: &ServerInfo,
    url: &str,
    params: &QueryParams,
    max_items: Option<usize>,
) -> Result<Vec<T>> {
    let max_items = max_items.unwrap_or(usize::MAX);

    let Some(page_size) = server.max_page_size() else {
        let mut params = params.clone();
        params.page = None;
        params.limit = Some(Limit::All);
        let data = response_data(api.get(url, &params).await?)?;
        let mut items: Vec<T> = decode_page(data, url)?;
        items.truncate(max_items);
        return Ok(items);
    };

    let mut result: Vec<T> = Vec::new();
    let mut page = 1;

    while result.len() < max_items {
        let mut params = params.clone();
        params.page = Some(page);
        params.limit = Some(Limit::PerPage(page_size));

        let data = response_data(api.get(url, &params).await?)?;
        let items: Vec<T> = decode_page(data, url)?;
        debug!(url, page, count = items.len(), "fetched page");
        if items.is_empty() {
            break;
        }
        result.extend(items);
        page += 1;
    }

    result.truncate(max_items);
    Ok(result)
}

fn decode_page<T: DeserializeOwned>(data: Value, url: &str) -> Result<Vec<T>> {
    if !data.is_array() {
        bail!("expected a list of items from {}, got: {}", url, data);
    }
    serde_json::from_value(data).with_context(|| format!("could not decode items from {}", url))
}
