//! Host services for running the relational core outside the web app: a
//! REST client for a running instance, and stand-ins for the services that
//! only make sense with a user interface.

use std::sync::Mutex;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use o2m_core::query::QueryParams;
use o2m_relation::{
    api::{response_data, Api, ApiError},
    notify::{Messages, Notification, NotificationSink},
    permissions::{Action, PermissionOracle},
    server::ServerInfo,
};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use tracing::debug;

/// [`Api`] over HTTP.
pub struct RestApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RestApi {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("invalid instance URL: {}", base_url))?;
        Ok(RestApi {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, endpoint: &str, params: &QueryParams) -> Result<Url> {
        let url = format!("{}{}", self.base_url, endpoint);
        Url::parse_with_params(&url, params.to_query_pairs())
            .with_context(|| format!("invalid request URL: {}", url))
    }
}

/// Turn a non-success response into an [`ApiError`].
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), body).into())
}

fn error_from_body(status: u16, body: String) -> ApiError {
    let body = serde_json::from_str(&body).unwrap_or(Value::String(body));
    ApiError::Response { status, body }
}

#[async_trait]
impl Api for RestApi {
    async fn get(&self, endpoint: &str, params: &QueryParams) -> Result<Value> {
        let url = self.url(endpoint, params)?;
        debug!(%url, "GET");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {} failed", endpoint))?;
        let response = check_response(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("response from {} is not JSON", endpoint))
    }
}

/// Read the server limits that paged fetching depends on.
pub async fn fetch_server_info(api: &dyn Api) -> Result<ServerInfo> {
    let data = response_data(api.get("/server/info", &QueryParams::default()).await?)?;
    serde_json::from_value(data).context("could not decode server info")
}

/// Grants every action; the server still enforces its own permissions.
pub struct AllowAll;

impl PermissionOracle for AllowAll {
    fn has_permission(&self, _collection: &str, _action: Action) -> bool {
        true
    }
}

/// Logs notifications and keeps them for the exit status.
#[derive(Default)]
pub struct ConsoleNotifications {
    errors: Mutex<Vec<Notification>>,
}

impl ConsoleNotifications {
    pub fn errors(&self) -> Vec<Notification> {
        self.errors.lock().expect("mutex poisoned").clone()
    }
}

impl NotificationSink for ConsoleNotifications {
    fn add(&self, notification: Notification) {
        tracing::error!(code = notification.code.as_str(), "{}", notification.error);
        self.errors
            .lock()
            .expect("mutex poisoned")
            .push(notification);
    }
}

/// A message catalog without translations. Titles fall back to their keys.
pub struct Untranslated;

impl Messages for Untranslated {
    fn translate(&self, _key: &str) -> Option<String> {
        None
    }
}
