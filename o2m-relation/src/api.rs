//! The HTTP collaborator, as far as the relational core is concerned.

use std::{error::Error, fmt::Display};

use anyhow::{bail, Result};
use async_trait::async_trait;
use o2m_core::query::QueryParams;
use serde_json::Value;

/// Read access to the items API of the host.
#[async_trait]
pub trait Api: Send + Sync {
    /// `GET endpoint` with the given query, returning the decoded response
    /// body (`{"data": ...}`).
    ///
    /// Failures that the server reported should be returned as an
    /// [`ApiError`] so that their error code can be shown to the user.
    async fn get(&self, endpoint: &str, params: &QueryParams) -> Result<Value>;
}

/// The `data` member of a response body.
pub fn response_data(body: Value) -> Result<Value> {
    match body {
        Value::Object(mut members) => match members.remove("data") {
            Some(data) => Ok(data),
            None => bail!("response body has no data member"),
        },
        other => bail!("response body is not an object: {}", other),
    }
}

/// The REST endpoint listing the items of `collection`. System collections
/// have their own endpoints.
pub fn endpoint(collection: &str) -> String {
    match collection.strip_prefix("directus_") {
        Some(system) => format!("/{}", system),
        None => format!("/items/{}", collection),
    }
}

/// An error reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// A non-success response, with the body as received.
    Response { status: u16, body: Value },
    /// A single error object, `{"message": ..., "extensions": {"code": ...}}`.
    Api { message: String, code: String },
}

impl ApiError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Response { body, .. } => body
                .pointer("/errors/0/extensions/code")
                .or_else(|| body.pointer("/extensions/code"))
                .and_then(Value::as_str),
            ApiError::Api { code, .. } => Some(code.as_str()),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Response { status, body } => {
                let message = body
                    .pointer("/errors/0/message")
                    .and_then(Value::as_str)
                    .unwrap_or("no error message");
                write!(f, "server responded with status {}: {}", status, message)
            }
            ApiError::Api { message, code } => write!(f, "{} ({})", message, code),
        }
    }
}

impl Error for ApiError {}

/// The most specific error code carried by `error`, or `UNKNOWN`.
pub fn error_code(error: &anyhow::Error) -> String {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ApiError>())
        .and_then(ApiError::code)
        .unwrap_or("UNKNOWN")
        .to_string()
}
