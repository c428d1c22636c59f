//! Reporting failures that the user cannot do anything about, other than
//! read the message.

use serde::Serialize;

use crate::api::error_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub code: String,
    /// Whether the notification blocks the UI until dismissed.
    pub dialog: bool,
    /// The underlying error, formatted.
    pub error: String,
}

/// The host's notification store.
pub trait NotificationSink: Send + Sync {
    fn add(&self, notification: Notification);
}

/// The host's message catalog.
pub trait Messages: Send + Sync {
    fn translate(&self, key: &str) -> Option<String>;
}

/// Log `error` and show it in an error dialog titled after its error code.
pub fn unexpected_error(
    error: &anyhow::Error,
    notifications: &dyn NotificationSink,
    messages: &dyn Messages,
) {
    let code = error_code(error);
    tracing::warn!(code = code.as_str(), "unexpected error: {:#}", error);

    let key = format!("errors.{}", code);
    let title = messages
        .translate(&key)
        .or_else(|| messages.translate("errors.UNKNOWN"))
        .unwrap_or(key);

    notifications.add(Notification {
        title,
        kind: NotificationType::Error,
        code,
        dialog: true,
        error: format!("{:#}", error),
    });
}
