use std::sync::Arc;

use crate::{
    api::Api,
    notify::{self, Messages, NotificationSink},
    permissions::PermissionOracle,
    server::ServerInfo,
};

/// The services of the host application that the relational core uses.
#[derive(Clone)]
pub struct HostContext {
    pub api: Arc<dyn Api>,
    pub server: ServerInfo,
    pub permissions: Arc<dyn PermissionOracle>,
    pub notifications: Arc<dyn NotificationSink>,
    pub messages: Arc<dyn Messages>,
}

impl HostContext {
    pub fn unexpected_error(&self, error: &anyhow::Error) {
        notify::unexpected_error(error, self.notifications.as_ref(), self.messages.as_ref());
    }
}
