//! Change-set reconciliation behind the O2M interfaces.
//!
//! [`engine::RelationMultiple`] is the entry point. The host provides its
//! services through [`host::HostContext`].

pub mod api;
pub mod control;
pub mod engine;
pub mod fetch_all;
pub mod host;
pub mod merge;
pub mod notify;
pub mod permissions;
pub mod selection;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
