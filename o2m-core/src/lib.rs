//! Data model shared by the O2M interface crates.
//!
//! Everything in here is plain data: it is (de)serializable, has no async
//! code and does not talk to a server. The stateful parts live in
//! `o2m-relation`.

pub mod change_set;
pub mod display;
pub mod interface;
pub mod key;
pub mod query;
pub mod relation;

/// A raw item of a collection, as returned by the items endpoint.
pub type Item = serde_json::Map<String, serde_json::Value>;
