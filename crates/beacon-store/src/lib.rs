//! # Beacon Plugin Record Store
//!
//! Durable storage of one record per registered discovery plugin: realm
//! name, optional callback address, and the plugin's last-submitted subtree,
//! keyed by a server-issued identifier.
//!
//! This crate is pure CRUD plus serialization of the tree model. No business
//! logic (diffing, identity resolution, event publication) lives here; the
//! registry layers that on top.
//!
//! ## Storage Structure
//!
//! One sled tree (namespace):
//!
//! | Tree | Key | Value | Purpose |
//! |------|-----|-------|---------|
//! | `plugins` | plugin id (uuid) | serialized [`PluginInfo`] | Registration records |
//!
//! Every operation is transactional: a concurrent reader sees either the
//! pre- or post-state of a record, never a partial write. Whole-record JSON
//! values make the single-key swap the unit of atomicity; read-modify-write
//! operations go through a sled transaction.

mod error;
mod record;
mod store;

pub use error::StoreError;
pub use record::PluginInfo;
pub use store::PluginStore;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
