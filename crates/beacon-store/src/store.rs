//! Sled-backed persistence for plugin records.

use crate::error::StoreError;
use crate::record::{now_unix, PluginInfo};
use crate::Result;
use beacon_model::{EnvironmentNode, Node};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use uuid::Uuid;

/// Tree name for storing plugin registration records.
const PLUGIN_TREE: &str = "plugins";

/// Abort reasons for read-modify-write transactions.
enum Abort {
    NotFound,
    Serde(serde_json::Error),
}

/// Wrapper around a sled database for plugin registration records.
///
/// # Thread Safety
///
/// The underlying sled database is thread-safe; clones share the same
/// database handle. Callers needing a serialized mutate-then-read sequence
/// across multiple records (the registry's diff-then-write step) must bring
/// their own coordination — the store only guarantees per-record atomicity.
#[derive(Clone)]
pub struct PluginStore {
    /// The underlying sled database.
    db: sled::Db,

    /// Tree holding serialized [`PluginInfo`] rows keyed by plugin id.
    plugins: sled::Tree,
}

impl PluginStore {
    /// Opens or creates a store database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the path is invalid, permissions
    /// are insufficient, or the database is corrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let plugins = db.open_tree(PLUGIN_TREE)?;
        Ok(PluginStore { db, plugins })
    }

    /// Creates a temporary in-memory store for testing. Data is lost when
    /// the instance is dropped.
    pub fn temporary() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        let plugins = db.open_tree(PLUGIN_TREE)?;
        Ok(PluginStore { db, plugins })
    }

    /// Inserts a new registration record and assigns its id.
    ///
    /// The caller supplies the initial subtree (typically an empty realm
    /// environment node); the returned record carries the server-generated
    /// uuid under which it was stored.
    pub fn save(
        &self,
        realm: impl Into<String>,
        callback: Option<String>,
        initial_subtree: EnvironmentNode,
    ) -> Result<PluginInfo> {
        let info = PluginInfo {
            id: Uuid::new_v4().to_string(),
            realm: realm.into(),
            callback,
            subtree: initial_subtree,
            registered_at: now_unix(),
        };

        let bytes = serde_json::to_vec(&info)?;
        self.plugins.insert(info.id.as_bytes(), bytes)?;

        Ok(info)
    }

    /// Loads a record by plugin id.
    pub fn get(&self, id: &str) -> Result<Option<PluginInfo>> {
        match self.plugins.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Loads every record whose realm matches.
    ///
    /// Duplicate realms are possible (registration does not lock on realm
    /// name), so this returns a list rather than a single record.
    pub fn get_by_realm(&self, realm: &str) -> Result<Vec<PluginInfo>> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|p| p.realm == realm)
            .collect())
    }

    /// Loads all registration records.
    pub fn get_all(&self) -> Result<Vec<PluginInfo>> {
        let mut records = Vec::new();
        for entry in self.plugins.iter() {
            let (_, bytes) = entry?;
            records.push(serde_json::from_slice(&bytes)?);
        }
        Ok(records)
    }

    /// Replaces a record's stored subtree in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `id` is unknown.
    pub fn update_subtree(&self, id: &str, subtree: EnvironmentNode) -> Result<PluginInfo> {
        self.modify(id, |info| info.subtree = subtree.clone())
    }

    /// Replaces only the children of a record's stored subtree, preserving
    /// the root's own name, type, and labels.
    ///
    /// This is the hot update path: callers pushing fresh children need not
    /// re-supply root metadata they never owned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if `id` is unknown.
    pub fn update_subtree_children(&self, id: &str, children: Vec<Node>) -> Result<PluginInfo> {
        self.modify(id, |info| info.subtree.children = children.clone())
    }

    /// Deletes a record, returning it if it existed.
    pub fn delete(&self, id: &str) -> Result<Option<PluginInfo>> {
        match self.plugins.remove(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns the number of registration records.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }

    /// Read-modify-write of one record inside a sled transaction, so a
    /// crashed or conflicting writer can never leave a partial update.
    fn modify(&self, id: &str, apply: impl Fn(&mut PluginInfo)) -> Result<PluginInfo> {
        let key = id.as_bytes();
        let result = self.plugins.transaction(|tx| {
            let bytes = tx
                .get(key)?
                .ok_or(ConflictableTransactionError::Abort(Abort::NotFound))?;
            let mut info: PluginInfo = serde_json::from_slice(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(Abort::Serde(e)))?;

            apply(&mut info);

            let out = serde_json::to_vec(&info)
                .map_err(|e| ConflictableTransactionError::Abort(Abort::Serde(e)))?;
            tx.insert(key, out)?;
            Ok(info)
        });

        match result {
            Ok(info) => Ok(info),
            Err(TransactionError::Abort(Abort::NotFound)) => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(TransactionError::Abort(Abort::Serde(e))) => Err(StoreError::Serialization(e)),
            Err(TransactionError::Storage(e)) => Err(StoreError::Database(e)),
        }
    }
}

impl std::fmt::Debug for PluginStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginStore")
            .field("plugin_count", &self.len())
            .finish()
    }
}
