//! Error types for the plugin record store.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or access the database.
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    /// Failed to serialize or deserialize a plugin record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced plugin id is not registered.
    #[error("plugin not found: {0}")]
    NotFound(String),
}
