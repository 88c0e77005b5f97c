// Persistence port - whole-snapshot writes keyed by logical name.
//
// Stores never see partial updates: each owner serializes its full map and
// hands the blob over. The infra layer provides JSON-file, SQLite and
// in-memory implementations.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(String),
}

/// Logical snapshot names.
pub mod keys {
    pub const CONFIGS: &str = "configs";
    pub const USERS: &str = "users";
    pub const BAD_IDS: &str = "bad_ids";
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the blob saved under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the blob saved under `key`.
    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError>;
}

/// Load and decode a JSON snapshot.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn SnapshotStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.load(key).await? {
        Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
        None => Ok(None),
    }
}

/// Encode and save a JSON snapshot.
pub async fn save_json<T: Serialize + ?Sized>(
    store: &dyn SnapshotStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let blob = serde_json::to_string(value)?;
    store.save(key, &blob).await
}
