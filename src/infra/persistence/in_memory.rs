// In-memory SnapshotStore for tests.

use crate::core::persistence::{SnapshotStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemorySnapshotStore {
    blobs: DashMap<String, String>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peek at a saved blob without going through the async trait.
    pub fn get(&self, key: &str) -> Option<String> {
        self.blobs.get(key).map(|blob| blob.clone())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }
}
