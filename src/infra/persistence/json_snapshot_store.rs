use crate::core::persistence::{SnapshotStore, StoreError};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// JSON-file snapshot store. Each key lives in its own file:
/// `<dir>/<key>.json`
pub struct JsonSnapshotStore {
    dir: PathBuf,
    // Serializes writers so two saves of the same key never interleave.
    write_lock: Mutex<()>,
}

impl JsonSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

fn write_replacing(path: &Path, blob: &str) -> Result<(), StoreError> {
    // Write to a sibling file first so a crash never leaves half a snapshot behind
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, blob)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    async fn save(&self, key: &str, blob: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        write_replacing(&self.path_for(key), blob)
    }
}
