// Per-group configuration with a time-based single-writer lock.
//
// A write window opens when `try_acquire_lock` succeeds and lasts `LOCK_TTL`.
// Patches are only accepted inside an open window. Every check-and-set runs inside
// the group's map entry, so two administrators racing for the same group cannot
// both win.

use super::group_config_models::{ConfigOutcome, ConfigPatch, ConfigRejection, GroupConfig};
use crate::core::persistence::{keys, load_json, save_json, SnapshotStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// How long a write window stays open.
pub const LOCK_TTL_SECS: i64 = 310;

fn lock_ttl() -> Duration {
    Duration::seconds(LOCK_TTL_SECS)
}

/// Lock is held iff it was taken within the last `LOCK_TTL`.
fn lock_held(config: &GroupConfig, now: DateTime<Utc>) -> bool {
    config
        .lock_until
        .is_some_and(|locked_at| now - locked_at <= lock_ttl())
}

pub struct GroupConfigStore {
    configs: DashMap<u64, GroupConfig>,
    defaults: GroupConfig,
    /// Serializes snapshot building and saving.
    persist_lock: Mutex<()>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl GroupConfigStore {
    pub fn new(defaults: GroupConfig, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            configs: DashMap::new(),
            defaults,
            persist_lock: Mutex::new(()),
            snapshots,
        }
    }

    /// Build a store from the last persisted snapshot.
    pub async fn load(
        defaults: GroupConfig,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self, StoreError> {
        let saved: HashMap<u64, GroupConfig> = load_json(snapshots.as_ref(), keys::CONFIGS)
            .await?
            .unwrap_or_default();

        let store = Self::new(defaults, snapshots);
        for (group_id, config) in saved {
            store.configs.insert(group_id, config);
        }
        tracing::info!(groups = store.configs.len(), "Loaded group configs");
        Ok(store)
    }

    /// The agent-wide default config.
    pub fn defaults(&self) -> &GroupConfig {
        &self.defaults
    }

    /// Copy of the group's config, or the default if the group was never configured.
    pub fn get(&self, group_id: u64) -> GroupConfig {
        self.configs
            .get(&group_id)
            .map(|c| c.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// Open a write window. Succeeds iff no window was opened in the last `LOCK_TTL`.
    pub fn try_acquire_lock(&self, group_id: u64, now: DateTime<Utc>) -> bool {
        let mut config = self
            .configs
            .entry(group_id)
            .or_insert_with(|| self.defaults.clone());

        if lock_held(&config, now) {
            tracing::debug!(group_id, "Config lock busy");
            return false;
        }

        config.lock_until = Some(now);
        true
    }

    /// Close a window opened at `acquired_at`. A newer window is left alone.
    pub fn release_lock(&self, group_id: u64, acquired_at: DateTime<Utc>) -> bool {
        match self.configs.get_mut(&group_id) {
            Some(mut config) if config.lock_until == Some(acquired_at) => {
                config.lock_until = None;
                true
            }
            _ => false,
        }
    }

    /// Apply `patch` inside an open write window and persist the result.
    ///
    /// A rejected patch leaves the stored config untouched.
    pub async fn apply_update(
        &self,
        group_id: u64,
        patch: &ConfigPatch,
        now: DateTime<Utc>,
    ) -> Result<ConfigOutcome, ConfigRejection> {
        let outcome = {
            let mut config = match self.configs.get_mut(&group_id) {
                Some(config) => config,
                None => return Err(ConfigRejection::LockNotHeld),
            };
            if !lock_held(&config, now) {
                return Err(ConfigRejection::LockNotHeld);
            }

            let mut updated = config.clone();
            updated.apply(patch, &self.defaults);
            if updated.settings_eq(&config) {
                ConfigOutcome::Unchanged
            } else {
                *config = updated;
                ConfigOutcome::Updated
            }
        };

        if outcome.applied() {
            tracing::info!(group_id, ?patch, "Group config updated");
            self.persist_logged().await;
        }
        Ok(outcome)
    }

    /// Install a config pushed back by the configuration agent.
    ///
    /// The open window (if any) is kept so it expires on its own schedule.
    pub async fn commit_session(&self, group_id: u64, mut config: GroupConfig) {
        {
            let mut current = self
                .configs
                .entry(group_id)
                .or_insert_with(|| self.defaults.clone());
            config.lock_until = current.lock_until;
            *current = config;
        }
        tracing::info!(group_id, "Group config committed by session");
        self.persist_logged().await;
    }

    /// Write every group's config out. A later call never saves before an earlier one.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot: HashMap<u64, GroupConfig> = self
            .configs
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        save_json(self.snapshots.as_ref(), keys::CONFIGS, &snapshot).await
    }

    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            tracing::error!(error = %e, "Failed to persist group configs");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
