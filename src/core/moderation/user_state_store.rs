// Per-user moderation state.
//
// The store is the only owner of user records. Every mutation of one user runs
// inside that user's map entry, so concurrent detections of the same user are
// serialized and never lose updates. Callers only get copies (`UserSnapshot`).
//
// A read-decide-write sequence that spans awaits holds the user's async lock
// (`lock_user`) so two messages from one user cannot both see "first offense".

use super::moderation_models::{UserSnapshot, WatchType};
use crate::core::persistence::{keys, load_json, save_json, SnapshotStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Mutable record kept for each user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserState {
    /// Group id -> last detection time.
    pub detected: HashMap<u64, DateTime<Utc>>,
    /// Watch type -> expiry.
    pub watch_until: HashMap<WatchType, DateTime<Utc>>,
    pub score: i64,
}

/// Timing and scoring knobs.
#[derive(Debug, Clone)]
pub struct UserStateSettings {
    /// How long a detection keeps the user "detected" in a group.
    pub detection_ttl: Duration,
    /// How long a watch-list entry lives.
    pub watch_ttl: Duration,
    /// Score added on a user's first detection in a group.
    pub score_per_detection: i64,
}

impl Default for UserStateSettings {
    fn default() -> Self {
        Self {
            detection_ttl: Duration::hours(1),
            watch_ttl: Duration::days(14),
            score_per_detection: 1,
        }
    }
}

/// Result of stamping a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOutcome {
    /// The user had been detected in this group before.
    pub previously_detected: bool,
    /// Score after the update.
    pub score: i64,
    /// Whether this call raised the score.
    pub score_raised: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersSnapshot {
    users: HashMap<u64, UserState>,
    recorded: HashMap<u64, BTreeSet<u64>>,
}

pub struct UserStateStore {
    users: DashMap<u64, UserState>,
    bad_users: DashSet<u64>,
    /// Group id -> users recorded in that group's ad-hoc set.
    recorded: DashMap<u64, HashSet<u64>>,
    /// Per-user decision locks.
    decision_locks: DashMap<u64, Arc<Mutex<()>>>,
    /// Serializes snapshot building and saving.
    persist_lock: Mutex<()>,
    settings: UserStateSettings,
    snapshots: Arc<dyn SnapshotStore>,
}

impl UserStateStore {
    pub fn new(settings: UserStateSettings, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            users: DashMap::new(),
            bad_users: DashSet::new(),
            recorded: DashMap::new(),
            decision_locks: DashMap::new(),
            persist_lock: Mutex::new(()),
            settings,
            snapshots,
        }
    }

    /// Build a store from the last persisted snapshots.
    pub async fn load(
        settings: UserStateSettings,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self, StoreError> {
        let users: UsersSnapshot = load_json(snapshots.as_ref(), keys::USERS)
            .await?
            .unwrap_or_default();
        let bad: BTreeSet<u64> = load_json(snapshots.as_ref(), keys::BAD_IDS)
            .await?
            .unwrap_or_default();

        let store = Self::new(settings, snapshots);
        for (user_id, state) in users.users {
            store.users.insert(user_id, state);
        }
        for (group_id, members) in users.recorded {
            store.recorded.insert(group_id, members.into_iter().collect());
        }
        for user_id in bad {
            store.bad_users.insert(user_id);
        }

        tracing::info!(
            users = store.users.len(),
            bad_users = store.bad_users.len(),
            "Loaded user state"
        );
        Ok(store)
    }

    /// Take the user's decision lock. Held from reading a snapshot until the
    /// resulting mutations are applied.
    pub async fn lock_user(&self, user_id: u64) -> OwnedMutexGuard<()> {
        let lock = self.decision_locks.entry(user_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Write the full state out. Overlapping calls save one after the other, each
    /// with a snapshot taken after the previous save finished.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.persist_lock.lock().await;
        let users = UsersSnapshot {
            users: self
                .users
                .iter()
                .map(|entry| (*entry.key(), entry.value().clone()))
                .collect(),
            recorded: self
                .recorded
                .iter()
                .map(|entry| (*entry.key(), entry.value().iter().copied().collect()))
                .collect(),
        };
        let bad: BTreeSet<u64> = self.bad_users.iter().map(|id| *id).collect();

        save_json(self.snapshots.as_ref(), keys::USERS, &users).await?;
        save_json(self.snapshots.as_ref(), keys::BAD_IDS, &bad).await
    }

    /// Copy of what the engine needs about `user_id` in `group_id`.
    pub fn snapshot(&self, group_id: u64, user_id: u64, now: DateTime<Utc>) -> UserSnapshot {
        let recorded_in_group = self.is_recorded(group_id, user_id);
        match self.users.get(&user_id) {
            Some(state) => UserSnapshot {
                detected_in_group: state
                    .detected
                    .get(&group_id)
                    .is_some_and(|at| now - *at < self.settings.detection_ttl),
                recorded_in_group,
                watch_ban: watch_active(&state, WatchType::Ban, now),
                watch_delete: watch_active(&state, WatchType::Delete, now),
                score: state.score,
            },
            None => UserSnapshot {
                recorded_in_group,
                ..Default::default()
            },
        }
    }

    pub fn is_bad_user(&self, user_id: u64) -> bool {
        self.bad_users.contains(&user_id)
    }

    /// Returns `true` if the user was not known as bad before.
    pub fn add_bad_user(&self, user_id: u64) -> bool {
        self.bad_users.insert(user_id)
    }

    /// Watch the user for `watch_ttl` from `now`. Returns the expiry.
    pub fn add_watch(&self, user_id: u64, watch_type: WatchType, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = now + self.settings.watch_ttl;
        self.set_watch(user_id, watch_type, until);
        until
    }

    /// Set an explicit expiry (entries shared by sibling agents).
    pub fn set_watch(&self, user_id: u64, watch_type: WatchType, until: DateTime<Utc>) {
        let mut state = self.users.entry(user_id).or_default();
        state.watch_until.insert(watch_type, until);
    }

    #[cfg(test)]
    pub fn is_watched(&self, user_id: u64, watch_type: WatchType, now: DateTime<Utc>) -> bool {
        self.users
            .get(&user_id)
            .is_some_and(|state| watch_active(&state, watch_type, now))
    }

    /// Stamp a detection in `group_id`, raising the score when this is the
    /// user's first detection there and `raise_score_on_first` is set.
    pub fn mark_detected(
        &self,
        group_id: u64,
        user_id: u64,
        now: DateTime<Utc>,
        raise_score_on_first: bool,
    ) -> DetectionOutcome {
        let mut state = self.users.entry(user_id).or_default();
        let previously_detected = state.detected.insert(group_id, now).is_some();

        let score_raised = raise_score_on_first && !previously_detected;
        if score_raised {
            state.score += self.settings.score_per_detection;
        }

        DetectionOutcome {
            previously_detected,
            score: state.score,
            score_raised,
        }
    }

    #[cfg(test)]
    pub fn score(&self, user_id: u64) -> i64 {
        self.users.get(&user_id).map(|s| s.score).unwrap_or(0)
    }

    pub fn set_score(&self, user_id: u64, score: i64) {
        self.users.entry(user_id).or_default().score = score;
    }

    /// Returns `true` if the user was not yet recorded in the group.
    pub fn record_in_group(&self, group_id: u64, user_id: u64) -> bool {
        self.recorded.entry(group_id).or_default().insert(user_id)
    }

    pub fn is_recorded(&self, group_id: u64, user_id: u64) -> bool {
        self.recorded
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id))
    }

    /// Forget every group's ad-hoc record set (daily reset).
    pub fn clear_recorded(&self) {
        self.recorded.clear();
    }
}

fn watch_active(state: &UserState, watch_type: WatchType, now: DateTime<Utc>) -> bool {
    state
        .watch_until
        .get(&watch_type)
        .is_some_and(|until| *until > now)
}

// ============================================================================
// TESTS
// ============================================================================
