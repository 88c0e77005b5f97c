// Inbound fleet announcements.
//
// Sibling agents post envelopes to the exchange channel. The ones addressed to
// this agent are applied to the local stores: configs committed by the CONFIG
// agent, bad users, watch entries, scores and declared messages.

use super::relay_models::{
    BadUserPayload, ConfigCommitPayload, DeclarePayload, RelayAction, RelayActionType,
    RelayEnvelope, ScorePayload, WatchUserPayload,
};
use crate::core::group_config::GroupConfigStore;
use crate::core::moderation::{DeclaredMessages, UserStateStore};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// What happened to one inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Applied,
    /// Not for us, sent by us, or a kind this agent does not consume.
    Ignored,
}

pub struct FleetSync {
    agent_name: String,
    users: Arc<UserStateStore>,
    configs: Arc<GroupConfigStore>,
    declared: Arc<DeclaredMessages>,
}

impl FleetSync {
    pub fn new(
        agent_name: impl Into<String>,
        users: Arc<UserStateStore>,
        configs: Arc<GroupConfigStore>,
        declared: Arc<DeclaredMessages>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            users,
            configs,
            declared,
        }
    }

    /// Parse and apply a raw exchange-channel message. Garbage is logged and ignored.
    pub async fn handle_raw(&self, raw: &str) -> SyncOutcome {
        match serde_json::from_str::<RelayEnvelope>(raw) {
            Ok(envelope) => self.apply(envelope).await,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring non-relay exchange message");
                SyncOutcome::Ignored
            }
        }
    }

    pub async fn apply(&self, envelope: RelayEnvelope) -> SyncOutcome {
        if envelope.from.eq_ignore_ascii_case(&self.agent_name)
            || !envelope.is_addressed_to(&self.agent_name)
        {
            return SyncOutcome::Ignored;
        }

        let from = envelope.from.clone();
        let (action, action_type) = (envelope.action, envelope.action_type);
        let applied = match (action, action_type) {
            (RelayAction::Config, RelayActionType::Commit) => {
                match payload::<ConfigCommitPayload>(envelope) {
                    Some(commit) => {
                        tracing::info!(
                            group_id = commit.group_id,
                            user_id = commit.user_id,
                            "Applying committed config session"
                        );
                        self.configs.commit_session(commit.group_id, commit.config).await;
                        true
                    }
                    None => false,
                }
            }
            (RelayAction::Add, RelayActionType::Bad) => match payload::<BadUserPayload>(envelope) {
                Some(bad) => {
                    self.users.add_bad_user(bad.id);
                    self.persist_users().await;
                    true
                }
                None => false,
            },
            (RelayAction::Add, RelayActionType::Watch) => {
                match payload::<WatchUserPayload>(envelope) {
                    Some(watch) => {
                        self.users.set_watch(watch.id, watch.watch_type, watch.until);
                        self.persist_users().await;
                        true
                    }
                    None => false,
                }
            }
            (RelayAction::Update, RelayActionType::Score) => {
                match payload::<ScorePayload>(envelope) {
                    Some(score) => {
                        self.users.set_score(score.id, score.score);
                        self.persist_users().await;
                        true
                    }
                    None => false,
                }
            }
            (RelayAction::Update, RelayActionType::Declare) => {
                match payload::<DeclarePayload>(envelope) {
                    Some(declare) => {
                        self.declared.declare(declare.group_id, declare.message_id);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        };

        if applied {
            tracing::debug!(%from, ?action, ?action_type, "Relay envelope applied");
            SyncOutcome::Applied
        } else {
            SyncOutcome::Ignored
        }
    }

    async fn persist_users(&self) {
        if let Err(e) = self.users.persist().await {
            tracing::error!(error = %e, "Failed to persist user state after relay update");
        }
    }
}

fn payload<T: DeserializeOwned>(envelope: RelayEnvelope) -> Option<T> {
    match serde_json::from_value(envelope.data) {
        Ok(data) => Some(data),
        Err(e) => {
            tracing::warn!(
                from = %envelope.from,
                action = ?envelope.action,
                action_type = ?envelope.action_type,
                error = %e,
                "Malformed relay payload"
            );
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
