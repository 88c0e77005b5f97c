// Outbound fleet announcements.
//
// Announcements are posted to the shared exchange channel through the dispatcher,
// so they get the same flood-wait handling as every other platform call. Long
// envelopes go out as a JSON attachment instead of inline text.

use super::relay_models::{
    BadUserPayload, ConfigAskPayload, DeclarePayload, HelpPayload, HelpScope, RelayAction,
    RelayActionType, RelayEnvelope, RelayReceivers, ScorePayload, WatchUserPayload,
};
use crate::core::dispatch::{Dispatcher, Failure, SendOptions};
use crate::core::moderation::WatchType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Envelopes longer than this are sent as a file.
pub const INLINE_LIMIT: usize = 1900;

const ATTACHMENT_NAME: &str = "relay.json";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to encode relay payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to post relay envelope: {0}")]
    Dispatch(#[from] Failure),
}

/// Identity and addressing of this agent on the exchange channel.
#[derive(Debug, Clone)]
pub struct RelayIdentity {
    pub agent_name: String,
    pub exchange_channel_id: u64,
    pub receivers: RelayReceivers,
}

pub struct RelayPublisher {
    dispatcher: Arc<Dispatcher>,
    identity: RelayIdentity,
}

impl RelayPublisher {
    pub fn new(dispatcher: Arc<Dispatcher>, identity: RelayIdentity) -> Self {
        Self {
            dispatcher,
            identity,
        }
    }

    /// Serialize `data` into an envelope and post it for `receivers`.
    pub async fn announce<T: Serialize>(
        &self,
        receivers: &[String],
        action: RelayAction,
        action_type: RelayActionType,
        data: &T,
    ) -> Result<(), RelayError> {
        if receivers.is_empty() {
            return Ok(());
        }

        let envelope = RelayEnvelope {
            from: self.identity.agent_name.clone(),
            to: receivers.to_vec(),
            action,
            action_type,
            data: serde_json::to_value(data)?,
        };
        let text = serde_json::to_string(&envelope)?;

        let options = if text.chars().count() > INLINE_LIMIT {
            SendOptions::attachment(ATTACHMENT_NAME)
        } else {
            SendOptions::default()
        };

        self.dispatcher
            .send(self.identity.exchange_channel_id, &text, &options)
            .await?;

        tracing::debug!(?action, ?action_type, receivers = receivers.len(), "Relay envelope posted");
        Ok(())
    }

    pub async fn share_bad_user(&self, user_id: u64) -> Result<(), RelayError> {
        self.announce(
            &self.identity.receivers.bad,
            RelayAction::Add,
            RelayActionType::Bad,
            &BadUserPayload { id: user_id },
        )
        .await
    }

    pub async fn share_watch_user(
        &self,
        user_id: u64,
        watch_type: WatchType,
        until: DateTime<Utc>,
    ) -> Result<(), RelayError> {
        self.announce(
            &self.identity.receivers.watch,
            RelayAction::Add,
            RelayActionType::Watch,
            &WatchUserPayload {
                id: user_id,
                watch_type,
                until,
            },
        )
        .await
    }

    /// Ask siblings to ban (`WatchType::Ban`) or clean up after (`WatchType::Delete`) a user.
    pub async fn ask_for_help(
        &self,
        kind: WatchType,
        group_id: u64,
        user_id: u64,
        scope: HelpScope,
    ) -> Result<(), RelayError> {
        let action_type = match kind {
            WatchType::Ban => RelayActionType::Ban,
            WatchType::Delete => RelayActionType::Delete,
        };
        self.announce(
            &self.identity.receivers.help,
            RelayAction::Help,
            action_type,
            &HelpPayload {
                group_id,
                user_id,
                scope,
            },
        )
        .await
    }

    pub async fn update_score(&self, user_id: u64, score: i64) -> Result<(), RelayError> {
        self.announce(
            &self.identity.receivers.score,
            RelayAction::Update,
            RelayActionType::Score,
            &ScorePayload { id: user_id, score },
        )
        .await
    }

    pub async fn declare_message(&self, group_id: u64, message_id: u64) -> Result<(), RelayError> {
        self.announce(
            &self.identity.receivers.declare,
            RelayAction::Update,
            RelayActionType::Declare,
            &DeclarePayload {
                group_id,
                message_id,
            },
        )
        .await
    }

    pub async fn ask_config_session(&self, payload: &ConfigAskPayload) -> Result<(), RelayError> {
        self.announce(
            &self.identity.receivers.config,
            RelayAction::Config,
            RelayActionType::Ask,
            payload,
        )
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::batch_deleter::tests::RecordingTransport;
    use crate::core::dispatch::RateLimitedExecutor;
    use crate::core::group_config::{GroupConfig, KNOWN_LANGUAGE_TAGS};
    use std::collections::BTreeSet;

    const EXCHANGE: u64 = 900;

    fn publisher(transport: Arc<RecordingTransport>) -> RelayPublisher {
        let dispatcher = Dispatcher::new(transport, RateLimitedExecutor::without_jitter());
        RelayPublisher::new(
            Arc::new(dispatcher),
            RelayIdentity {
                agent_name: "LANG".to_string(),
                exchange_channel_id: EXCHANGE,
                receivers: RelayReceivers::default(),
            },
        )
    }

    #[tokio::test]
    async fn test_bad_user_goes_to_exchange_channel() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher(Arc::clone(&transport));

        publisher.share_bad_user(77).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, EXCHANGE);
        let envelope: RelayEnvelope = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(envelope.from, "LANG");
        assert_eq!(envelope.action, RelayAction::Add);
        assert_eq!(envelope.action_type, RelayActionType::Bad);
        assert_eq!(envelope.to, RelayReceivers::default().bad);
        assert_eq!(envelope.data["id"], 77);
    }

    #[tokio::test]
    async fn test_no_receivers_sends_nothing() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher(Arc::clone(&transport));

        publisher
            .announce(&[], RelayAction::Update, RelayActionType::Score, &ScorePayload { id: 1, score: 2 })
            .await
            .unwrap();

        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_as_dispatch_error() {
        let transport = Arc::new(RecordingTransport {
            fail_sends: true,
            ..Default::default()
        });
        let publisher = publisher(transport);

        let result = publisher.declare_message(1, 2).await;

        assert!(matches!(result, Err(RelayError::Dispatch(_))));
    }

    #[tokio::test]
    async fn test_config_ask_carries_both_configs() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher(Arc::clone(&transport));
        let default = GroupConfig::with_defaults(
            BTreeSet::from(["ar".to_string()]),
            BTreeSet::from(["fa".to_string()]),
        );

        publisher
            .ask_config_session(&ConfigAskPayload {
                project_name: "LANG".to_string(),
                project_link: "https://example.org".to_string(),
                group_id: 5,
                group_name: "group-5".to_string(),
                group_link: None,
                user_id: 6,
                config: default.clone(),
                default,
            })
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        let envelope: RelayEnvelope = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(envelope.to, vec!["CONFIG".to_string()]);
        assert_eq!(envelope.action_type, RelayActionType::Ask);
        assert_eq!(envelope.data["config"]["text"]["list"][0], "fa");
    }

    fn all_tags() -> BTreeSet<String> {
        KNOWN_LANGUAGE_TAGS.iter().map(|tag| tag.to_string()).collect()
    }

    #[tokio::test]
    async fn test_long_envelope_goes_out_as_attachment() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher(Arc::clone(&transport));
        let full = GroupConfig::with_defaults(all_tags(), all_tags());

        publisher
            .ask_config_session(&ConfigAskPayload {
                project_name: "LANG".to_string(),
                project_link: "https://example.org".to_string(),
                group_id: 5,
                group_name: "a rather long group name ".repeat(20),
                group_link: Some("https://discord.com/channels/1/5".to_string()),
                user_id: 6,
                config: full.clone(),
                default: full,
            })
            .await
            .unwrap();

        let sent = transport.sent.lock().unwrap();
        assert!(sent[0].1.chars().count() > INLINE_LIMIT);
        // The attachment body is still the plain envelope
        let envelope: RelayEnvelope = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(envelope.action_type, RelayActionType::Ask);
        assert_eq!(
            *transport.attachments.lock().unwrap(),
            vec![Some("relay.json".to_string())]
        );
    }

    #[tokio::test]
    async fn test_short_envelope_is_sent_inline() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = publisher(Arc::clone(&transport));

        publisher.update_score(7, 3).await.unwrap();

        assert!(transport.sent.lock().unwrap()[0].1.chars().count() <= INLINE_LIMIT);
        assert_eq!(*transport.attachments.lock().unwrap(), vec![None]);
    }
}
