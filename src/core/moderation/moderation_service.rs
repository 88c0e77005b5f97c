// Language moderation service - core business logic for enforcement.
//
// This service handles:
// - Screening inbound messages against the group's language config
// - Picking one action per message through the decision engine
// - Carrying the action out (delete -> declare -> ban/propagate)
// - Updating user state and announcing changes to the fleet
//
// Platform calls go through the dispatcher; anything the decision path does not
// need to wait for is handed to the background queue.

use super::decision_engine::{decide, DecisionInput};
use super::declared_messages::DeclaredMessages;
use super::moderation_models::{
    Action, Decision, DetectionContext, EnforcementPolicy, Evidence, Message, Propagation,
    StateMutation, WatchType,
};
use super::screening::{name_watch_hit, MessageScreen, NameWatchList};
use super::user_state_store::UserStateStore;
use crate::core::dispatch::{BackgroundQueue, Dispatcher, Failure, MessageRef};
use crate::core::group_config::GroupConfigStore;
use crate::core::relay::{HelpScope, RelayError, RelayPublisher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;

// ============================================================================
// REPORTING PORT
// ============================================================================

/// Where evidence and debug notes go.
#[async_trait]
pub trait EvidenceReporter: Send + Sync {
    /// Submit an evidence report. Returns the report message, if one was posted.
    async fn report(
        &self,
        message: &Message,
        evidence: &Evidence,
    ) -> Result<Option<MessageRef>, Failure>;

    /// Post a short note about an enforcement to the debug channel.
    async fn debug_note(
        &self,
        message: &Message,
        rule: &str,
        action: Action,
        report: Option<MessageRef>,
    ) -> Result<(), Failure>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Everything the service talks to besides its own stores.
pub struct ModerationPorts {
    pub dispatcher: Arc<Dispatcher>,
    pub background: BackgroundQueue,
    pub relay: Arc<RelayPublisher>,
    pub reporter: Arc<dyn EvidenceReporter>,
    pub watch_list: Arc<dyn NameWatchList>,
    pub screen: MessageScreen,
}

pub struct ModerationService {
    users: Arc<UserStateStore>,
    configs: Arc<GroupConfigStore>,
    declared: Arc<DeclaredMessages>,
    policy: EnforcementPolicy,
    ports: ModerationPorts,
}

impl ModerationService {
    pub fn new(
        users: Arc<UserStateStore>,
        configs: Arc<GroupConfigStore>,
        declared: Arc<DeclaredMessages>,
        policy: EnforcementPolicy,
        ports: ModerationPorts,
    ) -> Self {
        Self {
            users,
            configs,
            declared,
            policy,
            ports,
        }
    }

    /// Screen a message and enforce if needed. Returns `true` iff an action was taken.
    pub async fn process_message(&self, message: &Message) -> bool {
        if self.is_excluded(message) {
            return false;
        }

        let config = self.configs.get(message.group_id);
        match self.ports.screen.screen(message, &config).await {
            Some(context) => self.terminate_user(message, &context).await,
            None => false,
        }
    }

    /// Delete the message or ban its author, depending on the rules.
    ///
    /// Returns `true` iff some action was taken. Never fails: platform problems
    /// are logged and the remaining steps still run.
    ///
    /// The author's decision lock is held from the snapshot until the decision's
    /// state mutations are applied, so concurrent messages from one user are
    /// decided one after the other.
    pub async fn terminate_user(&self, message: &Message, context: &DetectionContext) -> bool {
        let _user_lock = self.users.lock_user(message.author.user_id).await;
        if self.is_excluded(message) {
            return false;
        }

        let now = Utc::now();
        let user = self
            .users
            .snapshot(message.group_id, message.author.user_id, now);
        let decision = decide(&DecisionInput {
            context,
            user: &user,
            policy: &self.policy,
            name_watch_hit: name_watch_hit(self.ports.watch_list.as_ref(), message),
        });

        if !decision.is_enforcement() {
            return false;
        }

        tracing::info!(
            group_id = message.group_id,
            user_id = message.author.user_id,
            message_id = message.message_id,
            rule = decision.rule.unwrap_or("none"),
            action = ?decision.action,
            %context,
            "Enforcing language rule"
        );

        self.enforce(message, &decision, now).await;
        true
    }

    /// Forget every group's ad-hoc record set.
    pub async fn daily_reset(&self) {
        self.users.clear_recorded();
        self.persist_users().await;
        tracing::info!("Daily record reset done");
    }

    /// Privileged authors, known bad actors and already handled messages are skipped.
    fn is_excluded(&self, message: &Message) -> bool {
        message.author.privileged
            || self.users.is_bad_user(message.author.user_id)
            || self
                .declared
                .is_declared(message.group_id, message.message_id)
    }

    async fn enforce(&self, message: &Message, decision: &Decision, now: DateTime<Utc>) {
        let group_id = message.group_id;
        let user_id = message.author.user_id;

        // Blocking: we need the report id for the debug note.
        let report = match &decision.evidence {
            Some(evidence) => match self.ports.reporter.report(message, evidence).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(group_id, user_id, error = %e, "Evidence report failed");
                    None
                }
            },
            None => None,
        };

        if let Err(e) = self
            .ports
            .dispatcher
            .delete(group_id, &[message.message_id])
            .await
        {
            tracing::warn!(group_id, message_id = message.message_id, error = %e, "Delete failed");
        }

        self.declared.declare(group_id, message.message_id);
        let message_id = message.message_id;
        self.relay_in_background("declare_message", move |relay| async move {
            relay.declare_message(group_id, message_id).await
        });

        if decision.action == Action::BanAndDelete {
            let dispatcher = Arc::clone(&self.ports.dispatcher);
            self.ports.background.submit("ban_member", async move {
                if let Err(e) = dispatcher.ban(group_id, user_id).await {
                    tracing::warn!(group_id, user_id, error = %e, "Ban failed");
                }
            });
        }

        for mutation in &decision.mutations {
            self.apply_mutation(group_id, user_id, mutation, now);
        }

        if let Some(propagation) = decision.propagation {
            let (kind, scope) = match propagation {
                Propagation::Ban => (WatchType::Ban, HelpScope::Single),
                Propagation::Delete => (WatchType::Delete, HelpScope::Single),
                Propagation::DeleteGlobal => (WatchType::Delete, HelpScope::Global),
            };
            self.relay_in_background("ask_for_help", move |relay| async move {
                relay.ask_for_help(kind, group_id, user_id, scope).await
            });
        }

        let reporter = Arc::clone(&self.ports.reporter);
        let noted = message.clone();
        let rule = decision.rule.unwrap_or("none");
        let action = decision.action;
        self.ports.background.submit("debug_note", async move {
            if let Err(e) = reporter.debug_note(&noted, rule, action, report).await {
                tracing::debug!(error = %e, "Debug note failed");
            }
        });

        if !decision.mutations.is_empty() {
            self.persist_users().await;
        }
    }

    fn apply_mutation(
        &self,
        group_id: u64,
        user_id: u64,
        mutation: &StateMutation,
        now: DateTime<Utc>,
    ) {
        match mutation {
            StateMutation::AddBadUser => {
                if self.users.add_bad_user(user_id) {
                    self.relay_in_background("share_bad_user", move |relay| async move {
                        relay.share_bad_user(user_id).await
                    });
                }
            }
            StateMutation::AddWatch(watch_type) => {
                let watch_type = *watch_type;
                let until = self.users.add_watch(user_id, watch_type, now);
                self.relay_in_background("share_watch_user", move |relay| async move {
                    relay.share_watch_user(user_id, watch_type, until).await
                });
            }
            StateMutation::MarkDetected {
                raise_score_on_first,
            } => {
                let outcome =
                    self.users
                        .mark_detected(group_id, user_id, now, *raise_score_on_first);
                if outcome.score_raised {
                    let score = outcome.score;
                    self.relay_in_background("update_score", move |relay| async move {
                        relay.update_score(user_id, score).await
                    });
                }
            }
            StateMutation::RecordInGroup => {
                self.users.record_in_group(group_id, user_id);
            }
        }
    }

    fn relay_in_background<F, Fut>(&self, label: &'static str, call: F)
    where
        F: FnOnce(Arc<RelayPublisher>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), RelayError>> + Send + 'static,
    {
        let relay = Arc::clone(&self.ports.relay);
        self.ports.background.submit(label, async move {
            if let Err(e) = call(relay).await {
                tracing::warn!(task = label, error = %e, "Relay announcement failed");
            }
        });
    }

    async fn persist_users(&self) {
        if let Err(e) = self.users.persist().await {
            tracing::error!(error = %e, "Failed to persist user state");
        }
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
    use crate::core::group_config::GroupConfig;
    use crate::core::moderation::screening::tests::{message, FixedWatchList, TableDetector};
    use crate::core::moderation::{TriggerKind, UserStateSettings};
    use crate::core::relay::{RelayActionType, RelayEnvelope, RelayIdentity, RelayReceivers};
    use crate::infra::persistence::InMemorySnapshotStore;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    const EXCHANGE: u64 = 900;

    /// Reporter that records evidence and can be told to fail.
    #[derive(Default)]
    struct MockReporter {
        reports: Mutex<Vec<Evidence>>,
        notes: Mutex<Vec<String>>,
        fail: bool,
        /// Give other tasks a turn before recording, like a real network call.
        yield_first: bool,
    }

    #[async_trait]
    impl EvidenceReporter for MockReporter {
        async fn report(
            &self,
            message: &Message,
            evidence: &Evidence,
        ) -> Result<Option<MessageRef>, Failure> {
            if self.yield_first {
                tokio::task::yield_now().await;
            }
            if self.fail {
                return Err(Failure::unknown("report", "logging channel gone"));
            }
            let mut reports = self.reports.lock().unwrap();
            reports.push(evidence.clone());
            Ok(Some(MessageRef {
                group_id: 1,
                message_id: message.message_id + 1_000,
            }))
        }

        async fn debug_note(
            &self,
            _message: &Message,
            rule: &str,
            _action: Action,
            _report: Option<MessageRef>,
        ) -> Result<(), Failure> {
            self.notes.lock().unwrap().push(rule.to_string());
            Ok(())
        }
    }

    struct Harness {
        service: ModerationService,
        transport: Arc<RecordingTransport>,
        reporter: Arc<MockReporter>,
        users: Arc<UserStateStore>,
        background: BackgroundQueue,
    }

    fn harness_with(reporter: MockReporter, watch_list: FixedWatchList) -> Harness {
        let snapshots = Arc::new(InMemorySnapshotStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Arc::new(Dispatcher::new(
            transport.clone(),
            RateLimitedExecutor::without_jitter(),
        ));
        let relay = Arc::new(RelayPublisher::new(
            Arc::clone(&dispatcher),
            RelayIdentity {
                agent_name: "LANG".to_string(),
                exchange_channel_id: EXCHANGE,
                receivers: RelayReceivers::default(),
            },
        ));
        let users = Arc::new(UserStateStore::new(
            UserStateSettings::default(),
            snapshots.clone(),
        ));
        let configs = Arc::new(GroupConfigStore::new(
            GroupConfig::with_defaults(
                BTreeSet::from(["ar".to_string()]),
                BTreeSet::from(["ar".to_string(), "ru".to_string()]),
            ),
            snapshots,
        ));
        let reporter = Arc::new(reporter);
        let background = BackgroundQueue::new();

        let service = ModerationService::new(
            Arc::clone(&users),
            configs,
            Arc::new(DeclaredMessages::new()),
            EnforcementPolicy {
                name_ban_languages: BTreeSet::from(["ar".to_string()]),
                text_ban_languages: BTreeSet::from(["ar".to_string()]),
                high_score_threshold: 3,
            },
            ModerationPorts {
                dispatcher,
                background: background.clone(),
                relay,
                reporter: reporter.clone(),
                watch_list: Arc::new(watch_list),
                screen: MessageScreen::new(Arc::new(TableDetector::with(&[
                    ("مرحبا", "ar"),
                    ("привет", "ru"),
                ]))),
            },
        );

        Harness {
            service,
            transport,
            reporter,
            users,
            background,
        }
    }

    fn harness() -> Harness {
        harness_with(MockReporter::default(), FixedWatchList::default())
    }

    fn relay_kinds(transport: &RecordingTransport) -> Vec<RelayActionType> {
        transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(group_id, _)| *group_id == EXCHANGE)
            .filter_map(|(_, text)| serde_json::from_str::<RelayEnvelope>(text).ok())
            .map(|envelope| envelope.action_type)
            .collect()
    }

    #[tokio::test]
    async fn test_first_offense_reports_once_then_silent() {
        let h = harness();
        let text = DetectionContext::new(TriggerKind::Text, "ar");
        let first = message("bob", "مرحبا");
        let mut second = first.clone();
        second.message_id = 101;

        assert!(h.service.terminate_user(&first, &text).await);
        assert!(h.service.terminate_user(&second, &text).await);
        h.background.wait_idle().await;

        assert_eq!(h.reporter.reports.lock().unwrap().len(), 1);
        assert!(h.users.is_recorded(1, 7));
        assert_eq!(h.users.score(7), 1);
        let deleted: Vec<Vec<u64>> = h
            .transport
            .deletes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, ids)| ids.clone())
            .collect();
        assert_eq!(deleted, vec![vec![100], vec![101]]);
    }

    #[tokio::test]
    async fn test_concurrent_first_offenses_report_once() {
        let h = harness_with(
            MockReporter {
                yield_first: true,
                ..Default::default()
            },
            FixedWatchList::default(),
        );
        let text = DetectionContext::new(TriggerKind::Text, "ar");
        let first = message("bob", "مرحبا");
        let mut second = first.clone();
        second.message_id = 101;

        let acted = tokio::join!(
            h.service.terminate_user(&first, &text),
            h.service.terminate_user(&second, &text)
        );
        h.background.wait_idle().await;

        assert_eq!(acted, (true, true));
        assert_eq!(h.reporter.reports.lock().unwrap().len(), 1);
        assert_eq!(h.users.score(7), 1);
        assert_eq!(h.transport.deletes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_declared_message_is_not_handled_twice() {
        let h = harness();
        let text = DetectionContext::new(TriggerKind::Text, "ar");
        let msg = message("bob", "مرحبا");

        assert!(h.service.terminate_user(&msg, &text).await);
        assert!(!h.service.terminate_user(&msg, &text).await);
        assert_eq!(h.transport.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_watch_delete_escalates_without_report() {
        let h = harness();
        h.users.add_watch(7, WatchType::Delete, Utc::now());

        let acted = h
            .service
            .terminate_user(
                &message("bob", "مرحبا"),
                &DetectionContext::new(TriggerKind::Text, "ar"),
            )
            .await;
        h.background.wait_idle().await;

        assert!(acted);
        assert!(h.reporter.reports.lock().unwrap().is_empty());
        assert!(h.users.is_watched(7, WatchType::Ban, Utc::now()));
        assert_eq!(h.users.score(7), 1);
        let kinds = relay_kinds(&h.transport);
        assert!(kinds.contains(&RelayActionType::Watch));
        assert!(kinds.contains(&RelayActionType::Delete));
        assert!(h.transport.bans.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_name_language_in_ban_set_bans_in_background() {
        let h = harness();

        let acted = h
            .service
            .terminate_user(
                &message("مرحبا", "hello"),
                &DetectionContext::new(TriggerKind::Name, "ar"),
            )
            .await;
        h.background.wait_idle().await;

        assert!(acted);
        assert_eq!(*h.transport.bans.lock().unwrap(), vec![(1, 7)]);
        assert!(h.users.is_bad_user(7));
        let kinds = relay_kinds(&h.transport);
        assert!(kinds.contains(&RelayActionType::Bad));
        assert!(kinds.contains(&RelayActionType::Ban));
        assert!(kinds.contains(&RelayActionType::Declare));
        assert_eq!(*h.reporter.notes.lock().unwrap(), vec!["name_language".to_string()]);
    }

    #[tokio::test]
    async fn test_name_watch_hit_bans() {
        let h = harness_with(
            MockReporter::default(),
            FixedWatchList {
                watched: vec!["cheap shop".to_string()],
                excepted: Vec::new(),
            },
        );

        h.service
            .terminate_user(
                &message("cheap shop", "مرحبا"),
                &DetectionContext::new(TriggerKind::Text, "ar"),
            )
            .await;
        h.background.wait_idle().await;

        let reports = h.reporter.reports.lock().unwrap();
        assert_eq!(reports[0].rule, crate::core::moderation::RuleName::NameExamine);
        assert_eq!(h.transport.bans.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_privileged_author_is_untouched() {
        let h = harness();
        let mut msg = message("admin", "مرحبا");
        msg.author.privileged = true;

        let acted = h
            .service
            .terminate_user(&msg, &DetectionContext::new(TriggerKind::Text, "ar"))
            .await;

        assert!(!acted);
        assert!(h.transport.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_report_still_enforces() {
        let h = harness_with(
            MockReporter {
                fail: true,
                ..Default::default()
            },
            FixedWatchList::default(),
        );

        let acted = h
            .service
            .terminate_user(
                &message("bob", "мир"),
                &DetectionContext::new(TriggerKind::Text, "ru"),
            )
            .await;

        assert!(acted);
        assert_eq!(h.transport.deletes.lock().unwrap().len(), 1);
        assert!(h.users.is_recorded(1, 7));
    }

    #[tokio::test]
    async fn test_process_message_screens_then_enforces() {
        let h = harness();

        let mut benign = message("bob", "hello");
        benign.message_id = 102;

        assert!(h.service.process_message(&message("bob", "привет")).await);
        assert!(!h.service.process_message(&benign).await);
        h.background.wait_idle().await;

        // "ru" is only in the group's list, not the strict set: custom group rule
        let reports = h.reporter.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rule, crate::core::moderation::RuleName::CustomGroup);
        assert_eq!(h.users.score(7), 0);
    }

    #[tokio::test]
    async fn test_daily_reset_forgets_records() {
        let h = harness();
        h.users.record_in_group(1, 7);

        h.service.daily_reset().await;

        assert!(!h.users.is_recorded(1, 7));
    }
}
