// Decision engine - picks exactly one enforcement action per message.
//
// The precedence is data: `RULES` is evaluated top to bottom and the first rule
// whose predicate holds produces the decision. Nothing here touches the platform
// or the stores; the caller hands in a snapshot and applies the result.

use super::moderation_models::{
    Action, Decision, DetectionContext, EnforcementPolicy, Evidence, Level, Propagation, RuleName,
    StateMutation, TriggerKind, UserSnapshot, WatchType, SPECIAL_SIGNAL_CLASSES,
};

/// Everything one evaluation looks at.
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    pub context: &'a DetectionContext,
    pub user: &'a UserSnapshot,
    pub policy: &'a EnforcementPolicy,
    /// Display name or forwarded name hit the name watch list and is not excepted.
    pub name_watch_hit: bool,
}

impl DecisionInput<'_> {
    fn is_name_trigger(&self) -> bool {
        self.context.kind == TriggerKind::Name
    }

    /// Language (or extra signal) falls in the strict text set.
    fn is_strict_text(&self) -> bool {
        if self.is_name_trigger() {
            return false;
        }
        let special = |s: &str| SPECIAL_SIGNAL_CLASSES.contains(&s);
        self.policy
            .text_ban_languages
            .contains(&self.context.language)
            || special(&self.context.language)
            || self.context.extra.as_deref().is_some_and(special)
    }

    fn is_high_score(&self) -> bool {
        self.user.score > self.policy.high_score_threshold
    }

    fn evidence(&self, level: Level, rule: RuleName) -> Evidence {
        Evidence {
            level,
            rule,
            language: self.context.language.clone(),
            score: None,
            extra: self.context.extra.clone(),
        }
    }
}

/// One entry of the ordered rule list.
pub struct Rule {
    pub id: &'static str,
    pub applies: fn(&DecisionInput) -> bool,
    pub decide: fn(&DecisionInput) -> Decision,
}

/// Rule precedence, first match wins.
pub const RULES: &[Rule] = &[
    Rule {
        id: "name_language",
        applies: |input| input.is_name_trigger(),
        decide: decide_name_language,
    },
    Rule {
        id: "name_watch",
        applies: |input| input.is_strict_text() && input.name_watch_hit,
        decide: |input| ban(input, RuleName::NameExamine, None),
    },
    Rule {
        id: "watch_ban",
        applies: |input| input.is_strict_text() && input.user.watch_ban,
        decide: |input| ban(input, RuleName::WatchUser, None),
    },
    Rule {
        id: "high_score",
        applies: |input| input.is_strict_text() && input.is_high_score(),
        decide: |input| ban(input, RuleName::ScoreUser, Some(input.user.score)),
    },
    Rule {
        id: "watch_delete",
        applies: |input| input.is_strict_text() && input.user.watch_delete,
        decide: |_| Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: None,
            mutations: vec![
                StateMutation::AddWatch(WatchType::Ban),
                StateMutation::MarkDetected {
                    raise_score_on_first: true,
                },
            ],
            propagation: Some(Propagation::DeleteGlobal),
        },
    },
    Rule {
        id: "repeat_offense",
        applies: |input| {
            input.is_strict_text()
                && (input.user.detected_in_group
                    || input.user.recorded_in_group
                    || input.context.kind == TriggerKind::Confirmed)
        },
        decide: |_| Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: None,
            mutations: vec![StateMutation::MarkDetected {
                raise_score_on_first: false,
            }],
            propagation: None,
        },
    },
    Rule {
        id: "first_offense",
        applies: |input| input.is_strict_text(),
        decide: |input| Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: Some(input.evidence(Level::AutoDelete, RuleName::CustomGroup)),
            mutations: vec![
                StateMutation::RecordInGroup,
                StateMutation::MarkDetected {
                    raise_score_on_first: true,
                },
            ],
            propagation: None,
        },
    },
    Rule {
        id: "custom_repeat",
        applies: |input| input.user.recorded_in_group,
        decide: |_| Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: None,
            mutations: Vec::new(),
            propagation: None,
        },
    },
    Rule {
        id: "custom_first",
        applies: |_| true,
        decide: |input| Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: Some(input.evidence(Level::AutoDelete, RuleName::CustomGroup)),
            mutations: vec![StateMutation::RecordInGroup],
            propagation: None,
        },
    },
];

fn decide_name_language(input: &DecisionInput) -> Decision {
    if input
        .policy
        .name_ban_languages
        .contains(&input.context.language)
    {
        ban(input, RuleName::NameExamine, None)
    } else {
        Decision {
            action: Action::DeleteOnly,
            rule: None,
            evidence: Some(input.evidence(Level::AutoDelete, RuleName::NameExamine)),
            mutations: Vec::new(),
            propagation: Some(Propagation::Delete),
        }
    }
}

fn ban(input: &DecisionInput, rule: RuleName, score: Option<i64>) -> Decision {
    let mut evidence = input.evidence(Level::AutoBan, rule);
    evidence.score = score;
    Decision {
        action: Action::BanAndDelete,
        rule: None,
        evidence: Some(evidence),
        mutations: vec![StateMutation::AddBadUser],
        propagation: Some(Propagation::Ban),
    }
}

/// Evaluate the rule list and stamp the winning rule's id on the decision.
/// Always yields an enforcement decision; exclusion checks
/// (privileged author, declared message) happen before the engine is consulted.
pub fn decide(input: &DecisionInput) -> Decision {
    RULES
        .iter()
        .find(|rule| (rule.applies)(input))
        .map(|rule| Decision {
            rule: Some(rule.id),
            ..(rule.decide)(input)
        })
        .unwrap_or_else(Decision::none)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn policy() -> EnforcementPolicy {
        EnforcementPolicy {
            name_ban_languages: BTreeSet::from(["ar".to_string(), "fa".to_string()]),
            text_ban_languages: BTreeSet::from(["ar".to_string()]),
            high_score_threshold: 3,
        }
    }

    fn run(context: DetectionContext, user: UserSnapshot, name_watch_hit: bool) -> Decision {
        let policy = policy();
        decide(&DecisionInput {
            context: &context,
            user: &user,
            policy: &policy,
            name_watch_hit,
        })
    }

    #[test]
    fn test_rule_precedence_is_fixed() {
        let ids: Vec<&str> = RULES.iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![
                "name_language",
                "name_watch",
                "watch_ban",
                "high_score",
                "watch_delete",
                "repeat_offense",
                "first_offense",
                "custom_repeat",
                "custom_first",
            ]
        );
    }

    #[test]
    fn test_name_language_in_ban_set_bans_fleet_wide() {
        let decision = run(
            DetectionContext::new(TriggerKind::Name, "fa"),
            UserSnapshot::default(),
            false,
        );

        assert_eq!(decision.action, Action::BanAndDelete);
        assert_eq!(decision.propagation, Some(Propagation::Ban));
        assert_eq!(decision.mutations, vec![StateMutation::AddBadUser]);
        assert_eq!(decision.evidence.unwrap().rule, RuleName::NameExamine);
    }

    #[test]
    fn test_name_language_outside_ban_set_deletes_only() {
        let decision = run(
            DetectionContext::new(TriggerKind::Name, "ru"),
            UserSnapshot {
                watch_ban: true,
                score: 99,
                ..Default::default()
            },
            true,
        );

        assert_eq!(decision.action, Action::DeleteOnly);
        assert_eq!(decision.propagation, Some(Propagation::Delete));
        assert!(decision.mutations.is_empty());
    }

    #[test]
    fn test_name_watch_beats_watch_list_and_score() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot {
                watch_ban: true,
                score: 10,
                ..Default::default()
            },
            true,
        );

        assert_eq!(decision.rule, Some("name_watch"));
        assert_eq!(decision.action, Action::BanAndDelete);
    }

    #[test]
    fn test_watch_ban_user_is_banned() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot {
                watch_ban: true,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.rule, Some("watch_ban"));
        assert_eq!(decision.evidence.unwrap().rule, RuleName::WatchUser);
    }

    #[test]
    fn test_high_score_evidence_carries_score() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot {
                score: 4,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.action, Action::BanAndDelete);
        let evidence = decision.evidence.unwrap();
        assert_eq!(evidence.rule, RuleName::ScoreUser);
        assert_eq!(evidence.score, Some(4));
    }

    #[test]
    fn test_score_at_threshold_is_not_high() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot {
                score: 3,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.rule, Some("first_offense"));
    }

    #[test]
    fn test_watch_delete_escalates_to_ban_watch_without_report() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot {
                watch_delete: true,
                detected_in_group: true,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.action, Action::DeleteOnly);
        assert!(decision.evidence.is_none());
        assert_eq!(decision.propagation, Some(Propagation::DeleteGlobal));
        assert!(decision
            .mutations
            .contains(&StateMutation::AddWatch(WatchType::Ban)));
    }

    #[test]
    fn test_repeat_offense_is_silent() {
        for user in [
            UserSnapshot {
                detected_in_group: true,
                ..Default::default()
            },
            UserSnapshot {
                recorded_in_group: true,
                ..Default::default()
            },
        ] {
            let decision = run(DetectionContext::new(TriggerKind::Text, "ar"), user, false);
            assert_eq!(decision.rule, Some("repeat_offense"));
            assert!(decision.evidence.is_none());
        }
    }

    #[test]
    fn test_confirmed_trigger_is_silent_on_first_offense() {
        let decision = run(
            DetectionContext::new(TriggerKind::Confirmed, "ar"),
            UserSnapshot::default(),
            false,
        );

        assert_eq!(decision.rule, Some("repeat_offense"));
        assert!(decision.evidence.is_none());
    }

    #[test]
    fn test_first_offense_records_and_reports() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "ar"),
            UserSnapshot::default(),
            false,
        );

        assert_eq!(decision.action, Action::DeleteOnly);
        assert_eq!(decision.evidence.unwrap().level, Level::AutoDelete);
        assert_eq!(
            decision.mutations,
            vec![
                StateMutation::RecordInGroup,
                StateMutation::MarkDetected {
                    raise_score_on_first: true
                }
            ]
        );
    }

    #[test]
    fn test_special_signal_class_takes_strict_branch() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "en").with_extra("spc"),
            UserSnapshot {
                watch_ban: true,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.rule, Some("watch_ban"));
    }

    #[test]
    fn test_custom_language_ignores_watch_lists() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "de"),
            UserSnapshot {
                watch_ban: true,
                score: 50,
                ..Default::default()
            },
            true,
        );

        assert_eq!(decision.rule, Some("custom_first"));
        assert_eq!(decision.mutations, vec![StateMutation::RecordInGroup]);
        assert!(decision.evidence.is_some());
    }

    #[test]
    fn test_custom_language_repeat_is_silent() {
        let decision = run(
            DetectionContext::new(TriggerKind::Text, "de"),
            UserSnapshot {
                recorded_in_group: true,
                ..Default::default()
            },
            false,
        );

        assert_eq!(decision.rule, Some("custom_repeat"));
        assert!(decision.evidence.is_none());
        assert_eq!(decision.action, Action::DeleteOnly);
    }
}
