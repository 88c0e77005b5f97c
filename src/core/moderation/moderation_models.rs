// Moderation domain models - data structures for language enforcement.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts incoming messages into `Message` and carries out
// whatever `Decision` the engine produces.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The author of a message, as seen by the moderation core.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub user_id: u64,
    /// Full display name (nickname or global name).
    pub display_name: String,
    /// Administrators and trusted members are never enforced against.
    pub privileged: bool,
}

/// An inbound message. Immutable once received.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub group_id: u64,
    pub message_id: u64,
    pub author: Author,
    pub text: String,
    /// Display name of the original author when the message was forwarded.
    pub forwarded_display_name: Option<String>,
}

/// Which signal triggered an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// The display name (or forwarded name) is in a disallowed language.
    Name,
    /// The message text is in a disallowed language.
    Text,
    /// Already confirmed by another pass; enforce without a new evidence report.
    #[serde(rename = "true")]
    Confirmed,
}

#[derive(Debug, Error, PartialEq)]
#[error("Malformed detection context: {0:?}")]
pub struct ContextParseError(pub String);

/// The `(type, language, extra?)` triple handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionContext {
    pub kind: TriggerKind,
    pub language: String,
    /// Extra signal class reported by the classifier, e.g. `spc`.
    pub extra: Option<String>,
}

impl DetectionContext {
    pub fn new(kind: TriggerKind, language: impl Into<String>) -> Self {
        Self {
            kind,
            language: language.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Parses the space separated form `"<type> <lang> [extra]"`.
impl FromStr for DetectionContext {
    type Err = ContextParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.split_whitespace().collect();
        let kind = match parts.first() {
            Some(&"name") => TriggerKind::Name,
            Some(&"text") => TriggerKind::Text,
            Some(&"true") => TriggerKind::Confirmed,
            _ => return Err(ContextParseError(raw.to_string())),
        };

        match parts.as_slice() {
            [_, language] => Ok(Self::new(kind, *language)),
            [_, language, extra] => Ok(Self::new(kind, *language).with_extra(*extra)),
            _ => Err(ContextParseError(raw.to_string())),
        }
    }
}

impl fmt::Display for DetectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TriggerKind::Name => "name",
            TriggerKind::Text => "text",
            TriggerKind::Confirmed => "true",
        };
        write!(f, "{} {}", kind, self.language)?;
        if let Some(extra) = &self.extra {
            write!(f, " {}", extra)?;
        }
        Ok(())
    }
}

/// Severity of a watch-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchType {
    Ban,
    Delete,
}

/// The single enforcement action chosen for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    DeleteOnly,
    BanAndDelete,
}

/// Fleet-wide follow-up requested alongside a delete or ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Ask siblings to ban the user in this group.
    Ban,
    /// Ask siblings to delete the user's messages in this group.
    Delete,
    /// Ask siblings to delete the user's messages in every group.
    DeleteGlobal,
}

/// Evidence level shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    AutoBan,
    AutoDelete,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::AutoBan => write!(f, "Auto Ban"),
            Level::AutoDelete => write!(f, "Auto Delete"),
        }
    }
}

/// Which enforcement rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleName {
    NameExamine,
    WatchUser,
    ScoreUser,
    CustomGroup,
}

impl std::fmt::Display for RuleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleName::NameExamine => write!(f, "Name Examination"),
            RuleName::WatchUser => write!(f, "Watched User"),
            RuleName::ScoreUser => write!(f, "High Score User"),
            RuleName::CustomGroup => write!(f, "Group Custom Rule"),
        }
    }
}

/// Structured record of why a user was enforced against. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub level: Level,
    pub rule: RuleName,
    pub language: String,
    pub score: Option<i64>,
    pub extra: Option<String>,
}

/// State changes a decision asks for. Applied per user in one critical section each.
#[derive(Debug, Clone, PartialEq)]
pub enum StateMutation {
    /// Add the user to the known bad actors and share it with the fleet.
    AddBadUser,
    /// Put the user on a watch list.
    AddWatch(WatchType),
    /// Stamp the detection time for this group, raising the score on a first detection.
    MarkDetected { raise_score_on_first: bool },
    /// Remember the user in the group's ad-hoc record set.
    RecordInGroup,
}

/// Full output of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// The rule that matched, `None` only for no-op decisions.
    pub rule: Option<&'static str>,
    /// Report to submit; `None` means silent enforcement.
    pub evidence: Option<Evidence>,
    pub mutations: Vec<StateMutation>,
    pub propagation: Option<Propagation>,
}

impl Decision {
    /// A decision that does nothing.
    pub fn none() -> Self {
        Self {
            action: Action::None,
            rule: None,
            evidence: None,
            mutations: Vec::new(),
            propagation: None,
        }
    }

    pub fn is_enforcement(&self) -> bool {
        self.action != Action::None
    }
}

/// Borrowed view of everything the engine knows about the author.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSnapshot {
    /// Detected in this group within the detection window.
    pub detected_in_group: bool,
    /// Present in this group's ad-hoc record set.
    pub recorded_in_group: bool,
    pub watch_ban: bool,
    pub watch_delete: bool,
    pub score: i64,
}

/// Agent-wide language policy consulted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EnforcementPolicy {
    /// Name languages that lead to a ban.
    pub name_ban_languages: BTreeSet<String>,
    /// Text languages that take the strict enforcement branch.
    pub text_ban_languages: BTreeSet<String>,
    /// Scores strictly above this ban the user.
    pub high_score_threshold: i64,
}

/// Signal classes that always take the strict text branch.
pub const SPECIAL_SIGNAL_CLASSES: [&str; 2] = ["spc", "spe"];
