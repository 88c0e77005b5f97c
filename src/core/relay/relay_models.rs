// Fleet relay message schema.
//
// Every announcement travels in one envelope: who sent it, who should act on it,
// what kind it is and a structured payload. Sibling agents ignore envelopes
// not addressed to them.

use crate::core::group_config::GroupConfig;
use crate::core::moderation::WatchType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level announcement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayAction {
    Add,
    Help,
    Update,
    Config,
}

/// Sub-kind of an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayActionType {
    Bad,
    Watch,
    Ban,
    Delete,
    Score,
    Declare,
    Ask,
    Commit,
}

/// The wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub from: String,
    pub to: Vec<String>,
    pub action: RelayAction,
    pub action_type: RelayActionType,
    pub data: serde_json::Value,
}

impl RelayEnvelope {
    pub fn is_addressed_to(&self, agent: &str) -> bool {
        self.to.iter().any(|receiver| receiver.eq_ignore_ascii_case(agent))
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// `add/bad`: a user confirmed as a bad actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadUserPayload {
    pub id: u64,
}

/// `add/watch`: a user put on a watch list until `until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchUserPayload {
    pub id: u64,
    #[serde(rename = "type")]
    pub watch_type: WatchType,
    pub until: DateTime<Utc>,
}

/// How far a `help/delete` request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelpScope {
    /// Only the originating group.
    Single,
    /// Every group the receiver manages.
    Global,
}

/// `help/ban` and `help/delete`: ask siblings to act on a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpPayload {
    pub group_id: u64,
    pub user_id: u64,
    pub scope: HelpScope,
}

/// `update/score`: the user's current trust score from this agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub id: u64,
    pub score: i64,
}

/// `update/declare`: a message this agent already handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarePayload {
    pub group_id: u64,
    pub message_id: u64,
}

/// `config/ask`: request a configuration session from the CONFIG agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigAskPayload {
    pub project_name: String,
    pub project_link: String,
    pub group_id: u64,
    pub group_name: String,
    pub group_link: Option<String>,
    pub user_id: u64,
    pub config: GroupConfig,
    pub default: GroupConfig,
}

/// `config/commit`: the finished session pushed back by the CONFIG agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigCommitPayload {
    pub group_id: u64,
    pub user_id: u64,
    pub config: GroupConfig,
}

/// Receiver agents for each outbound kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayReceivers {
    pub bad: Vec<String>,
    pub watch: Vec<String>,
    pub help: Vec<String>,
    pub score: Vec<String>,
    pub declare: Vec<String>,
    pub config: Vec<String>,
}

impl Default for RelayReceivers {
    fn default() -> Self {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            bad: names(&["ANALYZE", "APPEAL", "CAPTCHA", "CLEAN", "LONG", "MANAGE", "WATCH"]),
            watch: names(&["ANALYZE", "CAPTCHA", "CLEAN", "LONG", "MANAGE", "WATCH"]),
            help: names(&["USER"]),
            score: names(&["ANALYZE", "CAPTCHA", "CLEAN", "LONG", "MANAGE"]),
            declare: names(&["ANALYZE", "CLEAN", "LONG", "USER"]),
            config: names(&["CONFIG"]),
        }
    }
}
