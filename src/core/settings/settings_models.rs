// Agent settings, read once at startup.
//
// Everything comes from environment variables (a `.env` file is loaded by main).
// Required values fail fast; the rest fall back to sensible defaults.

use crate::core::group_config::{is_known_language, GroupConfig};
use crate::core::moderation::{EnforcementPolicy, UserStateSettings};
use crate::core::relay::{RelayIdentity, RelayReceivers};
use std::collections::BTreeSet;
use chrono::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where snapshots are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub discord_token: String,
    /// Name this agent uses on the relay.
    pub agent_name: String,
    pub project_link: String,

    pub exchange_channel_id: u64,
    pub logging_channel_id: u64,
    pub debug_channel_id: u64,

    pub lang_detect_url: String,
    pub lang_detect_api_key: Option<String>,
    pub watch_list_path: String,

    pub data_dir: String,
    pub storage: StorageBackend,

    /// Name languages that lead to a ban.
    pub name_ban_languages: BTreeSet<String>,
    /// Text languages that take the strict branch.
    pub text_ban_languages: BTreeSet<String>,
    /// Default group lists.
    pub default_name_languages: BTreeSet<String>,
    pub default_text_languages: BTreeSet<String>,

    pub high_score_threshold: i64,
    pub score_per_detection: i64,
    pub detection_ttl: Duration,
    pub watch_ttl: Duration,

    pub max_concurrent_messages: usize,
    pub receivers: RelayReceivers,
}

impl AgentSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(SettingsError::Missing(key));

        let name_ban_languages = languages(&get, "LANG_NAME", "ar fa")?;
        let text_ban_languages = languages(&get, "LANG_TEXT", "ar fa")?;
        let default_name_languages =
            languages(&get, "DEFAULT_NAME_LIST", &join(&name_ban_languages))?;
        let default_text_languages =
            languages(&get, "DEFAULT_TEXT_LIST", &join(&text_ban_languages))?;

        let defaults = RelayReceivers::default();
        let receivers = RelayReceivers {
            bad: names(&get, "RECEIVERS_BAD").unwrap_or(defaults.bad),
            watch: names(&get, "RECEIVERS_WATCH").unwrap_or(defaults.watch),
            help: names(&get, "RECEIVERS_HELP").unwrap_or(defaults.help),
            score: names(&get, "RECEIVERS_SCORE").unwrap_or(defaults.score),
            declare: names(&get, "RECEIVERS_DECLARE").unwrap_or(defaults.declare),
            config: names(&get, "RECEIVERS_CONFIG").unwrap_or(defaults.config),
        };

        let storage = match get("STORAGE_BACKEND").as_deref() {
            None | Some("sqlite") => StorageBackend::Sqlite,
            Some("json") => StorageBackend::Json,
            Some(other) => {
                return Err(SettingsError::Invalid {
                    key: "STORAGE_BACKEND",
                    value: other.to_string(),
                    reason: "expected `json` or `sqlite`".to_string(),
                })
            }
        };

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            agent_name: get("AGENT_NAME").unwrap_or_else(|| "LANG".to_string()),
            project_link: get("PROJECT_LINK").unwrap_or_default(),
            exchange_channel_id: parse(&get, "EXCHANGE_CHANNEL_ID", None)?,
            logging_channel_id: parse(&get, "LOGGING_CHANNEL_ID", None)?,
            debug_channel_id: parse(&get, "DEBUG_CHANNEL_ID", None)?,
            lang_detect_url: required("LANG_DETECT_URL")?,
            lang_detect_api_key: get("LANG_DETECT_API_KEY"),
            watch_list_path: get("WATCH_LIST_FILE")
                .unwrap_or_else(|| "data/watch_list.json".to_string()),
            data_dir: get("DATA_DIR").unwrap_or_else(|| "data".to_string()),
            storage,
            name_ban_languages,
            text_ban_languages,
            default_name_languages,
            default_text_languages,
            high_score_threshold: parse(&get, "HIGH_SCORE_THRESHOLD", Some(3))?,
            score_per_detection: parse(&get, "SCORE_PER_DETECTION", Some(1))?,
            detection_ttl: ttl(&get, "DETECTION_TTL_SECS", 3600, 1)?,
            watch_ttl: ttl(&get, "WATCH_TTL_DAYS", 14, SECS_PER_DAY)?,
            max_concurrent_messages: parse(&get, "MAX_CONCURRENT_MESSAGES", Some(32))?,
            receivers,
        })
    }

    pub fn enforcement_policy(&self) -> EnforcementPolicy {
        EnforcementPolicy {
            name_ban_languages: self.name_ban_languages.clone(),
            text_ban_languages: self.text_ban_languages.clone(),
            high_score_threshold: self.high_score_threshold,
        }
    }

    pub fn user_state_settings(&self) -> UserStateSettings {
        UserStateSettings {
            detection_ttl: self.detection_ttl,
            watch_ttl: self.watch_ttl,
            score_per_detection: self.score_per_detection,
        }
    }

    pub fn default_group_config(&self) -> GroupConfig {
        GroupConfig::with_defaults(
            self.default_name_languages.clone(),
            self.default_text_languages.clone(),
        )
    }

    pub fn relay_identity(&self) -> RelayIdentity {
        RelayIdentity {
            agent_name: self.agent_name.clone(),
            exchange_channel_id: self.exchange_channel_id,
            receivers: self.receivers.clone(),
        }
    }
}

fn parse<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Option<T>,
) -> Result<T, SettingsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match (get(key), default) {
        (Some(value), _) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| SettingsError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(SettingsError::Missing(key)),
    }
}

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// A lifetime given as a count of `unit_secs`-second units.
fn ttl(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: u64,
    unit_secs: u64,
) -> Result<Duration, SettingsError> {
    let count: u64 = parse(get, key, Some(default))?;
    count
        .checked_mul(unit_secs)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .ok_or_else(|| SettingsError::Invalid {
            key,
            value: count.to_string(),
            reason: "duration is too large".to_string(),
        })
}

fn languages(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<BTreeSet<String>, SettingsError> {
    let raw = get(key).unwrap_or_else(|| default.to_string());
    let tags: BTreeSet<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();

    if let Some(unknown) = tags.iter().find(|t| !is_known_language(t)) {
        return Err(SettingsError::Invalid {
            key,
            value: raw.clone(),
            reason: format!("unknown language tag `{unknown}`"),
        });
    }
    Ok(tags)
}

fn names(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
    get(key).map(|raw| {
        raw.split(',')
            .map(|name| name.trim().to_uppercase())
            .filter(|name| !name.is_empty())
            .collect()
    })
}

fn join(tags: &BTreeSet<String>) -> String {
    tags.iter().cloned().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("DISCORD_TOKEN", "token"),
        ("EXCHANGE_CHANNEL_ID", "10"),
        ("LOGGING_CHANNEL_ID", "11"),
        ("DEBUG_CHANNEL_ID", "12"),
        ("LANG_DETECT_URL", "http://localhost:5000"),
    ];

    #[test]
    fn test_defaults_apply() {
        let settings = AgentSettings::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(settings.agent_name, "LANG");
        assert_eq!(settings.exchange_channel_id, 10);
        assert_eq!(settings.storage, StorageBackend::Sqlite);
        assert_eq!(settings.high_score_threshold, 3);
        assert_eq!(settings.default_text_languages, settings.text_ban_languages);
        assert_eq!(settings.watch_ttl, Duration::days(14));
        assert_eq!(settings.user_state_settings().detection_ttl, Duration::hours(1));
        assert_eq!(settings.receivers, RelayReceivers::default());
    }

    #[test]
    fn test_missing_required_fails_fast() {
        let result = AgentSettings::from_lookup(lookup(&REQUIRED[..4]));

        assert_eq!(result.unwrap_err(), SettingsError::Missing("LANG_DETECT_URL"));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("LANG_TEXT", "ar klingon"));
        assert!(matches!(
            AgentSettings::from_lookup(lookup(&pairs)),
            Err(SettingsError::Invalid { key: "LANG_TEXT", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DEBUG_CHANNEL_ID", "not-a-number"));
        pairs.remove(3);
        assert!(matches!(
            AgentSettings::from_lookup(lookup(&pairs)),
            Err(SettingsError::Invalid {
                key: "DEBUG_CHANNEL_ID",
                ..
            })
        ));
    }

    #[test]
    fn test_oversized_ttls_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("WATCH_TTL_DAYS", "999999999999999"));
        assert!(matches!(
            AgentSettings::from_lookup(lookup(&pairs)),
            Err(SettingsError::Invalid {
                key: "WATCH_TTL_DAYS",
                ..
            })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DETECTION_TTL_SECS", "18446744073709551615"));
        assert!(matches!(
            AgentSettings::from_lookup(lookup(&pairs)),
            Err(SettingsError::Invalid {
                key: "DETECTION_TTL_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_receivers_override() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("RECEIVERS_HELP", "user, warn"));

        let settings = AgentSettings::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(settings.receivers.help, vec!["USER", "WARN"]);
        assert_eq!(settings.relay_identity().exchange_channel_id, 10);
    }
}
