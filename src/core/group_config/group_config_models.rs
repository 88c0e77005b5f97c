// Group configuration models.
//
// Each group carries its own language lists for the name and text checks. Patches
// come in as textual commands and are validated against a fixed schema before
// the store touches anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Language tags the classifier can produce, plus the two special signal classes.
pub const KNOWN_LANGUAGE_TAGS: [&str; 57] = [
    "af", "ar", "bg", "bn", "ca", "cs", "cy", "da", "de", "el", "en", "es", "et", "fa", "fi",
    "fr", "gu", "he", "hi", "hr", "hu", "id", "it", "ja", "kn", "ko", "lt", "lv", "mk", "ml",
    "mr", "ne", "nl", "no", "pa", "pl", "pt", "ro", "ru", "sk", "sl", "so", "sq", "sv", "sw",
    "ta", "te", "th", "tl", "tr", "uk", "ur", "vi", "zh-cn", "zh-tw", "spc", "spe",
];

pub fn is_known_language(tag: &str) -> bool {
    KNOWN_LANGUAGE_TAGS.contains(&tag)
}

/// One check (name or text) of a group's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSection {
    /// Still the agent default.
    pub default: bool,
    pub enable: bool,
    pub list: BTreeSet<String>,
}

/// Per-group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// The whole config is still the agent default.
    pub default: bool,
    pub name: LanguageSection,
    pub text: LanguageSection,
    /// Start of the current write window. Never decreases while a session is open.
    pub lock_until: Option<DateTime<Utc>>,
}

impl GroupConfig {
    /// Fresh default config built from the agent's default lists.
    pub fn with_defaults(name_list: BTreeSet<String>, text_list: BTreeSet<String>) -> Self {
        Self {
            default: true,
            name: LanguageSection {
                default: true,
                enable: true,
                list: name_list,
            },
            text: LanguageSection {
                default: true,
                enable: true,
                list: text_list,
            },
            lock_until: None,
        }
    }

    pub fn section(&self, category: ConfigCategory) -> &LanguageSection {
        match category {
            ConfigCategory::Name => &self.name,
            ConfigCategory::Text => &self.text,
        }
    }

    fn section_mut(&mut self, category: ConfigCategory) -> &mut LanguageSection {
        match category {
            ConfigCategory::Name => &mut self.name,
            ConfigCategory::Text => &mut self.text,
        }
    }

    /// Settings without the lock, for equality checks and sharing.
    pub fn settings_eq(&self, other: &GroupConfig) -> bool {
        self.default == other.default && self.name == other.name && self.text == other.text
    }

    /// Apply a validated patch in place. `defaults` supplies the reset values.
    pub(crate) fn apply(&mut self, patch: &ConfigPatch, defaults: &GroupConfig) {
        match patch {
            ConfigPatch::ResetAll => {
                if !self.default {
                    let lock_until = self.lock_until;
                    *self = defaults.clone();
                    self.lock_until = lock_until;
                }
            }
            ConfigPatch::Section { category, command } => {
                let section = self.section_mut(*category);
                match command {
                    SectionCommand::Default => {
                        *section = defaults.section(*category).clone();
                    }
                    SectionCommand::Off => {
                        section.default = false;
                        section.enable = false;
                    }
                    SectionCommand::On => {
                        section.default = false;
                        section.enable = true;
                    }
                    SectionCommand::Languages(list) => {
                        section.default = false;
                        section.list = list.clone();
                    }
                }
                self.default = false;
            }
        }
    }
}

/// Which check a patch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigCategory {
    Name,
    Text,
}

impl std::fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigCategory::Name => write!(f, "name"),
            ConfigCategory::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionCommand {
    Default,
    Off,
    On,
    Languages(BTreeSet<String>),
}

/// A validated configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPatch {
    /// Reset the whole group config to the agent default.
    ResetAll,
    Section {
        category: ConfigCategory,
        command: SectionCommand,
    },
}

/// Why a patch was refused. The message is shown to the administrator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigRejection {
    #[error("Configuration is currently locked")]
    LockNotHeld,
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Missing sub-command")]
    MissingSubCommand,
    #[error("Unknown sub-command: {0}")]
    UnknownSubCommand(String),
    #[error("Unknown language tags: {}", .0.join(", "))]
    UnknownLanguageTags(Vec<String>),
}

impl ConfigPatch {
    /// Parse `<category> <sub-command...>`.
    ///
    /// `category` is `default`, `name` or `text`; the sub-command is `default`,
    /// `off`, `on` or a space separated list of known language tags.
    pub fn parse(category: &str, args: &str) -> Result<Self, ConfigRejection> {
        let category = match category.trim().to_lowercase().as_str() {
            "default" => return Ok(ConfigPatch::ResetAll),
            "name" => ConfigCategory::Name,
            "text" => ConfigCategory::Text,
            other => return Err(ConfigRejection::UnknownCategory(other.to_string())),
        };

        let tokens: Vec<String> = args
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let command = match tokens.as_slice() {
            [] => return Err(ConfigRejection::MissingSubCommand),
            [single] if single == "default" => SectionCommand::Default,
            [single] if single == "off" => SectionCommand::Off,
            [single] if single == "on" => SectionCommand::On,
            [single] if !is_known_language(single) => {
                return Err(ConfigRejection::UnknownSubCommand(single.clone()))
            }
            tags => {
                let unknown: Vec<String> = tags
                    .iter()
                    .filter(|t| !is_known_language(t))
                    .cloned()
                    .collect();
                if !unknown.is_empty() {
                    return Err(ConfigRejection::UnknownLanguageTags(unknown));
                }
                SectionCommand::Languages(tags.iter().cloned().collect())
            }
        };

        Ok(ConfigPatch::Section { category, command })
    }
}

/// Result of an accepted patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOutcome {
    Updated,
    /// Valid patch that left the config as it was.
    Unchanged,
}

impl ConfigOutcome {
    pub fn applied(self) -> bool {
        self == ConfigOutcome::Updated
    }
}
