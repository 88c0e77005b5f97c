use crate::core::moderation::NameWatchList;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchListError {
    #[error("Failed to read watch list: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed watch list: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bad watch pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// On-disk shape of the watch list file.
#[derive(Debug, Default, Deserialize)]
struct WatchListFile {
    #[serde(default)]
    patterns: Vec<String>,
    #[serde(default)]
    exceptions: Vec<String>,
}

/// Name watch list built from case-insensitive regex patterns.
#[derive(Debug, Default)]
pub struct RegexWatchList {
    patterns: Vec<Regex>,
    /// Exact names that never count as a hit.
    exceptions: HashSet<String>,
}

impl RegexWatchList {
    pub fn new(patterns: &[String], exceptions: &[String]) -> Result<Self, WatchListError> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            exceptions: exceptions.iter().cloned().collect(),
        })
    }

    /// Load `{"patterns": [...], "exceptions": [...]}`. A missing file means an empty list.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchListError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!(path = %path.display(), "No watch list file, name watch disabled");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let file: WatchListFile = serde_json::from_str(&raw)?;
        let list = Self::new(&file.patterns, &file.exceptions)?;
        tracing::info!(
            patterns = list.patterns.len(),
            exceptions = list.exceptions.len(),
            "Loaded name watch list"
        );
        Ok(list)
    }
}

impl NameWatchList for RegexWatchList {
    fn is_watched_name(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }

    fn is_excepted(&self, name: &str) -> bool {
        self.exceptions.contains(name)
    }
}
