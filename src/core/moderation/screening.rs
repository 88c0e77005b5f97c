// Inbound message screening.
//
// Turns a raw message into a `DetectionContext` by asking the external language
// classifier about the author's name and the message text, filtered through the
// group's configuration. The name check runs first and wins.

use super::moderation_models::{DetectionContext, Message, TriggerKind};
use crate::core::group_config::GroupConfig;
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// COLLABORATOR PORTS
// ============================================================================

/// The external language classifier.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Language tag of `text`, or `None` if it could not be classified.
    async fn detect(&self, text: &str) -> Option<String>;
}

/// The name watch-list matcher.
pub trait NameWatchList: Send + Sync {
    /// Name matches one of the watch patterns.
    fn is_watched_name(&self, name: &str) -> bool;

    /// Name is explicitly excepted from the watch patterns.
    fn is_excepted(&self, name: &str) -> bool;
}

/// Display name or forwarded name hits the watch list, and neither is excepted.
pub fn name_watch_hit(watch_list: &dyn NameWatchList, message: &Message) -> bool {
    let names: Vec<&str> = std::iter::once(message.author.display_name.as_str())
        .chain(message.forwarded_display_name.as_deref())
        .filter(|name| !name.trim().is_empty())
        .collect();

    names.iter().any(|name| watch_list.is_watched_name(name))
        && !names.iter().any(|name| watch_list.is_excepted(name))
}

// ============================================================================
// SCREEN
// ============================================================================

pub struct MessageScreen {
    detector: Arc<dyn LanguageDetector>,
}

impl MessageScreen {
    pub fn new(detector: Arc<dyn LanguageDetector>) -> Self {
        Self { detector }
    }

    /// Classify `message` against `config`. `None` means nothing to enforce.
    pub async fn screen(&self, message: &Message, config: &GroupConfig) -> Option<DetectionContext> {
        if config.name.enable {
            let names = std::iter::once(message.author.display_name.as_str())
                .chain(message.forwarded_display_name.as_deref());
            for name in names {
                if let Some(language) = self.detect_listed(name, &config.name.list).await {
                    return Some(DetectionContext::new(TriggerKind::Name, language));
                }
            }
        }

        if config.text.enable {
            if let Some(language) = self.detect_listed(&message.text, &config.text.list).await {
                return Some(DetectionContext::new(TriggerKind::Text, language));
            }
        }

        None
    }

    async fn detect_listed(
        &self,
        text: &str,
        listed: &std::collections::BTreeSet<String>,
    ) -> Option<String> {
        if text.trim().is_empty() || listed.is_empty() {
            return None;
        }
        let language = self.detector.detect(text).await?;
        listed.contains(&language).then_some(language)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::moderation::Author;
    use std::collections::{BTreeSet, HashMap};

    /// Detector answering from a fixed text -> language table.
    #[derive(Default)]
    pub(crate) struct TableDetector {
        pub answers: HashMap<String, String>,
    }

    impl TableDetector {
        pub fn with(pairs: &[(&str, &str)]) -> Self {
            Self {
                answers: pairs
                    .iter()
                    .map(|(text, lang)| (text.to_string(), lang.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl LanguageDetector for TableDetector {
        async fn detect(&self, text: &str) -> Option<String> {
            self.answers.get(text).cloned()
        }
    }

    /// Watch list with literal names.
    #[derive(Default)]
    pub(crate) struct FixedWatchList {
        pub watched: Vec<String>,
        pub excepted: Vec<String>,
    }

    impl NameWatchList for FixedWatchList {
        fn is_watched_name(&self, name: &str) -> bool {
            self.watched.iter().any(|w| w == name)
        }

        fn is_excepted(&self, name: &str) -> bool {
            self.excepted.iter().any(|e| e == name)
        }
    }

    pub(crate) fn message(display_name: &str, text: &str) -> Message {
        Message {
            group_id: 1,
            message_id: 100,
            author: Author {
                user_id: 7,
                display_name: display_name.to_string(),
                privileged: false,
            },
            text: text.to_string(),
            forwarded_display_name: None,
        }
    }

    fn config() -> GroupConfig {
        GroupConfig::with_defaults(
            BTreeSet::from(["ar".to_string()]),
            BTreeSet::from(["ru".to_string()]),
        )
    }

    #[tokio::test]
    async fn test_name_check_wins_over_text() {
        let screen = MessageScreen::new(Arc::new(TableDetector::with(&[
            ("محمد", "ar"),
            ("привет", "ru"),
        ])));

        let context = screen.screen(&message("محمد", "привет"), &config()).await;

        assert_eq!(context, Some(DetectionContext::new(TriggerKind::Name, "ar")));
    }

    #[tokio::test]
    async fn test_disabled_section_is_skipped() {
        let screen = MessageScreen::new(Arc::new(TableDetector::with(&[
            ("محمد", "ar"),
            ("привет", "ru"),
        ])));
        let mut config = config();
        config.name.enable = false;

        let context = screen.screen(&message("محمد", "привет"), &config).await;

        assert_eq!(context, Some(DetectionContext::new(TriggerKind::Text, "ru")));
    }

    #[tokio::test]
    async fn test_unlisted_language_is_ignored() {
        let screen = MessageScreen::new(Arc::new(TableDetector::with(&[("hello", "en")])));

        assert_eq!(screen.screen(&message("bob", "hello"), &config()).await, None);
    }

    #[test]
    fn test_forwarded_name_counts_and_exception_blocks() {
        let watch_list = FixedWatchList {
            watched: vec!["spam shop".to_string()],
            excepted: vec!["news".to_string()],
        };
        let mut forwarded = message("bob", "hi");
        forwarded.forwarded_display_name = Some("spam shop".to_string());
        assert!(name_watch_hit(&watch_list, &forwarded));

        let mut excepted = message("news", "hi");
        excepted.forwarded_display_name = Some("spam shop".to_string());
        assert!(!name_watch_hit(&watch_list, &excepted));

        assert!(!name_watch_hit(&watch_list, &message("bob", "hi")));
    }
}
