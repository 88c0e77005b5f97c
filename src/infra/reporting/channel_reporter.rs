use crate::core::dispatch::{Dispatcher, Failure, MessageRef, SendOptions};
use crate::core::moderation::{Action, Evidence, EvidenceReporter, Message};
use async_trait::async_trait;
use std::sync::Arc;

// Keep evidence posts well under the 2000 character message limit.
const MAX_QUOTED_CHARS: usize = 1000;

/// Posts evidence to the logging channel and debug notes to the debug channel.
pub struct ChannelEvidenceReporter {
    dispatcher: Arc<Dispatcher>,
    agent_name: String,
    logging_channel_id: u64,
    debug_channel_id: u64,
}

impl ChannelEvidenceReporter {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        agent_name: impl Into<String>,
        logging_channel_id: u64,
        debug_channel_id: u64,
    ) -> Self {
        Self {
            dispatcher,
            agent_name: agent_name.into(),
            logging_channel_id,
            debug_channel_id,
        }
    }
}

fn quote(text: &str) -> String {
    let mut quoted: String = text.chars().take(MAX_QUOTED_CHARS).collect();
    if text.chars().count() > MAX_QUOTED_CHARS {
        quoted.push_str("...");
    }
    quoted
        .lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_evidence(agent_name: &str, message: &Message, evidence: &Evidence) -> String {
    let mut text = format!(
        "**Project:** `{}`\n**User ID:** `{}`\n**Level:** `{}`\n**Rule:** `{}`\n**Language:** `{}`\n",
        agent_name, message.author.user_id, evidence.level, evidence.rule, evidence.language
    );
    if let Some(score) = evidence.score {
        text.push_str(&format!("**Score:** `{score}`\n"));
    }
    if let Some(extra) = &evidence.extra {
        text.push_str(&format!("**Extra:** `{extra}`\n"));
    }
    if let Some(forwarded) = &message.forwarded_display_name {
        text.push_str(&format!("**Forwarded from:** `{forwarded}`\n"));
    }
    text.push_str(&format!("**Display name:** `{}`\n", message.author.display_name));
    if !message.text.trim().is_empty() {
        text.push_str(&quote(&message.text));
    }
    text
}

fn action_label(action: Action) -> &'static str {
    match action {
        Action::None => "none",
        Action::DeleteOnly => "delete",
        Action::BanAndDelete => "ban",
    }
}

#[async_trait]
impl EvidenceReporter for ChannelEvidenceReporter {
    async fn report(
        &self,
        message: &Message,
        evidence: &Evidence,
    ) -> Result<Option<MessageRef>, Failure> {
        let text = format_evidence(&self.agent_name, message, evidence);
        self.dispatcher
            .send(self.logging_channel_id, &text, &SendOptions::default())
            .await
    }

    async fn debug_note(
        &self,
        message: &Message,
        rule: &str,
        action: Action,
        report: Option<MessageRef>,
    ) -> Result<(), Failure> {
        let group = match self.dispatcher.fetch_group_info(message.group_id).await {
            Ok(info) => info.name,
            Err(e) => {
                tracing::debug!(group_id = message.group_id, error = %e, "Group info unavailable");
                message.group_id.to_string()
            }
        };

        let mut text = format!(
            "**Project:** `{}`\n**Group:** `{}` (`{}`)\n**User ID:** `{}`\n**Message ID:** `{}`\n**Action:** `{}`\n**Rule:** `{}`\n",
            self.agent_name,
            group,
            message.group_id,
            message.author.user_id,
            message.message_id,
            action_label(action),
            rule,
        );
        if let Some(report) = report {
            text.push_str(&format!("**Evidence:** `{}`\n", report.message_id));
        }

        self.dispatcher
            .send(self.debug_channel_id, &text, &SendOptions::default())
            .await?;
        Ok(())
    }
}
