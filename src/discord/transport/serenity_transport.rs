// Discord implementation of the core Transport port.
//
// Translates serenity errors into the core's TransportError so the executor can
// tell a flood wait from a vanished channel. A group is a text channel; the
// owning guild is looked up once and cached for bans.

use crate::core::dispatch::{GroupInfo, MessageRef, SendOptions, Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// Serenity does not hand us the retry-after header on a surfaced 429.
const FALLBACK_RATE_LIMIT_WAIT: Duration = Duration::from_secs(2);

// Discord JSON error codes meaning the target is gone or out of reach.
const UNKNOWN_CHANNEL: isize = 10003;
const UNKNOWN_GUILD: isize = 10004;
const UNKNOWN_MEMBER: isize = 10007;
const UNKNOWN_MESSAGE: isize = 10008;
const UNKNOWN_USER: isize = 10013;
const MISSING_ACCESS: isize = 50001;

/// Map an unsuccessful HTTP response to a transport error.
fn classify_status(status: u16, code: isize, detail: String) -> TransportError {
    match (status, code) {
        (429, _) => TransportError::RateLimited {
            wait: FALLBACK_RATE_LIMIT_WAIT,
        },
        (404, _)
        | (
            _,
            UNKNOWN_CHANNEL | UNKNOWN_GUILD | UNKNOWN_MEMBER | UNKNOWN_MESSAGE | UNKNOWN_USER
            | MISSING_ACCESS,
        ) => TransportError::PeerUnavailable(detail),
        _ => TransportError::Platform(detail),
    }
}

fn classify(err: serenity::Error) -> TransportError {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = &err {
        return classify_status(
            response.status_code.as_u16(),
            response.error.code,
            response.error.message.clone(),
        );
    }
    TransportError::Platform(err.to_string())
}

pub struct SerenityTransport {
    http: Arc<serenity::Http>,
    /// Channel id -> owning guild id.
    guilds: DashMap<u64, u64>,
}

impl SerenityTransport {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self {
            http,
            guilds: DashMap::new(),
        }
    }

    async fn guild_channel(&self, group_id: u64) -> Result<serenity::GuildChannel, TransportError> {
        let channel = self
            .http
            .get_channel(serenity::ChannelId::new(group_id))
            .await
            .map_err(classify)?;

        let channel = channel.guild().ok_or_else(|| {
            TransportError::PeerUnavailable(format!("channel {group_id} is not a guild channel"))
        })?;
        self.guilds.insert(group_id, channel.guild_id.get());
        Ok(channel)
    }

    async fn guild_of(&self, group_id: u64) -> Result<serenity::GuildId, TransportError> {
        if let Some(guild_id) = self.guilds.get(&group_id) {
            return Ok(serenity::GuildId::new(*guild_id));
        }
        Ok(self.guild_channel(group_id).await?.guild_id)
    }
}

#[async_trait]
impl Transport for SerenityTransport {
    async fn send_message(
        &self,
        group_id: u64,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageRef, TransportError> {
        let channel_id = serenity::ChannelId::new(group_id);

        let builder = match &options.attachment_name {
            Some(name) => serenity::CreateMessage::new().add_file(serenity::CreateAttachment::bytes(
                text.as_bytes().to_vec(),
                name.clone(),
            )),
            None => serenity::CreateMessage::new().content(text),
        };

        let sent = channel_id
            .send_message(&self.http, builder)
            .await
            .map_err(classify)?;

        Ok(MessageRef {
            group_id,
            message_id: sent.id.get(),
        })
    }

    async fn delete_messages(
        &self,
        group_id: u64,
        message_ids: &[u64],
    ) -> Result<usize, TransportError> {
        let channel_id = serenity::ChannelId::new(group_id);

        match message_ids {
            [] => Ok(0),
            [single] => {
                channel_id
                    .delete_message(&self.http, serenity::MessageId::new(*single))
                    .await
                    .map_err(classify)?;
                Ok(1)
            }
            many => {
                let map = json!({ "messages": many.iter().map(|id| id.to_string()).collect::<Vec<_>>() });
                self.http
                    .delete_messages(channel_id, &map, None)
                    .await
                    .map_err(classify)?;
                Ok(many.len())
            }
        }
    }

    async fn ban_member(&self, group_id: u64, user_id: u64) -> Result<bool, TransportError> {
        let guild_id = self.guild_of(group_id).await?;
        guild_id
            .ban(&self.http, serenity::UserId::new(user_id), 0)
            .await
            .map_err(classify)?;
        Ok(true)
    }

    async fn fetch_group_info(&self, group_id: u64) -> Result<GroupInfo, TransportError> {
        let channel = self.guild_channel(group_id).await?;
        Ok(GroupInfo {
            name: channel.name.clone(),
            link: Some(format!(
                "https://discord.com/channels/{}/{}",
                channel.guild_id.get(),
                group_id
            )),
        })
    }
}
