// Discord-specific message handling - translates serenity messages into core
// messages and hands them to the moderation service.
//
// Exchange-channel traffic is routed to the fleet sync instead. Sibling agents
// are bots, so the bot filter only applies to ordinary group messages.

use crate::core::moderation::{Author, Message};
use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

const RELAY_ATTACHMENT_SUFFIX: &str = ".json";

/// Route one inbound Discord message.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    if msg.channel_id.get() == data.settings.exchange_channel_id {
        return handle_exchange_message(msg, data).await;
    }

    // Skip bots (including our own reports) and DMs
    if msg.author.bot {
        return Ok(());
    }
    let Some(guild_id) = msg.guild_id else {
        return Ok(());
    };

    let message = to_core_message(ctx, msg, guild_id);

    // Bound how many messages are screened concurrently
    let _permit = data.inbound_limit.acquire().await?;
    if data.moderation.process_message(&message).await {
        tracing::info!(
            group_id = message.group_id,
            message_id = message.message_id,
            user_id = message.author.user_id,
            "Message enforced"
        );
    }

    Ok(())
}

/// Feed a relay envelope (inline or as a JSON attachment) to the fleet sync.
///
/// Our own envelopes come back here too; the sync drops them by sender name.
async fn handle_exchange_message(msg: &serenity::Message, data: &Data) -> Result<(), Error> {
    let attachment = msg
        .attachments
        .iter()
        .find(|a| a.filename.ends_with(RELAY_ATTACHMENT_SUFFIX));

    let raw = match attachment {
        Some(attachment) => match attachment.download().await {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::warn!(
                    message_id = msg.id.get(),
                    error = %e,
                    "Failed to download relay attachment"
                );
                return Ok(());
            }
        },
        None => msg.content.clone(),
    };

    data.fleet.handle_raw(&raw).await;
    Ok(())
}

/// Extract what the core needs from a serenity message.
fn to_core_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: serenity::GuildId,
) -> Message {
    let nick = msg.member.as_ref().and_then(|m| m.nick.clone());
    let role_ids: Vec<serenity::RoleId> = msg
        .member
        .as_ref()
        .map(|m| m.roles.clone())
        .unwrap_or_default();

    Message {
        group_id: msg.channel_id.get(),
        message_id: msg.id.get(),
        author: Author {
            user_id: msg.author.id.get(),
            display_name: display_name(
                nick.as_deref(),
                msg.author.global_name.as_deref(),
                &msg.author.name,
            ),
            privileged: is_privileged(ctx, guild_id, msg.author.id, &role_ids),
        },
        text: msg.content.clone(),
        // serenity does not expose the author of a forwarded message
        forwarded_display_name: None,
    }
}

/// Nickname, then global name, then username.
fn display_name(nick: Option<&str>, global_name: Option<&str>, username: &str) -> String {
    [nick, global_name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or(username)
        .to_string()
}

/// Guild owner, or holds a role that may administer or manage messages.
///
/// Best-effort using the cache. If the guild is not cached, assume not privileged.
fn is_privileged(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    role_ids: &[serenity::RoleId],
) -> bool {
    // Keep the cache ref inside this scope; it must not be held across an await
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return false;
    };
    if guild.owner_id == user_id {
        return true;
    }
    role_ids
        .iter()
        .filter_map(|id| guild.roles.get(id))
        .any(|role| role.permissions.administrator() || role.permissions.manage_messages())
}
