// Discord commands for per-group language configuration.
//
// **Notice the pattern:**
// 1. Extract primitive data from Discord types
// 2. Call the config store / relay
// 3. Reply, then schedule the reply (and the command message) for deletion
//
// This layer is THIN - lock and patch semantics live in core::group_config.

use crate::core::dispatch::{BackgroundQueue, BatchDeleter, Dispatcher};
use crate::core::group_config::{
    ConfigOutcome, ConfigPatch, ConfigRejection, GroupConfig, GroupConfigStore, LanguageSection,
};
use crate::core::moderation::ModerationService;
use crate::core::relay::{ConfigAskPayload, FleetSync, RelayPublisher};
use crate::core::settings::AgentSettings;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

// How long transient replies stay visible.
const SUCCESS_REPLY_TTL: Duration = Duration::from_secs(10);
const FAILURE_REPLY_TTL: Duration = Duration::from_secs(5);
const SHOW_REPLY_TTL: Duration = Duration::from_secs(30);

/// Request a configuration session from the CONFIG agent.
///
/// **Command syntax:** `/config LANG`
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "Agent to configure"] agent: String,
) -> Result<(), Error> {
    let data = ctx.data();
    if !agent.trim().eq_ignore_ascii_case(&data.settings.agent_name) {
        // Addressed to a sibling agent
        return Ok(());
    }

    let group_id = ctx.channel_id().get();
    let now = Utc::now();

    if !data.configs.try_acquire_lock(group_id, now) {
        return transient_reply(ctx, &ConfigRejection::LockNotHeld.to_string(), FAILURE_REPLY_TTL)
            .await;
    }

    let info = data.dispatcher.fetch_group_info(group_id).await;
    let (group_name, group_link) = match info {
        Ok(info) => (info.name, info.link),
        Err(e) => {
            tracing::warn!(group_id, error = %e, "Could not fetch group info for config session");
            (group_id.to_string(), None)
        }
    };

    let payload = ConfigAskPayload {
        project_name: data.settings.agent_name.clone(),
        project_link: data.settings.project_link.clone(),
        group_id,
        group_name,
        group_link,
        user_id: ctx.author().id.get(),
        config: data.configs.get(group_id),
        default: data.configs.defaults().clone(),
    };

    let relay = Arc::clone(&data.relay);
    data.background.submit("ask_config_session", async move {
        if let Err(e) = relay.ask_config_session(&payload).await {
            tracing::warn!(group_id = payload.group_id, error = %e, "Config session request failed");
        }
    });

    tracing::info!(group_id, user_id = ctx.author().id.get(), "Config session requested");
    send_debug(
        data,
        format!(
            "**Group:** `{}`\n**Admin:** `{}`\n**Action:** `config session requested`",
            group_id,
            ctx.author().id.get()
        ),
    );

    transient_reply(ctx, "Config session requested.", SUCCESS_REPLY_TTL).await
}

/// Change this group's language settings directly.
///
/// **Command syntax:** `/config_lang show | default | <name|text> <default|off|on|lang...>`
#[poise::command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn config_lang(
    ctx: Context<'_>,
    #[description = "show, default, name or text"] category: String,
    #[description = "default, off, on or language tags"]
    #[rest]
    args: Option<String>,
) -> Result<(), Error> {
    let data = ctx.data();
    let group_id = ctx.channel_id().get();

    if category.trim().eq_ignore_ascii_case("show") {
        let text = render_config(&data.configs.get(group_id));
        return transient_reply(ctx, &text, SHOW_REPLY_TTL).await;
    }

    let patch = match ConfigPatch::parse(&category, args.as_deref().unwrap_or_default()) {
        Ok(patch) => patch,
        Err(reason) => return transient_reply(ctx, &reason.to_string(), FAILURE_REPLY_TTL).await,
    };

    let result = apply_direct(&data.configs, group_id, &patch).await;
    match result {
        Ok(ConfigOutcome::Updated) => {
            tracing::info!(group_id, ?patch, "Group config changed by command");
            send_debug(
                data,
                format!(
                    "**Group:** `{}`\n**Admin:** `{}`\n**Action:** `config changed`\n**Change:** `{} {}`",
                    group_id,
                    ctx.author().id.get(),
                    category,
                    args.as_deref().unwrap_or_default()
                ),
            );
            transient_reply(ctx, "Configuration updated.", SUCCESS_REPLY_TTL).await
        }
        Ok(ConfigOutcome::Unchanged) => {
            transient_reply(ctx, "Nothing to change.", SUCCESS_REPLY_TTL).await
        }
        Err(reason) => transient_reply(ctx, &reason.to_string(), FAILURE_REPLY_TTL).await,
    }
}

/// Take the write lock, apply `patch`, give the lock back.
async fn apply_direct(
    configs: &GroupConfigStore,
    group_id: u64,
    patch: &ConfigPatch,
) -> Result<ConfigOutcome, ConfigRejection> {
    let acquired_at = Utc::now();
    if !configs.try_acquire_lock(group_id, acquired_at) {
        return Err(ConfigRejection::LockNotHeld);
    }
    let result = configs.apply_update(group_id, patch, acquired_at).await;
    configs.release_lock(group_id, acquired_at);
    result
}

fn render_section(title: &str, section: &LanguageSection) -> String {
    let languages = if section.list.is_empty() {
        "none".to_string()
    } else {
        section.list.iter().cloned().collect::<Vec<_>>().join(" ")
    };
    format!(
        "**{}:** `{}`{}\n**Languages:** `{}`\n",
        title,
        if section.enable { "on" } else { "off" },
        if section.default { " (default)" } else { "" },
        languages
    )
}

fn render_config(config: &GroupConfig) -> String {
    let mut text = format!(
        "**Default config:** `{}`\n",
        if config.default { "yes" } else { "no" }
    );
    text.push_str(&render_section("Name check", &config.name));
    text.push_str(&render_section("Text check", &config.text));
    text
}

/// Reply, then delete the reply (and a prefix command's own message) after `ttl`.
async fn transient_reply(ctx: Context<'_>, text: &str, ttl: Duration) -> Result<(), Error> {
    let reply = ctx.say(text).await?;
    let mut to_delete = vec![reply.message().await?.id.get()];
    if let poise::Context::Prefix(prefix) = ctx {
        to_delete.push(prefix.msg.id.get());
    }

    let data = ctx.data();
    data.background.schedule_delete(
        Arc::clone(&data.deleter),
        ctx.channel_id().get(),
        to_delete,
        ttl,
    );
    Ok(())
}

fn send_debug(data: &Data, text: String) {
    let dispatcher = Arc::clone(&data.dispatcher);
    let channel_id = data.settings.debug_channel_id;
    data.background.submit("config_debug_note", async move {
        if let Err(e) = dispatcher
            .send(channel_id, &text, &Default::default())
            .await
        {
            tracing::debug!(error = %e, "Config debug note failed");
        }
    });
}

/// Type alias for our bot's context.
/// This is what every command receives as its first parameter.
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub settings: Arc<AgentSettings>,
    pub moderation: Arc<ModerationService>,
    pub configs: Arc<GroupConfigStore>,
    pub relay: Arc<RelayPublisher>,
    pub fleet: Arc<FleetSync>,
    pub dispatcher: Arc<Dispatcher>,
    pub deleter: Arc<BatchDeleter>,
    pub background: BackgroundQueue,
    /// Bounds how many inbound messages are screened at once.
    pub inbound_limit: Arc<Semaphore>,
}
