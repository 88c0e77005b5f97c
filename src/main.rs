// This is the entry point of the language moderation agent.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (storage, classifier, watch list)
// - `discord/` = Discord-specific adapters (commands, events, transport)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::dispatch::{BackgroundQueue, BatchDeleter, Dispatcher, RateLimitedExecutor};
use crate::core::group_config::GroupConfigStore;
use crate::core::moderation::{
    DeclaredMessages, MessageScreen, ModerationPorts, ModerationService, UserStateStore,
};
use crate::core::persistence::SnapshotStore;
use crate::core::relay::{FleetSync, RelayPublisher};
use crate::core::settings::{AgentSettings, StorageBackend};
use crate::discord::moderation::handle_message;
use crate::discord::transport::SerenityTransport;
use crate::discord::{Data, Error};
use crate::infra::detection::HttpLanguageDetector;
use crate::infra::persistence::{JsonSnapshotStore, SqliteSnapshotStore};
use crate::infra::reporting::ChannelEvidenceReporter;
use crate::infra::watchlist::RegexWatchList;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const DAILY_RESET_PERIOD: Duration = Duration::from_secs(60 * 60 * 24);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        if let Err(e) = handle_message(ctx, new_message, data).await {
            tracing::error!(
                message_id = new_message.id.get(),
                "Error handling message: {}",
                e
            );
        }
    }

    Ok(())
}

/// Pick the snapshot backend named in the settings.
async fn open_snapshots(settings: &AgentSettings) -> anyhow::Result<Arc<dyn SnapshotStore>> {
    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("Failed to create data directory {}", settings.data_dir))?;

    let store: Arc<dyn SnapshotStore> = match settings.storage {
        StorageBackend::Json => Arc::new(
            JsonSnapshotStore::new(&settings.data_dir)
                .context("Failed to open JSON snapshot directory")?,
        ),
        StorageBackend::Sqlite => {
            let path = format!("{}/lang.db", settings.data_dir);
            Arc::new(
                SqliteSnapshotStore::connect(&path)
                    .await
                    .with_context(|| format!("Failed to open snapshot database {}", path))?,
            )
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let settings = Arc::new(
        AgentSettings::from_env()
            .expect("Invalid configuration! Check the environment variables in your .env file."),
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Stores come first: they only need the snapshot backend.
    // Everything that talks to Discord is wired in `setup`, once we have `Http`.

    let snapshots = open_snapshots(&settings)
        .await
        .expect("Failed to initialize snapshot storage");

    let users = Arc::new(
        UserStateStore::load(settings.user_state_settings(), Arc::clone(&snapshots))
            .await
            .expect("Failed to load user state"),
    );
    let configs = Arc::new(
        GroupConfigStore::load(settings.default_group_config(), Arc::clone(&snapshots))
            .await
            .expect("Failed to load group configs"),
    );
    let declared = Arc::new(DeclaredMessages::new());

    let watch_list = Arc::new(
        RegexWatchList::from_file(&settings.watch_list_path).expect("Failed to load watch list"),
    );
    let detector = Arc::new(HttpLanguageDetector::new(
        settings.lang_detect_url.clone(),
        settings.lang_detect_api_key.clone(),
    ));
    let background = BackgroundQueue::new();

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let token = settings.discord_token.clone();
    let shutdown_background = background.clone();
    let shutdown_users = Arc::clone(&users);
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("/".into()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!(agent = %settings.agent_name, "Agent is starting up");

                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                let transport = Arc::new(SerenityTransport::new(ctx.http.clone()));
                let dispatcher = Arc::new(Dispatcher::new(
                    transport,
                    RateLimitedExecutor::default(),
                ));
                let deleter = Arc::new(BatchDeleter::new(Arc::clone(&dispatcher)));

                let relay = Arc::new(RelayPublisher::new(
                    Arc::clone(&dispatcher),
                    settings.relay_identity(),
                ));
                let reporter = Arc::new(ChannelEvidenceReporter::new(
                    Arc::clone(&dispatcher),
                    settings.agent_name.clone(),
                    settings.logging_channel_id,
                    settings.debug_channel_id,
                ));

                let moderation = Arc::new(ModerationService::new(
                    Arc::clone(&users),
                    Arc::clone(&configs),
                    Arc::clone(&declared),
                    settings.enforcement_policy(),
                    ModerationPorts {
                        dispatcher: Arc::clone(&dispatcher),
                        background: background.clone(),
                        relay: Arc::clone(&relay),
                        reporter,
                        watch_list,
                        screen: MessageScreen::new(detector),
                    },
                ));
                let fleet = Arc::new(FleetSync::new(
                    settings.agent_name.clone(),
                    Arc::clone(&users),
                    Arc::clone(&configs),
                    Arc::clone(&declared),
                ));

                // Daily reset of per-group records. The first tick fires immediately; skip it.
                let daily = Arc::clone(&moderation);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(DAILY_RESET_PERIOD);
                    interval.tick().await;
                    loop {
                        interval.tick().await;
                        tracing::info!("Daily reset starting");
                        daily.daily_reset().await;
                    }
                });

                tracing::info!("Agent is ready");

                Ok(Data {
                    inbound_limit: Arc::new(tokio::sync::Semaphore::new(
                        settings.max_concurrent_messages,
                    )),
                    settings,
                    moderation,
                    configs,
                    relay,
                    fleet,
                    dispatcher,
                    deleter,
                    background,
                })
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    // Stop the gateway on Ctrl+C so pending background work can finish
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shard_manager.shutdown_all().await;
        }
    });

    client.start().await.expect("Error running agent");

    tracing::info!(
        pending = shutdown_background.pending(),
        "Waiting for background work"
    );
    shutdown_background.wait_idle().await;
    if let Err(e) = shutdown_users.persist().await {
        tracing::error!("Failed to persist user state on shutdown: {}", e);
    }
}
