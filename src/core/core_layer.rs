// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "dispatch/mod.rs"]
pub mod dispatch;

#[path = "group_config/mod.rs"]
pub mod group_config;

#[path = "moderation/mod.rs"]
pub mod moderation;

#[path = "persistence/snapshot_store.rs"]
pub mod persistence;

#[path = "relay/mod.rs"]
pub mod relay;

#[path = "settings/mod.rs"]
pub mod settings;
