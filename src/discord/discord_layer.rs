// Discord layer - commands, event handlers and the platform transport.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "moderation/message_handler.rs"]
pub mod moderation;

#[path = "transport/serenity_transport.rs"]
pub mod transport;

// Re-export command types for convenience
pub use commands::group_config::{Data, Error};
