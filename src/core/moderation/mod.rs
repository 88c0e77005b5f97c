// Core moderation module - language enforcement business logic.
// Following the same pattern as the group config and relay modules.

pub mod decision_engine;
pub mod declared_messages;
pub mod moderation_models;
pub mod moderation_service;
pub mod screening;
pub mod user_state_store;

pub use declared_messages::*;
pub use moderation_models::*;
pub use moderation_service::*;
pub use screening::*;
pub use user_state_store::*;
