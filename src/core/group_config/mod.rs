// Per-group language configuration and its write lock.

pub mod group_config_models;
pub mod group_config_store;

pub use group_config_models::*;
pub use group_config_store::*;
