// Fleet relay: outbound announcements and inbound synchronization.

pub mod fleet_sync;
pub mod relay_models;
pub mod relay_publisher;

pub use fleet_sync::*;
pub use relay_models::*;
pub use relay_publisher::*;
