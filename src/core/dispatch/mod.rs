// Dispatch module - every platform-mutating call goes through here.
// The transport is a port; the executor owns the flood-wait retry policy.

pub mod background;
pub mod batch_deleter;
pub mod rate_limited_executor;
pub mod transport;

pub use background::*;
pub use batch_deleter::*;
pub use rate_limited_executor::*;
pub use transport::*;
