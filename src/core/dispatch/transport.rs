// Transport port - the opaque platform capability.
//
// The core never talks to Discord directly. The discord layer provides an
// implementation; tests provide scripted mocks.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a single platform call can raise.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    /// The platform asked us to back off for `wait` before retrying.
    #[error("Rate limited, retry after {wait:?}")]
    RateLimited { wait: Duration },

    /// The chat or user is gone or no longer reachable.
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Anything else the platform reported.
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Reference to a message the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub group_id: u64,
    pub message_id: u64,
}

/// Extra knobs for outgoing messages.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Upload the text as a file with this name instead of inline content.
    pub attachment_name: Option<String>,
}

impl SendOptions {
    pub fn attachment(name: impl Into<String>) -> Self {
        Self {
            attachment_name: Some(name.into()),
        }
    }
}

/// Display information about a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub name: String,
    pub link: Option<String>,
}

/// The platform operations the agent needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message to a group.
    async fn send_message(
        &self,
        group_id: u64,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageRef, TransportError>;

    /// Delete up to 100 messages in one call. Returns how many the platform removed.
    async fn delete_messages(
        &self,
        group_id: u64,
        message_ids: &[u64],
    ) -> Result<usize, TransportError>;

    /// Ban a member from the group.
    async fn ban_member(&self, group_id: u64, user_id: u64) -> Result<bool, TransportError>;

    /// Fetch the group's display name and public link.
    async fn fetch_group_info(&self, group_id: u64) -> Result<GroupInfo, TransportError>;
}
