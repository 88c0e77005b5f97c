// Flood-controlled execution of platform calls.
//
// Every delete, ban, send and fetch goes through `RateLimitedExecutor::execute`.
// A rate-limit signal suspends the caller for the mandated time and retries the
// very same operation, with no attempt cap. Terminal errors come back as a typed
// `Failure` instead of bubbling up as panics or raw platform errors.

use super::transport::{GroupInfo, MessageRef, SendOptions, Transport, TransportError};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Why a dispatched operation gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Chat or user is no longer reachable. Not retried.
    PeerUnavailable,
    /// Any other platform error.
    Unknown,
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{operation} failed ({kind:?}): {detail}")]
pub struct Failure {
    pub kind: FailureKind,
    pub operation: String,
    pub detail: String,
}

impl Failure {
    pub fn peer_unavailable(operation: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::PeerUnavailable,
            operation: operation.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unknown(operation: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Unknown,
            operation: operation.to_string(),
            detail: detail.into(),
        }
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Retry policy for platform flood waits.
#[derive(Debug, Clone)]
pub struct RateLimitedExecutor {
    /// Upper bound of the random padding added on top of each mandated wait.
    max_jitter: Duration,
}

impl Default for RateLimitedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl RateLimitedExecutor {
    pub fn new(max_jitter: Duration) -> Self {
        Self { max_jitter }
    }

    /// Executor that waits exactly what the platform asks for.
    #[cfg(test)]
    pub fn without_jitter() -> Self {
        Self::new(Duration::ZERO)
    }

    fn jitter(&self) -> Duration {
        let max = self.max_jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }

    /// Run `op` until it returns something other than a rate-limit signal.
    ///
    /// `op` is called again for every retry so the identical request is re-issued.
    /// May suspend the caller for arbitrarily long.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, Failure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "Operation succeeded after flood wait");
                    }
                    return Ok(value);
                }
                Err(TransportError::RateLimited { wait }) => {
                    let pause = wait + self.jitter();
                    tracing::warn!(
                        operation,
                        attempt,
                        wait_ms = pause.as_millis() as u64,
                        "Rate limited, waiting before retry"
                    );
                    tokio::time::sleep(pause).await;
                }
                Err(TransportError::PeerUnavailable(detail)) => {
                    tracing::info!(operation, %detail, "Peer unavailable, giving up");
                    return Err(Failure::peer_unavailable(operation, detail));
                }
                Err(TransportError::Platform(detail)) => {
                    tracing::warn!(operation, %detail, "Platform call failed");
                    return Err(Failure::unknown(operation, detail));
                }
            }
        }
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// The transport with every call routed through the executor.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    executor: RateLimitedExecutor,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, executor: RateLimitedExecutor) -> Self {
        Self {
            transport,
            executor,
        }
    }

    /// Send a message. Blank text is skipped and yields `Ok(None)`.
    pub async fn send(
        &self,
        group_id: u64,
        text: &str,
        options: &SendOptions,
    ) -> Result<Option<MessageRef>, Failure> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let sent = self
            .executor
            .execute("send_message", || {
                self.transport.send_message(group_id, text, options)
            })
            .await?;
        Ok(Some(sent))
    }

    /// Delete a single batch (at most 100 ids). Use `BatchDeleter` for more.
    pub async fn delete(&self, group_id: u64, message_ids: &[u64]) -> Result<usize, Failure> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        self.executor
            .execute("delete_messages", || {
                self.transport.delete_messages(group_id, message_ids)
            })
            .await
    }

    pub async fn ban(&self, group_id: u64, user_id: u64) -> Result<bool, Failure> {
        self.executor
            .execute("ban_member", || self.transport.ban_member(group_id, user_id))
            .await
    }

    pub async fn fetch_group_info(&self, group_id: u64) -> Result<GroupInfo, Failure> {
        self.executor
            .execute("fetch_group_info", || {
                self.transport.fetch_group_info(group_id)
            })
            .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
