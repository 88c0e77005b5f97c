// Batch deletion on top of the dispatcher.
//
// The platform accepts at most 100 ids per delete call. Larger requests are split
// and sent one chunk at a time. A failed chunk is logged and skipped.

use super::rate_limited_executor::{Dispatcher, Failure};
use std::sync::Arc;

/// Maximum number of message ids the platform accepts in one delete call.
pub const DELETE_BATCH_SIZE: usize = 100;

pub struct BatchDeleter {
    dispatcher: Arc<Dispatcher>,
}

impl BatchDeleter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Delete `message_ids` in chunks of at most 100.
    ///
    /// Returns the number of chunks that succeeded. Only when every chunk failed
    /// is the last failure returned.
    pub async fn delete_many(&self, group_id: u64, message_ids: &[u64]) -> Result<usize, Failure> {
        let mut succeeded = 0;
        let mut last_failure = None;

        for chunk in message_ids.chunks(DELETE_BATCH_SIZE) {
            match self.dispatcher.delete(group_id, chunk).await {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        group_id,
                        chunk_len = chunk.len(),
                        error = %e,
                        "Failed to delete message chunk"
                    );
                    last_failure = Some(e);
                }
            }
        }

        match last_failure {
            Some(failure) if succeeded == 0 => Err(failure),
            _ => Ok(succeeded),
        }
    }
}
