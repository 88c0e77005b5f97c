// Fire-and-forget work submission.
//
// Bans, delayed deletions and relay announcements are handed to this queue so the
// decision path never waits on them. Submitted work is never cancelled; it runs to
// completion on the tokio runtime even if the submitter is long gone.

use super::batch_deleter::BatchDeleter;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct BackgroundQueue {
    inflight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Decrements the in-flight counter even if the task panics.
struct InflightGuard {
    inflight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl BackgroundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the background. The caller does not wait for it.
    pub fn submit<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        let guard = InflightGuard {
            inflight: Arc::clone(&self.inflight),
            idle: Arc::clone(&self.idle),
        };

        tokio::spawn(async move {
            let _guard = guard;
            tracing::trace!(task = label, "Background task started");
            task.await;
            tracing::trace!(task = label, "Background task finished");
        });
    }

    /// Run `task` after `delay`.
    pub fn submit_after<F>(&self, label: &'static str, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit(label, async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }

    /// Delete messages after `delay` (transient replies, report messages).
    pub fn schedule_delete(
        &self,
        deleter: Arc<BatchDeleter>,
        group_id: u64,
        message_ids: Vec<u64>,
        delay: Duration,
    ) {
        self.submit_after("scheduled_delete", delay, async move {
            if let Err(e) = deleter.delete_many(group_id, &message_ids).await {
                tracing::warn!(group_id, error = %e, "Scheduled delete failed");
            }
        });
    }

    /// Number of submitted tasks that have not finished yet.
    pub fn pending(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Wait until every submitted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
