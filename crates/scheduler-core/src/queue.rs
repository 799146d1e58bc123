//! Per-backend FIFO job queue, memory-bounded, with blocking take.
//!
//! A job is in at most one queue at a time; once `take` returns it, it is
//! never re-enqueued (invariant I2). Ordering is FIFO within one backend
//! only — across backends nothing is promised (SPEC_FULL §4.2).

use crate::model::QueueEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Ok,
    RejectMemory,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TakeOutcome<T> {
    Entry(T),
    Cancelled,
}

struct Inner {
    backends: HashMap<String, VecDeque<QueueEntry>>,
    waiters: HashMap<String, Arc<Notify>>,
    total_bytes: u64,
}

impl Inner {
    fn notify_for(&mut self, backend: &str) -> Arc<Notify> {
        self.waiters
            .entry(backend.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

/// Memory-bounded, per-backend FIFO of admitted jobs.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Mutex<Inner>>,
    max_queue_bytes: u64,
}

impl JobQueue {
    pub fn new(max_queue_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                backends: HashMap::new(),
                waiters: HashMap::new(),
                total_bytes: 0,
            })),
            max_queue_bytes,
        }
    }

    pub async fn enqueue(&self, entry: QueueEntry) -> EnqueueOutcome {
        let mut inner = self.inner.lock().await;
        if inner.total_bytes + entry.program_size_bytes > self.max_queue_bytes {
            return EnqueueOutcome::RejectMemory;
        }

        inner.total_bytes += entry.program_size_bytes;
        let notify = inner.notify_for(&entry.backend_canonical);
        inner
            .backends
            .entry(entry.backend_canonical.clone())
            .or_default()
            .push_back(entry);
        notify.notify_one();
        EnqueueOutcome::Ok
    }

    /// Blocks until an entry is available for `backend_canonical` or
    /// `cancel` fires. Cancellation is checked on entry and on every wake.
    pub async fn take(
        &self,
        backend_canonical: &str,
        cancel: &CancellationToken,
    ) -> TakeOutcome<QueueEntry> {
        loop {
            if cancel.is_cancelled() {
                return TakeOutcome::Cancelled;
            }

            let notify = {
                let mut inner = self.inner.lock().await;
                if let Some(entry) = inner
                    .backends
                    .get_mut(backend_canonical)
                    .and_then(VecDeque::pop_front)
                {
                    inner.total_bytes = inner.total_bytes.saturating_sub(entry.program_size_bytes);
                    return TakeOutcome::Entry(entry);
                }
                inner.notify_for(backend_canonical)
            };

            tokio::select! {
                _ = notify.notified() => continue,
                _ = cancel.cancelled() => return TakeOutcome::Cancelled,
            }
        }
    }

    /// Best-effort removal by id, used for `CancelJob` on a queued job.
    /// Returns whether the entry was present.
    pub async fn drop_job(&self, job_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        for queue in inner.backends.values_mut() {
            if let Some(pos) = queue.iter().position(|e| e.job_id == job_id) {
                let entry = queue.remove(pos).expect("position just found");
                let bytes = entry.program_size_bytes;
                drop(entry);
                inner.total_bytes = inner.total_bytes.saturating_sub(bytes);
                debug!(job_id, "removed queued job");
                return true;
            }
        }
        false
    }

    pub async fn queue_depth(&self, backend_canonical: &str) -> usize {
        let inner = self.inner.lock().await;
        inner
            .backends
            .get(backend_canonical)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    pub async fn total_bytes(&self) -> u64 {
        self.inner.lock().await.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;
    use chrono::Utc;

    fn entry(job_id: &str, backend: &str, size: u64) -> QueueEntry {
        QueueEntry {
            job_id: job_id.to_string(),
            backend_canonical: backend.to_string(),
            role: Role::Developer,
            program_size_bytes: size,
            enqueued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fifo_within_a_backend() {
        let queue = JobQueue::new(1_000_000);
        queue.enqueue(entry("a", "x", 10)).await;
        queue.enqueue(entry("b", "x", 10)).await;

        let cancel = CancellationToken::new();
        let first = queue.take("x", &cancel).await;
        let second = queue.take("x", &cancel).await;

        match (first, second) {
            (TakeOutcome::Entry(a), TakeOutcome::Entry(b)) => {
                assert_eq!(a.job_id, "a");
                assert_eq!(b.job_id, "b");
            }
            _ => panic!("expected both entries"),
        }
    }

    #[tokio::test]
    async fn memory_bound_rejects_overflow() {
        let queue = JobQueue::new(15);
        assert_eq!(queue.enqueue(entry("a", "x", 10)).await, EnqueueOutcome::Ok);
        assert_eq!(
            queue.enqueue(entry("b", "x", 10)).await,
            EnqueueOutcome::RejectMemory
        );
    }

    #[tokio::test]
    async fn take_blocks_until_enqueue_then_wakes() {
        let queue = JobQueue::new(1_000_000);
        let cancel = CancellationToken::new();

        let waiter_queue = queue.clone();
        let waiter_cancel = cancel.clone();
        let handle = tokio::spawn(async move { waiter_queue.take("x", &waiter_cancel).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.enqueue(entry("a", "x", 10)).await;

        match handle.await.unwrap() {
            TakeOutcome::Entry(e) => assert_eq!(e.job_id, "a"),
            TakeOutcome::Cancelled => panic!("should not have been cancelled"),
        }
    }

    #[tokio::test]
    async fn take_respects_cancellation() {
        let queue = JobQueue::new(1_000_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(queue.take("x", &cancel).await, TakeOutcome::Cancelled);
    }

    #[tokio::test]
    async fn drop_job_removes_queued_entry() {
        let queue = JobQueue::new(1_000_000);
        queue.enqueue(entry("a", "x", 10)).await;

        assert!(queue.drop_job("a").await);
        assert!(!queue.drop_job("a").await);
        assert_eq!(queue.queue_depth("x").await, 0);
        assert_eq!(queue.total_bytes().await, 0);
    }
}
