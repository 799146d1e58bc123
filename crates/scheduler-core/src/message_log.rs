//! Per-job append-only status-message ring, used for diagnostics.
//!
//! Best-effort by contract: a write failure here must never roll back a
//! status transition (SPEC_FULL §4.4 step 5).

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct LogMessage {
    pub at: DateTime<Utc>,
    pub text: String,
}

struct Inner {
    per_job: HashMap<String, VecDeque<LogMessage>>,
    capacity: usize,
}

/// In-memory ring buffer of recent status messages, keyed by job id.
#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<Mutex<Inner>>,
}

impl MessageLog {
    pub fn new(capacity_per_job: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                per_job: HashMap::new(),
                capacity: capacity_per_job.max(1),
            })),
        }
    }

    pub async fn append(&self, job_id: &str, text: impl Into<String>, at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        let capacity = inner.capacity;
        let ring = inner.per_job.entry(job_id.to_string()).or_default();
        if ring.len() == capacity {
            ring.pop_front();
        }
        ring.push_back(LogMessage { at, text: text.into() });
    }

    pub async fn recent(&self, job_id: &str) -> Vec<LogMessage> {
        let inner = self.inner.lock().await;
        inner
            .per_job
            .get(job_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ring_drops_oldest_entries_past_capacity() {
        let log = MessageLog::new(2);
        let now = Utc::now();
        log.append("job-1", "first", now).await;
        log.append("job-1", "second", now).await;
        log.append("job-1", "third", now).await;

        let messages = log.recent("job-1").await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "second");
        assert_eq!(messages[1].text, "third");
    }

    #[tokio::test]
    async fn unknown_job_returns_empty() {
        let log = MessageLog::new(4);
        assert!(log.recent("missing").await.is_empty());
    }
}
