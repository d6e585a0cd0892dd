//! Notification job queue
//!
//! Channel-backed queue with an explicit worker loop. Callers enqueue and
//! move on (fire-and-forget); the worker hands jobs to a `NotificationSink`
//! and retries failures up to `max_attempts` with linearly-increasing
//! backoff. Exhausted jobs are dropped and logged, never surfaced to the
//! caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// A notification job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// A budget category crossed its 80% or 100% threshold
    ThresholdAlert {
        user_id: String,
        category: String,
        /// 80 or 100
        threshold: u8,
        spent: f64,
        limit: f64,
    },
    /// A Sunday analytics read triggered the weekly summary
    WeeklySummary { user_id: String },
    /// A weekly digest record is ready to send
    DigestReady { user_id: String, digest_id: i64 },
}

impl Job {
    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThresholdAlert { .. } => "threshold_alert",
            Self::WeeklySummary { .. } => "weekly_summary",
            Self::DigestReady { .. } => "digest_ready",
        }
    }
}

/// Where delivered notifications go
///
/// The core assumes nothing about delivery beyond "accepted"; an error
/// return triggers the queue's retry policy.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, job: &Job) -> Result<()>;
}

/// Default sink: writes notifications to the log
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, job: &Job) -> Result<()> {
        info!(kind = job.kind(), payload = ?job, "Notification");
        Ok(())
    }
}

/// Sink that records every delivery (for tests)
#[derive(Clone, Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<Job>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Job> {
        self.delivered.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, job: &Job) -> Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.clone());
        Ok(())
    }
}

/// Retry policy for the worker loop
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Attempts per job before it is dropped
    pub max_attempts: u32,
    /// Backoff is `base_delay * attempt_number`
    pub base_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

struct QueuedJob {
    job: Job,
    attempt: u32,
}

/// Handle for enqueueing notification jobs
///
/// Cloneable; all clones feed the same worker.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<QueuedJob>,
}

impl JobQueue {
    /// Create a queue and spawn its worker loop
    pub fn start(config: QueueConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let retry_tx = tx.clone();
        tokio::spawn(worker_loop(rx, retry_tx, config, sink));
        Self { tx }
    }

    /// Create a queue delivering to the log sink with default retries
    pub fn start_default() -> Self {
        Self::start(QueueConfig::default(), Arc::new(LogSink))
    }

    /// Submit a job (fire-and-forget)
    pub fn enqueue(&self, job: Job) -> Result<()> {
        debug!(kind = job.kind(), "Enqueueing notification job");
        self.tx
            .send(QueuedJob { job, attempt: 1 })
            .map_err(|_| Error::Queue("notification worker has shut down".into()))
    }
}

async fn worker_loop(
    mut rx: mpsc::UnboundedReceiver<QueuedJob>,
    retry_tx: mpsc::UnboundedSender<QueuedJob>,
    config: QueueConfig,
    sink: Arc<dyn NotificationSink>,
) {
    while let Some(queued) = rx.recv().await {
        match sink.deliver(&queued.job).await {
            Ok(()) => {
                debug!(kind = queued.job.kind(), attempt = queued.attempt, "Notification delivered");
            }
            Err(e) if queued.attempt < config.max_attempts => {
                let delay = config.base_delay * queued.attempt;
                warn!(
                    kind = queued.job.kind(),
                    attempt = queued.attempt,
                    error = %e,
                    "Notification delivery failed, retrying in {:?}", delay
                );
                let tx = retry_tx.clone();
                let job = queued.job;
                let attempt = queued.attempt + 1;
                // Sleep off-loop so a backing-off job does not stall the queue
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(QueuedJob { job, attempt });
                });
            }
            Err(e) => {
                error!(
                    kind = queued.job.kind(),
                    attempts = queued.attempt,
                    error = %e,
                    "Notification dropped after exhausting retries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Sink that fails the first N deliveries
    struct FlakySink {
        failures_remaining: AtomicU32,
        inner: RecordingSink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failures),
                inner: RecordingSink::new(),
            }
        }
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn deliver(&self, job: &Job) -> Result<()> {
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(Error::Queue("transient".into()));
            }
            self.inner.deliver(job).await
        }
    }

    fn test_job() -> Job {
        Job::WeeklySummary {
            user_id: "user-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_deliver() {
        let sink = Arc::new(RecordingSink::new());
        let queue = JobQueue::start(QueueConfig::default(), sink.clone());

        queue.enqueue(test_job()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(sink.delivered(), vec![test_job()]);
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let sink = Arc::new(FlakySink::new(2));
        let config = QueueConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        };
        let queue = JobQueue::start(config, sink.clone());

        queue.enqueue(test_job()).unwrap();
        // Two failures, backoffs of 10ms and 20ms, then success
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(sink.inner.delivered().len(), 1);
        assert_eq!(sink.failures_remaining.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_after_exhausting_attempts() {
        let sink = Arc::new(FlakySink::new(10));
        let config = QueueConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
        };
        let queue = JobQueue::start(config, sink.clone());

        queue.enqueue(test_job()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(sink.inner.delivered().is_empty());
        // Only max_attempts deliveries were tried
        assert_eq!(sink.failures_remaining.load(Ordering::SeqCst), 8);
    }
}
