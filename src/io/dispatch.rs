//! Event dispatch - outbound queue, delivery worker, dead-lettering
//!
//! The frame loop enqueues without ever blocking; a worker drains the queue
//! and delivers batches to the ingestion boundary with bounded
//! exponential-backoff retries. Events that exhaust their retry budget are
//! appended to a local dead-letter file (JSONL) and counted.
//!
//! The queue enforces a high-water mark with a configurable drop policy so
//! an ingestion outage can never grow memory without bound.

use crate::domain::event::MovementEvent;
use crate::infra::config::{DispatchConfig, DropPolicy};
use crate::infra::metrics::Metrics;
use crate::io::ingest::IngestionClient;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// How long the worker keeps draining after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Dead-letter sink for events that exhausted their retry budget
pub struct DeadLetter {
    file_path: String,
}

impl DeadLetter {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "dead_letter_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Persist one undeliverable event. Returns true on success.
    pub fn write_event(&self, event: &MovementEvent) -> bool {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "dead_letter_serialize_failed");
                return false;
            }
        };
        match self.append_line(&json) {
            Ok(()) => {
                warn!(
                    event_id = %event.event_id,
                    region_id = %event.region_id,
                    action = %event.action_type,
                    "event_dead_lettered"
                );
                true
            }
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "dead_letter_write_failed");
                false
            }
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

struct QueueInner {
    buffer: Mutex<VecDeque<MovementEvent>>,
    notify: Notify,
    capacity: usize,
    drop_policy: DropPolicy,
    metrics: Arc<Metrics>,
}

/// Sender handle for the outbound queue. Clone freely across streams;
/// `send` never blocks.
#[derive(Clone)]
pub struct EventSender {
    inner: Arc<QueueInner>,
}

impl EventSender {
    pub fn send(&self, event: MovementEvent) {
        let mut buffer = self.inner.buffer.lock();
        if buffer.len() >= self.inner.capacity {
            match self.inner.drop_policy {
                DropPolicy::Oldest => {
                    if let Some(dropped) = buffer.pop_front() {
                        debug!(event_id = %dropped.event_id, "queue_dropped_oldest");
                    }
                }
                DropPolicy::Newest => {
                    debug!(event_id = %event.event_id, "queue_dropped_newest");
                    self.inner.metrics.record_queue_dropped();
                    return;
                }
            }
            self.inner.metrics.record_queue_dropped();
        }
        buffer.push_back(event);
        self.inner.metrics.record_queue_depth(buffer.len() as u64);
        drop(buffer);
        self.inner.notify.notify_one();
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.inner.buffer.lock().len()
    }
}

/// Worker that delivers queued events to the ingestion boundary
pub struct DispatchWorker {
    inner: Arc<QueueInner>,
    client: Arc<dyn IngestionClient>,
    config: DispatchConfig,
    dead_letter: DeadLetter,
    metrics: Arc<Metrics>,
}

/// Create the outbound queue and its delivery worker
pub fn create_dispatcher(
    config: DispatchConfig,
    client: Arc<dyn IngestionClient>,
    metrics: Arc<Metrics>,
) -> (EventSender, DispatchWorker) {
    let inner = Arc::new(QueueInner {
        buffer: Mutex::new(VecDeque::with_capacity(config.queue_capacity)),
        notify: Notify::new(),
        capacity: config.queue_capacity,
        drop_policy: config.drop_policy,
        metrics: metrics.clone(),
    });
    let dead_letter = DeadLetter::new(&config.dead_letter_file);
    let worker = DispatchWorker { inner: inner.clone(), client, config, dead_letter, metrics };
    (EventSender { inner }, worker)
}

impl DispatchWorker {
    /// Run until shutdown, then drain the queue within a bounded timeout
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("dispatch_worker_started");
        let flush_interval = Duration::from_secs(self.config.flush_interval_secs.max(1));
        let mut ticker = tokio::time::interval(flush_interval);

        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                tokio::select! {
                    _ = self.inner.notify.notified() => {}
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
                continue;
            }
            self.deliver(batch).await;
        }

        self.drain().await;
        info!("dispatch_worker_stopped");
    }

    /// Deliver whatever is still queued, bounded by DRAIN_TIMEOUT
    async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                return;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                let left = batch.len() + self.inner.buffer.lock().len();
                warn!(events_remaining = %left, "dispatch_drain_timeout");
                for event in batch {
                    self.dead_letter.write_event(&event);
                    self.metrics.record_dead_lettered();
                }
                return;
            }
            if tokio::time::timeout(remaining, self.deliver(batch)).await.is_err() {
                warn!("dispatch_drain_timeout");
                return;
            }
        }
    }

    fn take_batch(&self) -> Vec<MovementEvent> {
        let mut buffer = self.inner.buffer.lock();
        let take = buffer.len().min(self.config.batch_max_size);
        buffer.drain(..take).collect()
    }

    /// Deliver a batch: retry the whole batch with backoff, then fall back
    /// to per-event delivery, then dead-letter what remains.
    async fn deliver(&self, batch: Vec<MovementEvent>) {
        match self.retry_batch(&batch).await {
            Ok(()) => {
                debug!(count = %batch.len(), "events_dispatched");
                self.metrics.record_dispatched(batch.len() as u64);
                return;
            }
            Err(e) => {
                warn!(count = %batch.len(), error = %e, "batch_delivery_failed_falling_back");
            }
        }

        for event in batch {
            match self.retry_one(&event).await {
                Ok(()) => self.metrics.record_dispatched(1),
                Err(e) => {
                    error!(
                        event_id = %event.event_id,
                        region_id = %event.region_id,
                        error = %e,
                        "event_delivery_exhausted"
                    );
                    self.dead_letter.write_event(&event);
                    self.metrics.record_dead_lettered();
                }
            }
        }
    }

    async fn retry_batch(&self, batch: &[MovementEvent]) -> Result<(), crate::infra::Error> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_err = crate::infra::Error::Delivery("no attempts made".into());

        for n in 0..self.config.max_attempts.max(1) {
            if n > 0 {
                self.metrics.record_retry();
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
            match self.client.post_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    async fn retry_one(&self, event: &MovementEvent) -> Result<(), crate::infra::Error> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.config.max_backoff_ms);
        let mut last_err = crate::infra::Error::Delivery("no attempts made".into());

        for n in 0..self.config.max_attempts.max(1) {
            if n > 0 {
                self.metrics.record_retry();
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
            match self.client.post_one(event).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}
