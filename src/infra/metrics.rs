//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

#[derive(Default)]
pub struct Metrics {
    frames_processed: AtomicU64,
    observations_seen: AtomicU64,
    events_entered: AtomicU64,
    events_passed: AtomicU64,
    events_dispatched: AtomicU64,
    delivery_retries: AtomicU64,
    events_dead_lettered: AtomicU64,
    queue_dropped: AtomicU64,
    queue_depth_max: AtomicU64,
    etl_runs: AtomicU64,
    etl_branch_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_frame(&self, observations: u64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.observations_seen.fetch_add(observations, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_entered(&self) {
        self.events_entered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_passed(&self) {
        self.events_passed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dispatched(&self, count: u64) {
        self.events_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.delivery_retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dead_lettered(&self) {
        self.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_dropped(&self) {
        self.queue_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_queue_depth(&self, depth: u64) {
        update_atomic_max(&self.queue_depth_max, depth);
    }

    #[inline]
    pub fn record_etl_run(&self) {
        self.etl_runs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_etl_branch_error(&self) {
        self.etl_branch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            observations_seen: self.observations_seen.load(Ordering::Relaxed),
            events_entered: self.events_entered.load(Ordering::Relaxed),
            events_passed: self.events_passed.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            delivery_retries: self.delivery_retries.load(Ordering::Relaxed),
            events_dead_lettered: self.events_dead_lettered.load(Ordering::Relaxed),
            queue_dropped: self.queue_dropped.load(Ordering::Relaxed),
            queue_depth_max: self.queue_depth_max.load(Ordering::Relaxed),
            etl_runs: self.etl_runs.load(Ordering::Relaxed),
            etl_branch_errors: self.etl_branch_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub frames_processed: u64,
    pub observations_seen: u64,
    pub events_entered: u64,
    pub events_passed: u64,
    pub events_dispatched: u64,
    pub delivery_retries: u64,
    pub events_dead_lettered: u64,
    pub queue_dropped: u64,
    pub queue_depth_max: u64,
    pub etl_runs: u64,
    pub etl_branch_errors: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames = %self.frames_processed,
            observations = %self.observations_seen,
            entered = %self.events_entered,
            passed = %self.events_passed,
            dispatched = %self.events_dispatched,
            retries = %self.delivery_retries,
            dead_lettered = %self.events_dead_lettered,
            queue_dropped = %self.queue_dropped,
            queue_depth_max = %self.queue_depth_max,
            etl_runs = %self.etl_runs,
            etl_branch_errors = %self.etl_branch_errors,
            "metrics_summary"
        );
    }
}
