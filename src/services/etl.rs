//! KPI ETL runner and store seams
//!
//! Persistence is external, so events and snapshots go through narrow async
//! store traits. The in-memory implementations back the `local` dispatch
//! mode and the tests; a deployment swaps in clients for the real stores.
//!
//! The runner recomputes one complete window per run for every configured
//! branch. A (branch, window_start) key is processed by at most one run at a
//! time; recomputation replaces the keyed snapshot, so reruns are idempotent.
//! A failing branch is logged and counted without aborting the run.

use crate::domain::event::{Branch, KpiSnapshot, MovementEvent};
use crate::domain::types::ActionType;
use crate::infra::config::KpiConfig;
use crate::infra::{Error, Metrics};
use crate::io::IngestionClient;
use crate::services::aggregation::compute_snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: MovementEvent) -> Result<(), Error>;

    /// Branch events with enter_time in `[start, end)`
    async fn events_between(
        &self,
        branch_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MovementEvent>, Error>;

    /// Count of confirmed entries with enter_time in `[start, end)`
    async fn count_entered(
        &self,
        branch_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, Error>;

    /// Enter time of the branch's oldest stored event, None when the branch
    /// has no events at all
    async fn earliest_enter_time(&self, branch_id: &str) -> Result<Option<DateTime<Utc>>, Error>;
}

#[async_trait]
pub trait KpiStore: Send + Sync {
    /// Insert or replace the snapshot keyed by (branch_id, window_start)
    async fn upsert(&self, snapshot: KpiSnapshot) -> Result<(), Error>;

    async fn get(
        &self,
        branch_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Option<KpiSnapshot>, Error>;

    /// The branch's most recent snapshot by window_start
    async fn latest(&self, branch_id: &str) -> Result<Option<KpiSnapshot>, Error>;
}

/// In-memory event store. Deliveries are at-least-once, so inserts dedupe on
/// (customer, region, enter_time); a second open entry for the same
/// (customer, region) closes the older one defensively.
#[derive(Default)]
pub struct InMemoryEventStore {
    inner: Mutex<EventStoreInner>,
}

#[derive(Default)]
struct EventStoreInner {
    events: Vec<MovementEvent>,
    seen: FxHashSet<(Uuid, String, DateTime<Utc>)>,
    open: FxHashMap<(Uuid, String), usize>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, event: MovementEvent) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        let (customer, region, enter) = event.dedup_key();
        let dedup = (customer, region.to_string(), enter);
        if !inner.seen.insert(dedup) {
            return Ok(());
        }

        let open_key = (event.customer_id, event.region_id.clone());
        if event.action_type == ActionType::Entered && event.exit_time.is_none() {
            if let Some(&idx) = inner.open.get(&open_key) {
                // Invariant repair: at most one open event per (customer,
                // region). Close the stale one at the new enter time.
                let stale = &mut inner.events[idx];
                stale.exit_time = Some(event.enter_time);
                let conflict = Error::DuplicateOpenEvent {
                    customer_id: event.customer_id,
                    region_id: event.region_id.clone(),
                };
                warn!(error = %conflict, "duplicate_open_event_closed");
            }
            let idx = inner.events.len();
            inner.open.insert(open_key, idx);
        } else if event.exit_time.is_some() {
            inner.open.remove(&open_key);
        }
        inner.events.push(event);
        Ok(())
    }

    async fn events_between(
        &self,
        branch_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MovementEvent>, Error> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.branch_id == branch_id && e.enter_time >= start && e.enter_time < end)
            .cloned()
            .collect())
    }

    async fn count_entered(
        &self,
        branch_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .iter()
            .filter(|e| {
                e.branch_id == branch_id
                    && e.action_type == ActionType::Entered
                    && e.enter_time >= start
                    && e.enter_time < end
            })
            .count() as u64)
    }

    async fn earliest_enter_time(&self, branch_id: &str) -> Result<Option<DateTime<Utc>>, Error> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .iter()
            .filter(|e| e.branch_id == branch_id)
            .map(|e| e.enter_time)
            .min())
    }
}

/// Ingestion client for `local` dispatch mode: events land straight in the
/// shared in-memory store instead of going over HTTP.
pub struct LocalIngestionClient {
    store: Arc<InMemoryEventStore>,
}

impl LocalIngestionClient {
    pub fn new(store: Arc<InMemoryEventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IngestionClient for LocalIngestionClient {
    async fn post_batch(&self, events: &[MovementEvent]) -> Result<(), Error> {
        for event in events {
            self.store.insert(event.clone()).await?;
        }
        Ok(())
    }

    async fn post_one(&self, event: &MovementEvent) -> Result<(), Error> {
        self.store.insert(event.clone()).await
    }
}

#[derive(Default)]
pub struct InMemoryKpiStore {
    snapshots: Mutex<FxHashMap<(String, DateTime<Utc>), KpiSnapshot>>,
}

impl InMemoryKpiStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KpiStore for InMemoryKpiStore {
    async fn upsert(&self, snapshot: KpiSnapshot) -> Result<(), Error> {
        let key = (snapshot.branch_id.clone(), snapshot.window_start);
        self.snapshots.lock().insert(key, snapshot);
        Ok(())
    }

    async fn get(
        &self,
        branch_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Option<KpiSnapshot>, Error> {
        Ok(self.snapshots.lock().get(&(branch_id.to_string(), window_start)).cloned())
    }

    async fn latest(&self, branch_id: &str) -> Result<Option<KpiSnapshot>, Error> {
        let snapshots = self.snapshots.lock();
        Ok(snapshots
            .iter()
            .filter(|((branch, _), _)| branch == branch_id)
            .max_by_key(|((_, window_start), _)| *window_start)
            .map(|(_, snapshot)| snapshot.clone()))
    }
}

/// Outcome counts for one ETL run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EtlSummary {
    pub branches_processed: u32,
    pub kpis_computed: u32,
    pub errors: u32,
}

pub struct EtlRunner {
    events: Arc<dyn EventStore>,
    kpis: Arc<dyn KpiStore>,
    branches: HashMap<String, Branch>,
    kpi: KpiConfig,
    metrics: Arc<Metrics>,
    /// (branch_id, window_start) keys currently being recomputed
    window_locks: Mutex<FxHashSet<(String, DateTime<Utc>)>>,
}

impl EtlRunner {
    pub fn new(
        events: Arc<dyn EventStore>,
        kpis: Arc<dyn KpiStore>,
        branches: HashMap<String, Branch>,
        kpi: KpiConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { events, kpis, branches, kpi, metrics, window_locks: Mutex::new(FxHashSet::default()) }
    }

    fn window_duration(&self) -> Duration {
        Duration::minutes(self.kpi.window_minutes as i64)
    }

    /// Start of the last complete window before `now`
    pub fn window_start_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = self.window_duration().num_seconds();
        let floored = now.timestamp() - now.timestamp().rem_euclid(secs);
        Utc.timestamp_opt(floored - secs, 0).unwrap()
    }

    /// Recompute the window starting at `window_start` for every configured
    /// branch. Branch failures are isolated; a run already holding the same
    /// (branch, window) key skips it.
    pub async fn run_window(&self, window_start: DateTime<Utc>) -> EtlSummary {
        let window_end = window_start + self.window_duration();
        let mut summary = EtlSummary::default();
        self.metrics.record_etl_run();

        let mut branch_ids: Vec<&String> = self.branches.keys().collect();
        branch_ids.sort_unstable();

        for branch_id in branch_ids {
            let key = (branch_id.clone(), window_start);
            if !self.window_locks.lock().insert(key.clone()) {
                warn!(branch_id = %branch_id, window_start = %window_start, "etl_window_busy");
                continue;
            }

            summary.branches_processed += 1;
            let result = self.run_branch(branch_id, window_start, window_end).await;
            self.window_locks.lock().remove(&key);

            match result {
                Ok(()) => summary.kpis_computed += 1,
                Err(e) => {
                    summary.errors += 1;
                    self.metrics.record_etl_branch_error();
                    error!(branch_id = %branch_id, error = %e, "etl_branch_failed");
                }
            }
        }

        info!(
            window_start = %window_start,
            branches = summary.branches_processed,
            kpis = summary.kpis_computed,
            errors = summary.errors,
            "etl_run_complete"
        );
        summary
    }

    async fn run_branch(
        &self,
        branch_id: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<(), Error> {
        let branch = self
            .branches
            .get(branch_id)
            .ok_or_else(|| Error::MissingBranch(branch_id.to_string()))?;

        let events = self.events.events_between(branch_id, window_start, window_end).await?;
        let history = self.visitor_history(branch_id, window_start).await?;
        let snapshot =
            compute_snapshot(branch, window_start, window_end, &events, &history, &self.kpi);
        self.kpis.upsert(snapshot).await
    }

    /// Trailing per-window visitor counts, oldest first, deep enough for
    /// both the baseline and the momentum lookback. Windows predating the
    /// branch's first stored event are absent, not zero, so a branch with no
    /// history yields no baseline and no momentum.
    async fn visitor_history(
        &self,
        branch_id: &str,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<u64>, Error> {
        let earliest = match self.events.earliest_enter_time(branch_id).await? {
            Some(earliest) => earliest,
            None => return Ok(Vec::new()),
        };
        let lookback =
            self.kpi.baseline_periods.max(self.kpi.momentum_windows.saturating_sub(1)) as i64;
        let step = self.window_duration();
        let mut history = Vec::with_capacity(lookback as usize);
        for i in (1..=lookback).rev() {
            let start = window_start - step * i as i32;
            let end = start + step;
            if end <= earliest {
                continue;
            }
            history.push(self.events.count_entered(branch_id, start, end).await?);
        }
        Ok(history)
    }
}
