//! Movement events and KPI snapshots
//!
//! `MovementEvent` is the immutable record handed to the ingestion boundary;
//! its wire shape is the ingestion contract. `KpiSnapshot` is the immutable
//! output of one aggregation run for one (branch, window).

use crate::domain::types::{ActionType, TrackId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One terminal track-region interaction. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementEvent {
    pub event_id: Uuid,
    /// Anonymized customer id, stable only for this track's lifetime
    pub customer_id: Uuid,
    pub branch_id: String,
    pub region_id: String,
    pub camera_id: String,
    pub action_type: ActionType,
    pub enter_time: DateTime<Utc>,
    /// None while the event is still open at the receiving side
    pub exit_time: Option<DateTime<Utc>>,
    /// exit_time - enter_time; only set for confirmed "entered" events
    pub dwell_time_seconds: Option<f64>,
    /// Running arithmetic mean of detection confidence over the track's
    /// observed frames
    pub confidence_avg: Option<f64>,
    pub track_id: TrackId,
}

impl MovementEvent {
    /// Delivery dedup key used by the ingestion boundary
    pub fn dedup_key(&self) -> (Uuid, &str, DateTime<Utc>) {
        (self.customer_id, self.region_id.as_str(), self.enter_time)
    }
}

/// Branch metadata consumed by the aggregation engine. The staffing demand
/// model is external, so `required_staff` arrives as data.
#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub capacity: u32,
    #[serde(default)]
    pub staff_on_duty: u32,
    #[serde(default)]
    pub required_staff: u32,
}

/// One window's operational metrics for a branch. Every metric is nullable:
/// None means insufficient data, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub branch_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub traffic_index: Option<f64>,
    pub conversion_proxy: Option<f64>,
    pub congestion_level: Option<f64>,
    pub growth_momentum: Option<f64>,
    pub utilization_ratio: Option<f64>,
    pub staffing_adequacy_index: Option<f64>,
    pub bottleneck_score: Option<f64>,
}
