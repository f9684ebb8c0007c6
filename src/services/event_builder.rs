//! Movement event construction
//!
//! Turns terminal region transitions into wire-ready [`MovementEvent`]s.
//! Track ids are camera-local and recycled by upstream trackers, so the
//! builder derives a stable pseudonymous customer id from a per-process
//! session namespace plus the track id. The same track maps to the same
//! customer id for the life of the process and never across restarts.

use crate::domain::event::MovementEvent;
use crate::domain::region::Region;
use crate::domain::types::{ActionType, TrackId};
use crate::services::roi_tracker::RegionTransition;
use uuid::Uuid;

pub struct EventBuilder {
    session: Uuid,
}

impl EventBuilder {
    pub fn new() -> Self {
        Self { session: Uuid::now_v7() }
    }

    #[cfg(test)]
    pub fn with_session(session: Uuid) -> Self {
        Self { session }
    }

    fn customer_id(&self, track_id: TrackId) -> Uuid {
        Uuid::new_v5(&self.session, &track_id.0.to_be_bytes())
    }

    /// Build the wire event for one terminal transition. Both actions close
    /// with the transition's exit time; dwell is only meaningful for
    /// confirmed presences, so brief passes carry none.
    pub fn build(&self, transition: &RegionTransition, region: &Region) -> MovementEvent {
        let dwell_time_seconds = match transition.action {
            ActionType::Entered => {
                let dwell = (transition.exit_time - transition.enter_time)
                    .num_milliseconds() as f64
                    / 1000.0;
                Some(dwell.max(0.0))
            }
            ActionType::Passed => None,
        };
        MovementEvent {
            event_id: Uuid::now_v7(),
            customer_id: self.customer_id(transition.track_id),
            branch_id: region.branch_id.clone(),
            region_id: region.id.clone(),
            camera_id: region.camera_id.clone(),
            action_type: transition.action,
            enter_time: transition.enter_time,
            exit_time: Some(transition.exit_time),
            dwell_time_seconds,
            confidence_avg: transition.confidence_avg,
            track_id: transition.track_id,
        }
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Point;
    use chrono::{TimeZone, Utc};

    fn zone() -> Region {
        Region::zone(
            "deli",
            "branch-1",
            "cam-2",
            vec![
                Point { x: 0.0, y: 0.0 },
                Point { x: 1.0, y: 0.0 },
                Point { x: 1.0, y: 1.0 },
                Point { x: 0.0, y: 1.0 },
            ],
        )
        .unwrap()
    }

    fn transition(action: ActionType) -> RegionTransition {
        RegionTransition {
            region_index: 0,
            track_id: TrackId(42),
            action,
            enter_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            exit_time: Utc.timestamp_opt(1_700_000_090, 500_000_000).unwrap(),
            confidence_avg: Some(0.87),
        }
    }

    #[test]
    fn entered_carries_dwell_and_exit() {
        let builder = EventBuilder::new();
        let event = builder.build(&transition(ActionType::Entered), &zone());

        assert_eq!(event.action_type, ActionType::Entered);
        assert_eq!(event.branch_id, "branch-1");
        assert_eq!(event.region_id, "deli");
        assert!((event.dwell_time_seconds.unwrap() - 90.5).abs() < 1e-9);
        assert!(event.exit_time.is_some());
    }

    #[test]
    fn passed_closes_at_last_seen_frame_without_dwell() {
        let builder = EventBuilder::new();
        let t = transition(ActionType::Passed);
        let event = builder.build(&t, &zone());

        assert_eq!(event.action_type, ActionType::Passed);
        assert_eq!(event.exit_time, Some(t.exit_time));
        assert!(event.dwell_time_seconds.is_none());
    }

    #[test]
    fn customer_id_is_stable_within_a_session() {
        let session = Uuid::now_v7();
        let builder = EventBuilder::with_session(session);
        let a = builder.build(&transition(ActionType::Entered), &zone());
        let b = builder.build(&transition(ActionType::Passed), &zone());
        assert_eq!(a.customer_id, b.customer_id);
        assert_ne!(a.event_id, b.event_id);

        let other = EventBuilder::new();
        let c = other.build(&transition(ActionType::Entered), &zone());
        assert_ne!(a.customer_id, c.customer_id);
    }
}
