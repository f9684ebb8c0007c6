//! Shared types for the storesight pipeline

use crate::domain::geometry::Point;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned bounding box in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Center point of the box, used for all region tests
    #[inline]
    pub fn center(&self) -> Point {
        Point { x: (self.x1 + self.x2) / 2.0, y: (self.y1 + self.y2) / 2.0 }
    }
}

/// One tracked detection for one frame, produced by the external
/// detector+tracker boundary. Ephemeral - not stored beyond the frame.
#[derive(Debug, Clone)]
pub struct TrackedObservation {
    pub track_id: TrackId,
    pub bbox: BoundingBox,
    /// Detection confidence in [0, 1]
    pub confidence: f64,
    /// Capture time of the frame, never processing wall-clock time
    pub captured_at: DateTime<Utc>,
}

/// Terminal classification of a track's interaction with a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Confirmed presence in the region (min_hits reached, later exited)
    Entered,
    /// Brief contact with the region that never confirmed
    Passed,
}

impl ActionType {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Entered => "entered",
            ActionType::Passed => "passed",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_center() {
        let bbox = BoundingBox::new(100.0, 100.0, 200.0, 300.0);
        let center = bbox.center();
        assert_eq!(center.x, 150.0);
        assert_eq!(center.y, 200.0);
    }

    #[test]
    fn test_action_type_as_str() {
        assert_eq!(ActionType::Entered.as_str(), "entered");
        assert_eq!(ActionType::Passed.as_str(), "passed");
    }

    #[test]
    fn test_action_type_serde_lowercase() {
        let json = serde_json::to_string(&ActionType::Passed).unwrap();
        assert_eq!(json, "\"passed\"");
        let back: ActionType = serde_json::from_str("\"entered\"").unwrap();
        assert_eq!(back, ActionType::Entered);
    }
}
