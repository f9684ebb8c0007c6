//! Region-of-interest definitions
//!
//! A region is either a zone (closed polygon, containment semantics) or a
//! crossing line (two endpoints plus a direction). Geometry is validated
//! when the configuration is loaded; the per-frame tests never fail.

use crate::domain::geometry::{
    point_in_polygon, segment_crosses_line, side_of_line, validate_line, validate_polygon,
    GeometryError, Point,
};
use serde::Deserialize;
use smallvec::SmallVec;

/// Which crossings of a line region count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossingDirection {
    /// Only crossings ending on the left side of a->b
    Forward,
    /// Only crossings ending on the right side of a->b
    Backward,
    /// Either direction
    #[default]
    Any,
}

/// Region geometry variants
#[derive(Debug, Clone)]
pub enum RegionKind {
    Zone { polygon: SmallVec<[Point; 8]> },
    Line { a: Point, b: Point, direction: CrossingDirection },
}

/// A configured region of interest, bound to one branch and one camera
#[derive(Debug, Clone)]
pub struct Region {
    pub id: String,
    pub branch_id: String,
    pub camera_id: String,
    pub kind: RegionKind,
}

impl Region {
    pub fn zone(
        id: &str,
        branch_id: &str,
        camera_id: &str,
        vertices: Vec<Point>,
    ) -> Result<Self, GeometryError> {
        validate_polygon(&vertices)?;
        Ok(Self {
            id: id.to_string(),
            branch_id: branch_id.to_string(),
            camera_id: camera_id.to_string(),
            kind: RegionKind::Zone { polygon: SmallVec::from_vec(vertices) },
        })
    }

    pub fn line(
        id: &str,
        branch_id: &str,
        camera_id: &str,
        a: Point,
        b: Point,
        direction: CrossingDirection,
    ) -> Result<Self, GeometryError> {
        validate_line(a, b)?;
        Ok(Self {
            id: id.to_string(),
            branch_id: branch_id.to_string(),
            camera_id: camera_id.to_string(),
            kind: RegionKind::Line { a, b, direction },
        })
    }

    /// Containment test for zone regions. Always false for lines.
    #[inline]
    pub fn contains(&self, p: Point) -> bool {
        match &self.kind {
            RegionKind::Zone { polygon } => point_in_polygon(p, polygon),
            RegionKind::Line { .. } => false,
        }
    }

    /// Crossing test for line regions: did prev->curr cross the line in the
    /// configured direction? Returns the side `curr` landed on.
    #[inline]
    pub fn crossed(&self, prev: Option<Point>, curr: Point) -> Option<i8> {
        let RegionKind::Line { a, b, direction } = &self.kind else {
            return None;
        };
        let prev = prev?;
        let landed = segment_crosses_line(*a, *b, prev, curr)?;
        match direction {
            CrossingDirection::Forward if landed != 1 => None,
            CrossingDirection::Backward if landed != -1 => None,
            _ => Some(landed),
        }
    }

    /// For line regions: which side of the line a point is on
    #[inline]
    pub fn line_side(&self, p: Point) -> Option<i8> {
        match &self.kind {
            RegionKind::Line { a, b, .. } => Some(side_of_line(*a, *b, p)),
            RegionKind::Zone { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self.kind {
            RegionKind::Zone { .. } => "zone",
            RegionKind::Line { .. } => "line",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Region {
        Region::zone(
            "entrance",
            "branch_001",
            "cam_1",
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_zone_contains() {
        let region = zone();
        assert!(region.contains(Point::new(5.0, 5.0)));
        assert!(!region.contains(Point::new(50.0, 5.0)));
        assert!(region.crossed(Some(Point::new(-1.0, 5.0)), Point::new(5.0, 5.0)).is_none());
    }

    #[test]
    fn test_zone_rejects_bowtie() {
        let result = Region::zone(
            "bad",
            "branch_001",
            "cam_1",
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(10.0, 0.0),
                Point::new(0.0, 10.0),
            ],
        );
        assert_eq!(result.unwrap_err(), GeometryError::SelfIntersecting);
    }

    #[test]
    fn test_line_direction_filter() {
        let forward = Region::line(
            "door",
            "branch_001",
            "cam_1",
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            CrossingDirection::Forward,
        )
        .unwrap();

        // Right-to-left lands on the left side (+1): forward-only accepts it
        assert_eq!(forward.crossed(Some(Point::new(2.0, 5.0)), Point::new(-2.0, 5.0)), Some(1));
        // Left-to-right lands on the right side (-1): filtered out
        assert_eq!(forward.crossed(Some(Point::new(-2.0, 5.0)), Point::new(2.0, 5.0)), None);

        let any = Region::line(
            "door_any",
            "branch_001",
            "cam_1",
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            CrossingDirection::Any,
        )
        .unwrap();
        assert_eq!(any.crossed(Some(Point::new(-2.0, 5.0)), Point::new(2.0, 5.0)), Some(-1));
    }

    #[test]
    fn test_line_requires_prev_point() {
        let line = Region::line(
            "door",
            "branch_001",
            "cam_1",
            Point::new(0.0, 0.0),
            Point::new(0.0, 10.0),
            CrossingDirection::Any,
        )
        .unwrap();
        assert_eq!(line.crossed(None, Point::new(1.0, 5.0)), None);
    }

    #[test]
    fn test_degenerate_line_rejected() {
        let result = Region::line(
            "bad",
            "branch_001",
            "cam_1",
            Point::new(5.0, 5.0),
            Point::new(5.0, 5.0),
            CrossingDirection::Any,
        );
        assert_eq!(result.unwrap_err(), GeometryError::DegenerateLine);
    }
}
