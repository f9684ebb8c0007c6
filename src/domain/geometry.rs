//! Point-in-polygon and line-crossing primitives
//!
//! Everything here is pure and allocation-free on the hot path. Geometry
//! validation runs once at config load; the per-frame tests assume valid
//! input.

use thiserror::Error;

/// A 2D point in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Rejected region geometry. All variants are configuration errors raised
/// at load time, never per frame.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("polygon requires at least 3 vertices, got {0}")]
    TooFewVertices(usize),
    #[error("polygon is self-intersecting")]
    SelfIntersecting,
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("line endpoints must be distinct")]
    DegenerateLine,
}

/// Cross product of (b - a) x (p - a). Positive when p is left of a->b.
#[inline]
fn cross(a: Point, b: Point, p: Point) -> f64 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Which side of the directed line a->b the point lies on.
/// Returns 1 (left), -1 (right) or 0 (collinear).
#[inline]
pub fn side_of_line(a: Point, b: Point, p: Point) -> i8 {
    let c = cross(a, b, p);
    if c > 0.0 {
        1
    } else if c < 0.0 {
        -1
    } else {
        0
    }
}

/// Ray-casting containment test. Points exactly on an edge are treated as
/// inside, which keeps single-pixel jitter on a boundary from flapping.
pub fn point_in_polygon(p: Point, vertices: &[Point]) -> bool {
    let n = vertices.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (vi, vj) = (vertices[i], vertices[j]);
        // On-edge check for this segment
        if side_of_line(vj, vi, p) == 0
            && p.x >= vi.x.min(vj.x)
            && p.x <= vi.x.max(vj.x)
            && p.y >= vi.y.min(vj.y)
            && p.y <= vi.y.max(vj.y)
        {
            return true;
        }
        if (vi.y > p.y) != (vj.y > p.y) {
            let x_cross = (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Whether segments p0->p1 and q0->q1 properly intersect (touching at an
/// endpoint does not count).
pub fn segments_intersect(p0: Point, p1: Point, q0: Point, q1: Point) -> bool {
    let d1 = side_of_line(q0, q1, p0);
    let d2 = side_of_line(q0, q1, p1);
    let d3 = side_of_line(p0, p1, q0);
    let d4 = side_of_line(p0, p1, q1);
    d1 != d2 && d3 != d4 && d1 != 0 && d2 != 0 && d3 != 0 && d4 != 0
}

/// Whether the movement segment prev->curr crosses the line a->b.
/// Returns the side of `curr` relative to a->b on a crossing, None otherwise.
pub fn segment_crosses_line(a: Point, b: Point, prev: Point, curr: Point) -> Option<i8> {
    let prev_side = side_of_line(a, b, prev);
    let curr_side = side_of_line(a, b, curr);
    if prev_side == curr_side || curr_side == 0 {
        return None;
    }
    // The movement must also intersect the finite segment a..b
    if segments_intersect(prev, curr, a, b) {
        Some(curr_side)
    } else {
        None
    }
}

/// Signed polygon area via the shoelace formula
fn signed_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    let mut area = 0.0;
    let mut j = n - 1;
    for i in 0..n {
        area += (vertices[j].x + vertices[i].x) * (vertices[j].y - vertices[i].y);
        j = i;
    }
    area / 2.0
}

/// Validate a polygon: at least 3 vertices, no two non-adjacent edges
/// intersecting, non-zero area. Self-intersection is tested before area: a
/// symmetric bowtie's signed area cancels to zero, and the crossing is the
/// real defect to report.
pub fn validate_polygon(vertices: &[Point]) -> Result<(), GeometryError> {
    let n = vertices.len();
    if n < 3 {
        return Err(GeometryError::TooFewVertices(n));
    }
    for i in 0..n {
        let (a0, a1) = (vertices[i], vertices[(i + 1) % n]);
        for j in (i + 1)..n {
            // Skip adjacent edges (shared vertex)
            if j == i || (j + 1) % n == i || (i + 1) % n == j {
                continue;
            }
            let (b0, b1) = (vertices[j], vertices[(j + 1) % n]);
            if segments_intersect(a0, a1, b0, b1) {
                return Err(GeometryError::SelfIntersecting);
            }
        }
    }
    if signed_area(vertices).abs() < f64::EPSILON {
        return Err(GeometryError::ZeroArea);
    }
    Ok(())
}

/// Validate a crossing line: endpoints must be distinct
pub fn validate_line(a: Point, b: Point) -> Result<(), GeometryError> {
    if (a.x - b.x).abs() < f64::EPSILON && (a.y - b.y).abs() < f64::EPSILON {
        return Err(GeometryError::DegenerateLine);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]
    }

    #[test]
    fn test_point_inside_square() {
        assert!(point_in_polygon(Point::new(5.0, 5.0), &square()));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &square()));
        assert!(!point_in_polygon(Point::new(-1.0, 5.0), &square()));
    }

    #[test]
    fn test_point_on_edge_is_inside() {
        assert!(point_in_polygon(Point::new(0.0, 5.0), &square()));
        assert!(point_in_polygon(Point::new(10.0, 10.0), &square()));
    }

    #[test]
    fn test_concave_polygon() {
        // A "C" shape: (12,5) sits in the notch, outside the polygon
        let concave = vec![
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(20.0, 4.0),
            Point::new(10.0, 4.0),
            Point::new(10.0, 6.0),
            Point::new(20.0, 6.0),
            Point::new(20.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 5.0), &concave));
        assert!(!point_in_polygon(Point::new(12.0, 5.0), &concave));
    }

    #[test]
    fn test_segment_crossing() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.0, 10.0);
        // Left-to-right movement across the line: ends on the right side
        let side = segment_crosses_line(a, b, Point::new(-2.0, 5.0), Point::new(2.0, 5.0));
        assert_eq!(side, Some(-1));
        // Right-to-left
        let side = segment_crosses_line(a, b, Point::new(2.0, 5.0), Point::new(-2.0, 5.0));
        assert_eq!(side, Some(1));
        // Movement past the segment's extent does not cross it
        assert_eq!(
            segment_crosses_line(a, b, Point::new(-2.0, 20.0), Point::new(2.0, 20.0)),
            None
        );
        // No movement across
        assert_eq!(segment_crosses_line(a, b, Point::new(1.0, 1.0), Point::new(2.0, 2.0)), None);
    }

    #[test]
    fn test_validate_polygon_ok() {
        assert!(validate_polygon(&square()).is_ok());
    }

    #[test]
    fn test_validate_polygon_too_few_vertices() {
        let verts = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert_eq!(validate_polygon(&verts), Err(GeometryError::TooFewVertices(2)));
    }

    #[test]
    fn test_validate_polygon_self_intersecting() {
        // Bowtie
        let verts = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ];
        assert_eq!(validate_polygon(&verts), Err(GeometryError::SelfIntersecting));
    }

    #[test]
    fn test_validate_polygon_zero_area() {
        let verts = vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0), Point::new(10.0, 10.0)];
        assert_eq!(validate_polygon(&verts), Err(GeometryError::ZeroArea));
    }

    #[test]
    fn test_validate_line() {
        assert!(validate_line(Point::new(0.0, 0.0), Point::new(1.0, 0.0)).is_ok());
        assert_eq!(
            validate_line(Point::new(3.0, 3.0), Point::new(3.0, 3.0)),
            Err(GeometryError::DegenerateLine)
        );
    }
}
