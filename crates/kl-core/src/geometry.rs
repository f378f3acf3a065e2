use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in world coordinates, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
}

impl Point {
    /// Create a point from its coordinates.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Absolute angle of the vector from this point to `other`, in radians.
    pub fn angle_to(&self, other: Point) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// The point reached by travelling `distance` along `heading`.
    pub fn advance(&self, heading: f64, distance: f64) -> Point {
        Point::new(
            self.x + heading.cos() * distance,
            self.y + heading.sin() * distance,
        )
    }
}

/// Position and heading of a model. `a` is in radians, counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
    /// Heading in radians.
    pub a: f64,
}

impl Pose {
    /// Create a pose from coordinates and a heading in radians.
    pub fn new(x: f64, y: f64, a: f64) -> Self {
        Self { x, y, a }
    }

    /// The position part of the pose.
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Transform a pose expressed in this pose's frame into the outer frame.
    pub fn compose(&self, local: &Pose) -> Pose {
        let (sin, cos) = self.a.sin_cos();
        Pose {
            x: self.x + local.x * cos - local.y * sin,
            y: self.y + local.x * sin + local.y * cos,
            a: normalize_angle(self.a + local.a),
        }
    }

    /// Bearing of `target` relative to this pose's heading, in `[-PI, PI]`.
    pub fn bearing_to(&self, target: Point) -> f64 {
        normalize_angle(self.point().angle_to(target) - self.a)
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.1}\u{b0})",
            self.x,
            self.y,
            self.a.to_degrees()
        )
    }
}

/// Width (`x`) and depth (`y`) of a model's bounding rectangle, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Extent along the model's heading.
    pub x: f64,
    /// Extent across the model's heading.
    pub y: f64,
}

impl Size {
    /// Create a size from its extents.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Half of the larger extent; a cheap radius for visibility estimates.
    pub fn radius(&self) -> f64 {
        self.x.max(self.y) / 2.0
    }
}

/// Wrap an angle into `[-PI, PI]`.
pub fn normalize_angle(a: f64) -> f64 {
    let mut a = a % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Corners of an oriented rectangle centred on `pose`, counter-clockwise.
pub fn rect_corners(pose: &Pose, size: Size) -> [Point; 4] {
    let hx = size.x / 2.0;
    let hy = size.y / 2.0;
    [(-hx, -hy), (hx, -hy), (hx, hy), (-hx, hy)].map(|(x, y)| {
        let p = pose.compose(&Pose::new(x, y, 0.0));
        p.point()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn compose_rotates_local_offset() {
        let parent = Pose::new(1.0, 1.0, PI / 2.0);
        let child = parent.compose(&Pose::new(1.0, 0.0, 0.0));
        assert!((child.x - 1.0).abs() < EPS);
        assert!((child.y - 2.0).abs() < EPS);
        assert!((child.a - PI / 2.0).abs() < EPS);
    }

    #[test]
    fn normalize_wraps_both_directions() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < EPS);
        assert!((normalize_angle(-1.5 * PI) - 0.5 * PI).abs() < EPS);
        assert!((normalize_angle(0.25) - 0.25).abs() < EPS);
    }

    #[test]
    fn bearing_is_relative_to_heading() {
        let pose = Pose::new(0.0, 0.0, PI / 2.0);
        let bearing = pose.bearing_to(Point::new(1.0, 0.0));
        assert!((bearing + PI / 2.0).abs() < EPS);
    }

    #[test]
    fn rect_corners_of_axis_aligned_box() {
        let corners = rect_corners(&Pose::new(2.0, 0.0, 0.0), Size::new(1.0, 0.5));
        assert!((corners[0].x - 1.5).abs() < EPS);
        assert!((corners[0].y + 0.25).abs() < EPS);
        assert!((corners[2].x - 2.5).abs() < EPS);
        assert!((corners[2].y - 0.25).abs() < EPS);
    }

    #[test]
    fn advance_moves_along_heading() {
        let p = Point::new(0.0, 0.0).advance(0.0, 3.0);
        assert!((p.x - 3.0).abs() < EPS);
        assert!(p.y.abs() < EPS);
    }
}
