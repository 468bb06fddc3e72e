//! Back-and-forth segment geometry.

use serde::{Deserialize, Serialize};

use crate::hardware::capabilities::Point;

/// A straight test segment, travelled start -> end -> start at `feedrate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSegment {
    /// Where each pass begins (`center - d`)
    pub start: Point,
    /// Far end of the pass (`center + d`)
    pub end: Point,
    /// Test speed (mm/s)
    pub feedrate: f64,
}

impl MotionSegment {
    /// Build the segment of a test pattern.
    ///
    /// The displacement is `(size/2 * cos(angle) * factor, size/2 * sin(angle) * factor)`
    /// and both endpoints are placed symmetrically around `center` (Z is kept from `center`).
    pub fn around(center: Point, size: f64, angle_deg: f64, factor: f64, feedrate: f64) -> Self {
        let (dx, dy) = displacement(size, angle_deg.to_radians(), factor);
        Self {
            start: Point::new(center.x - dx, center.y - dy, center.z),
            end: Point::new(center.x + dx, center.y + dy, center.z),
            feedrate,
        }
    }

    /// Segment length (mm)
    pub fn length(&self) -> f64 {
        (self.end.x - self.start.x).hypot(self.end.y - self.start.y)
    }

    /// Midpoint of the two endpoints
    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.start.x + self.end.x) / 2.0,
            (self.start.y + self.end.y) / 2.0,
            (self.start.z + self.end.z) / 2.0,
        )
    }
}

/// Half-segment displacement vector for an angle in radians.
pub fn displacement(size: f64, angle_rad: f64, factor: f64) -> (f64, f64) {
    let half = size / 2.0;
    (
        half * angle_rad.cos() * factor,
        half * angle_rad.sin() * factor,
    )
}
