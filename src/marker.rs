//! Position-marker glyph geometry.
//!
//! Pure construction of the heading arrow the host rasterizes over the
//! map. The glyph lives on a square canvas and rotates about its
//! center to match the vehicle bearing; no drawing state is kept here.

use crate::geo::normalize_bearing;

/// Side length of the glyph canvas in pixels.
pub const GLYPH_SIZE: f64 = 100.0;

/// A point in glyph canvas space (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    fn rotated_around(self, center: Point2, radians: f64) -> Point2 {
        let x = self.x - center.x;
        let y = self.y - center.y;
        let (sin, cos) = radians.sin_cos();
        Point2 {
            x: x * cos - y * sin + center.x,
            y: x * sin + y * cos + center.y,
        }
    }
}

/// Arrow outline before rotation, pointing up on the canvas.
const ARROW: [Point2; 4] = [
    Point2 { x: 30.0, y: 10.0 },
    Point2 { x: 50.0, y: 30.0 },
    Point2 { x: 70.0, y: 10.0 },
    Point2 { x: 50.0, y: 80.0 },
];

/// Outline of the marker glyph rotated to the given bearing.
///
/// The bearing is normalized to [0, 360); 0 keeps the arrow north-up.
pub fn marker_glyph(bearing_deg: f64) -> [Point2; 4] {
    let phi = normalize_bearing(bearing_deg).to_radians();
    let center = Point2 {
        x: GLYPH_SIZE / 2.0,
        y: GLYPH_SIZE / 2.0,
    };
    ARROW.map(|p| p.rotated_around(center, phi))
}
