//! Geographic primitives.
//!
//! Platform-agnostic coordinate and distance computations. All
//! coordinates use WGS84 (lat/lon in degrees).

use serde::{Deserialize, Serialize};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// A vehicle fix: location plus optional compass heading.
///
/// Bearing is in degrees clockwise from north. GPS fixes without a
/// usable heading (stationary vehicle, cold start) carry `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub location: Coordinate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
}

impl Position {
    pub fn new(location: Coordinate, bearing: Option<f64>) -> Self {
        Self { location, bearing }
    }

    /// Heading for camera and marker orientation, north-up when unknown.
    pub fn effective_bearing(&self) -> f64 {
        normalize_bearing(self.bearing.unwrap_or(0.0))
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            location: Coordinate { lat: 0.0, lon: 0.0 },
            bearing: None,
        }
    }
}

/// Earth radius in meters (WGS84 mean).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Haversine distance between two coordinates in meters.
pub fn haversine(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();

    let h = (dlat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Normalize a bearing to [0, 360).
pub fn normalize_bearing(degrees: f64) -> f64 {
    degrees.rem_euclid(360.0)
}

/// Axis-aligned lat/lon bounding box.
///
/// Used to fit the camera to a route extent. The host applies its own
/// screen padding when framing the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south_west: Coordinate,
    pub north_east: Coordinate,
}

impl Bounds {
    /// Bounding box of a coordinate sequence, or None when empty.
    pub fn from_coordinates<I>(coordinates: I) -> Option<Self>
    where
        I: IntoIterator<Item = Coordinate>,
    {
        let mut iter = coordinates.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds {
            south_west: first,
            north_east: first,
        };
        for c in iter {
            bounds.south_west.lat = bounds.south_west.lat.min(c.lat);
            bounds.south_west.lon = bounds.south_west.lon.min(c.lon);
            bounds.north_east.lat = bounds.north_east.lat.max(c.lat);
            bounds.north_east.lon = bounds.north_east.lon.max(c.lon);
        }
        Some(bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    #[test]
    fn haversine_same_point() {
        let p = coord(48.2082, 16.3738);
        assert!(haversine(p, p).abs() < 0.01);
    }

    #[test]
    fn haversine_known_distance() {
        // Vienna to Bratislava ~55 km
        let vienna = coord(48.2082, 16.3738);
        let bratislava = coord(48.1486, 17.1077);
        let dist = haversine(vienna, bratislava);
        assert!(dist > 50_000.0 && dist < 60_000.0,
            "Expected ~55 km, got {:.0} m", dist);
    }

    #[test]
    fn haversine_symmetric() {
        let a = coord(48.0, 16.0);
        let b = coord(49.0, 17.0);
        assert!((haversine(a, b) - haversine(b, a)).abs() < 1e-6);
    }

    #[test]
    fn haversine_antipodal() {
        let a = coord(0.0, 0.0);
        let b = coord(0.0, 180.0);
        let dist = haversine(a, b);
        // Half the Earth's circumference, and finite
        assert!(dist.is_finite());
        assert!(dist > 20_000_000.0 && dist < 20_040_000.0,
            "Expected ~20,015 km, got {:.0} m", dist);
    }

    #[test]
    fn normalize_wraps_negative() {
        assert!((normalize_bearing(-90.0) - 270.0).abs() < 1e-9);
        assert!((normalize_bearing(720.0)).abs() < 1e-9);
        assert!((normalize_bearing(360.0)).abs() < 1e-9);
    }

    #[test]
    fn effective_bearing_defaults_north() {
        let pos = Position::new(coord(48.0, 16.0), None);
        assert_eq!(pos.effective_bearing(), 0.0);

        let pos = Position::new(coord(48.0, 16.0), Some(-45.0));
        assert!((pos.effective_bearing() - 315.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_of_polyline() {
        let bounds = Bounds::from_coordinates(vec![
            coord(48.0, 16.5),
            coord(48.4, 16.0),
            coord(48.2, 17.0),
        ])
        .unwrap();

        assert!((bounds.south_west.lat - 48.0).abs() < 1e-9);
        assert!((bounds.south_west.lon - 16.0).abs() < 1e-9);
        assert!((bounds.north_east.lat - 48.4).abs() < 1e-9);
        assert!((bounds.north_east.lon - 17.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_of_empty_sequence() {
        assert!(Bounds::from_coordinates(Vec::new()).is_none());
    }
}
