//! Route data model and directions-response decoding.
//!
//! Decodes a directions API response (JSON) into serializable route
//! structures the tracker operates on. The HTTP request itself lives
//! behind the [`crate::provider::RouteProvider`] seam; this module only
//! owns the output contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{Bounds, Coordinate};

/// A spoken announcement with its trigger point.
///
/// The trigger distance is measured backward from the end of the owning
/// step: the announcement becomes due once the remaining distance to the
/// step end drops below it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInstruction {
    pub trigger_distance_m: f64,
    pub announcement: String,
    #[serde(default)]
    announced: bool,
}

impl VoiceInstruction {
    pub fn new(trigger_distance_m: f64, announcement: impl Into<String>) -> Self {
        Self {
            trigger_distance_m,
            announcement: announcement.into(),
            announced: false,
        }
    }

    pub fn is_announced(&self) -> bool {
        self.announced
    }

    /// Flips the announced flag. Never unset again while the owning
    /// route is loaded; only route replacement resets it.
    pub(crate) fn mark_announced(&mut self) {
        self.announced = true;
    }

    pub(crate) fn reset(&mut self) {
        self.announced = false;
    }
}

/// A maneuver-bounded subsection of a leg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step polyline, ordered start to end. Meaningful steps have at
    /// least 2 points.
    pub geometry: Vec<Coordinate>,
    /// Along-road step length as reported by the directions API.
    pub distance_m: f64,
    pub voice_instructions: Vec<VoiceInstruction>,
}

impl Step {
    pub fn start(&self) -> Option<Coordinate> {
        self.geometry.first().copied()
    }

    pub fn end(&self) -> Option<Coordinate> {
        self.geometry.last().copied()
    }
}

/// One origin-to-destination segment of a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub steps: Vec<Step>,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// A complete routing result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Overview polyline for rendering the route line.
    pub geometry: Vec<Coordinate>,
    pub legs: Vec<Leg>,
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
}

impl Route {
    /// Steps of the first leg. Only leg 0 is tracked.
    pub fn steps(&self) -> &[Step] {
        self.legs.first().map(|l| l.steps.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        self.legs
            .first_mut()
            .map(|l| l.steps.as_mut_slice())
            .unwrap_or(&mut [])
    }

    /// Bounding box of the overview geometry, for camera fitting.
    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coordinates(self.geometry.iter().copied())
    }

    /// Marks every instruction unannounced. Applied when the route is
    /// (re)loaded so a replacement always starts from a clean slate.
    pub(crate) fn reset_announcements(&mut self) {
        for leg in &mut self.legs {
            for step in &mut leg.steps {
                for instruction in &mut step.voice_instructions {
                    instruction.reset();
                }
            }
        }
    }

    /// Human-readable trip summary for the host's info display.
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            origin: self.origin_name.clone(),
            destination: self.destination_name.clone(),
            distance_text: format_distance(self.distance_m),
            duration_text: format_duration(self.duration_s),
        }
    }

    /// Decode a directions API response document.
    ///
    /// Takes the first route and the first/last waypoint names as the
    /// origin/destination labels.
    pub fn from_directions_json(data: &str) -> Result<Route, RouteParseError> {
        let response: DirectionsResponse = serde_json::from_str(data)?;
        let raw = response
            .routes
            .into_iter()
            .next()
            .ok_or(RouteParseError::NoRoutes)?;

        let legs = raw
            .legs
            .into_iter()
            .map(|leg| Leg {
                steps: leg
                    .steps
                    .into_iter()
                    .map(|step| Step {
                        geometry: step.geometry.into_coordinates(),
                        distance_m: step.distance,
                        voice_instructions: step
                            .voice_instructions
                            .into_iter()
                            .map(|v| VoiceInstruction::new(
                                v.distance_along_geometry,
                                v.announcement,
                            ))
                            .collect(),
                    })
                    .collect(),
                distance_m: leg.distance,
                duration_s: leg.duration,
            })
            .collect();

        let mut waypoint_names = response
            .waypoints
            .into_iter()
            .map(|w| w.name.filter(|n| !n.is_empty()));
        let origin_name = waypoint_names.next().flatten();
        let destination_name = waypoint_names.last().flatten();

        Ok(Route {
            geometry: raw.geometry.into_coordinates(),
            legs,
            distance_m: raw.distance,
            duration_s: raw.duration,
            origin_name,
            destination_name,
        })
    }
}

/// Info-display content derived from a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub distance_text: String,
    pub duration_text: String,
}

/// Errors decoding a directions response.
#[derive(Debug, Error)]
pub enum RouteParseError {
    #[error("directions parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("directions response contains no routes")]
    NoRoutes,
}

fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", (meters / 10.0).round() as i64 * 10)
    }
}

fn format_duration(seconds: f64) -> String {
    let total_minutes = (seconds / 60.0).floor() as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{hours}:{minutes:02}")
}

// Wire shape of the directions response. Coordinates arrive GeoJSON
// style as [lon, lat] pairs.

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    routes: Vec<RawRoute>,
    #[serde(default)]
    waypoints: Vec<RawWaypoint>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    geometry: RawGeometry,
    legs: Vec<RawLeg>,
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct RawLeg {
    steps: Vec<RawStep>,
    distance: f64,
    duration: f64,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    geometry: RawGeometry,
    distance: f64,
    #[serde(default, rename = "voiceInstructions")]
    voice_instructions: Vec<RawVoiceInstruction>,
}

#[derive(Debug, Deserialize)]
struct RawVoiceInstruction {
    #[serde(rename = "distanceAlongGeometry")]
    distance_along_geometry: f64,
    announcement: String,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl RawGeometry {
    fn into_coordinates(self) -> Vec<Coordinate> {
        self.coordinates
            .into_iter()
            .map(|[lon, lat]| Coordinate { lat, lon })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawWaypoint {
    #[serde(default)]
    name: Option<String>,
}
