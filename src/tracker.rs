//! Step tracking.
//!
//! Locates the vehicle on a route: which step it is on, how far along,
//! and how far off the planned line. The search assumes monotonic
//! forward progress and only looks at a bounded window of upcoming
//! steps.

use log::debug;

use crate::geo::{haversine, Coordinate};
use crate::route::Route;

/// Number of steps examined ahead of the current one.
pub const STEP_SEARCH_WINDOW: usize = 10;

/// Off-route grace distance in meters. Absorbs GPS jitter.
pub const DEFAULT_GRACE_DISTANCE_M: f64 = 15.0;

/// Chords shorter than this are degenerate and skipped.
const MIN_CHORD_M: f64 = 1e-6;

/// Result of locating the vehicle on a route.
#[derive(Debug, Clone, PartialEq)]
pub struct StepLocation {
    /// Index of the selected step within leg 0.
    pub step_index: usize,
    /// Signed projection of the vehicle onto the step chord, measured
    /// from the step start. Negative when the vehicle is behind it.
    pub distance_along_m: f64,
    /// Perpendicular distance from the step chord.
    pub distance_off_route_m: f64,
    /// Remaining distance to the step end, using the step's reported
    /// along-road length.
    pub distance_from_step_end_m: f64,
}

impl StepLocation {
    /// Whether the vehicle has left the planned route.
    ///
    /// True when it sits farther than `grace_m` from the step chord, or
    /// appears behind the step start by more than the same margin.
    pub fn is_off_route(&self, grace_m: f64) -> bool {
        self.distance_off_route_m > grace_m || self.distance_along_m < -grace_m
    }
}

/// Locate the nearest step within the search window.
///
/// Examines steps `[search_start, search_start + STEP_SEARCH_WINDOW)`
/// clipped to the bounds of leg 0, projecting the location onto each
/// step's start-to-end chord with the law of cosines. The candidate
/// with the smallest perpendicular distance wins; ties keep the lowest
/// index.
///
/// Returns `None` when the window holds no usable step (route
/// exhausted, or only zero-length geometry remains), which callers
/// treat as route completion.
pub fn locate_nearest_step(
    route: &Route,
    search_start: usize,
    location: Coordinate,
) -> Option<StepLocation> {
    let steps = route.steps();
    let window_end = steps
        .len()
        .min(search_start.saturating_add(STEP_SEARCH_WINDOW));

    let mut best: Option<StepLocation> = None;

    for (index, step) in steps
        .iter()
        .enumerate()
        .take(window_end)
        .skip(search_start)
    {
        let (Some(start), Some(end)) = (step.start(), step.end()) else {
            continue;
        };

        let c = haversine(start, end);
        if c < MIN_CHORD_M {
            debug!("skipping degenerate step {index}");
            continue;
        }
        let a = haversine(start, location);
        let b = haversine(end, location);

        // Law of cosines on the (start, end, vehicle) triangle.
        let distance_along_m = (a * a - b * b + c * c) / (2.0 * c);
        // Clamped against negative-sqrt from floating error.
        let distance_off_route_m =
            (a * a - distance_along_m * distance_along_m).max(0.0).sqrt();

        let is_better = match &best {
            Some(prev) => distance_off_route_m < prev.distance_off_route_m,
            None => true,
        };

        if is_better {
            best = Some(StepLocation {
                step_index: index,
                distance_along_m,
                distance_off_route_m,
                distance_from_step_end_m: step.distance_m - distance_along_m,
            });
        }
    }

    best
}
