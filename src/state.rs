//! Navigation state machine.
//!
//! [`NavModel`] is the synchronous core: every command validates the
//! current mode, mutates the model, and returns the side effects the
//! host must perform as explicit [`Effect`] values. Nothing here
//! touches the network or a map; the async shell in
//! [`crate::navigator`] executes the effects.

use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::geo::{Bounds, Coordinate, Position};
use crate::instructions::evaluate_instructions;
use crate::provider::{ProviderError, RouteQuery};
use crate::route::{Route, RouteSummary};
use crate::tracker::{locate_nearest_step, StepLocation, DEFAULT_GRACE_DISTANCE_M};

/// Routing profile used when the host sets none.
pub const DEFAULT_PROFILE: &str = "driving-traffic";
/// Camera defaults outside active navigation.
pub const DEFAULT_ZOOM: f64 = 10.0;
pub const DEFAULT_PITCH: f64 = 0.0;
/// Close, tilted follow camera used while navigating.
pub const FOLLOW_ZOOM: f64 = 20.0;
pub const FOLLOW_PITCH: f64 = 75.0;
/// A route request that takes longer than this is treated as failed.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The mode the component is in. Exactly one at a time; transitions
/// are the sole authority over which effects run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavMode {
    /// No destination set.
    Idle,
    /// A route request is in flight.
    Calculating,
    /// Route computed and rendered, not yet tracking.
    ViewRoute,
    /// Actively tracking the position against the route.
    Navigating,
}

/// Programmatic configuration surface. Each field is independently
/// settable at any time through the model.
#[derive(Debug, Clone)]
pub struct NavOptions {
    pub profile: String,
    pub zoom: f64,
    pub pitch: f64,
    pub grace_distance_m: f64,
    pub request_timeout: Duration,
    pub initial_position: Position,
}

impl Default for NavOptions {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            zoom: DEFAULT_ZOOM,
            pitch: DEFAULT_PITCH,
            grace_distance_m: DEFAULT_GRACE_DISTANCE_M,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            initial_position: Position::default(),
        }
    }
}

/// A camera command for the map collaborator. The core never reads
/// camera state back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub center: Coordinate,
    pub bearing: f64,
    pub zoom: f64,
    pub pitch: f64,
}

/// Side effects a command produced, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Redraw the heading-oriented position marker.
    DrawMarker(Position),
    /// Move the camera.
    FlyTo(CameraView),
    /// Render the route line.
    RenderRoute(Vec<Coordinate>),
    /// Frame the camera on the route extent.
    FitBounds(Bounds),
    /// The trip summary changed (new route applied).
    SummaryChanged(RouteSummary),
    /// Speak an instruction.
    Announce(String),
    /// Issue a directions request. Executed by the async shell.
    RequestRoute(RouteQuery),
    /// A route request failed; the previous mode and route remain.
    RouteFailed(String),
    /// The route is complete; navigation stopped.
    NavigationEnded,
}

/// Illegal command for the current mode.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("cannot start navigation while {0:?}")]
    NotViewingRoute(NavMode),
}

#[derive(Debug, Clone)]
struct PendingRequest {
    id: u64,
    refit_camera: bool,
    on_success: NavMode,
    on_failure: NavMode,
}

/// The navigation core.
pub struct NavModel {
    options: NavOptions,
    mode: NavMode,
    position: Position,
    target: Option<Coordinate>,
    route: Option<Route>,
    current_step: usize,
    next_request_id: u64,
    pending: Option<PendingRequest>,
}

impl NavModel {
    pub fn new(options: NavOptions) -> Self {
        let position = options.initial_position;
        Self {
            options,
            mode: NavMode::Idle,
            position,
            target: None,
            route: None,
            current_step: 0,
            next_request_id: 1,
            pending: None,
        }
    }

    pub fn mode(&self) -> NavMode {
        self.mode
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn target(&self) -> Option<Coordinate> {
        self.target
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn options(&self) -> &NavOptions {
        &self.options
    }

    pub fn set_profile(&mut self, profile: impl Into<String>) {
        self.options.profile = profile.into();
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.options.zoom = zoom;
    }

    pub fn set_pitch(&mut self, pitch: f64) {
        self.options.pitch = pitch;
    }

    pub fn set_grace_distance(&mut self, grace_m: f64) {
        self.options.grace_distance_m = grace_m;
    }

    /// Set the destination and request a route from the current
    /// position. Allowed in any mode; supersedes an in-flight request.
    /// On success the component enters `ViewRoute` with the camera fit
    /// to the route extent.
    pub fn set_target(&mut self, destination: Coordinate) -> Vec<Effect> {
        self.target = Some(destination);
        let query = self.begin_request(destination, true, NavMode::ViewRoute);
        vec![Effect::RequestRoute(query)]
    }

    /// Switch from route overview to turn-by-turn tracking.
    pub fn start_navigation(&mut self) -> Result<Vec<Effect>, NavError> {
        if self.mode != NavMode::ViewRoute {
            return Err(NavError::NotViewingRoute(self.mode));
        }
        self.mode = NavMode::Navigating;
        self.options.zoom = FOLLOW_ZOOM;
        self.options.pitch = FOLLOW_PITCH;
        info!("navigation started");
        Ok(vec![Effect::FlyTo(self.follow_camera())])
    }

    /// Feed a position fix. The marker is always redrawn; step
    /// evaluation and instruction dispatch run only while navigating.
    pub fn update_position(
        &mut self,
        location: Coordinate,
        bearing: Option<f64>,
    ) -> Vec<Effect> {
        self.position.location = location;
        if bearing.is_some() {
            self.position.bearing = bearing;
        }

        let mut effects = vec![Effect::DrawMarker(self.position)];
        match self.mode {
            NavMode::Navigating => {
                effects.push(Effect::FlyTo(self.follow_camera()));
                self.track(&mut effects);
            }
            NavMode::Calculating => {
                // Keep following the vehicle while a recalculation is
                // in flight, but never evaluate steps against the
                // stale route.
                let resuming = self
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.on_success == NavMode::Navigating);
                if resuming {
                    effects.push(Effect::FlyTo(self.follow_camera()));
                }
            }
            NavMode::ViewRoute | NavMode::Idle => {}
        }
        effects
    }

    /// Apply a provider response. Responses not matching the latest
    /// issued request id are stale and dropped.
    pub fn apply_route_response(
        &mut self,
        request_id: u64,
        result: Result<Route, ProviderError>,
    ) -> Vec<Effect> {
        let Some(pending) = self.pending.take() else {
            debug!("dropping route response {request_id}, no request pending");
            return Vec::new();
        };
        if pending.id != request_id {
            debug!(
                "dropping stale route response {request_id}, latest is {}",
                pending.id
            );
            self.pending = Some(pending);
            return Vec::new();
        }

        match result {
            Ok(mut route) => {
                route.reset_announcements();
                info!(
                    "route {request_id} applied: {:.0} m, {:.0} s",
                    route.distance_m, route.duration_s
                );

                let mut effects = vec![Effect::RenderRoute(route.geometry.clone())];
                if pending.refit_camera {
                    if let Some(bounds) = route.bounds() {
                        effects.push(Effect::FitBounds(bounds));
                    }
                }
                effects.push(Effect::SummaryChanged(route.summary()));

                self.route = Some(route);
                self.current_step = 0;
                self.mode = pending.on_success;
                if self.mode == NavMode::Navigating {
                    self.relocate_on_new_route(&mut effects);
                }
                effects
            }
            Err(err) => {
                warn!("route request {request_id} failed: {err}");
                self.mode = pending.on_failure;
                vec![Effect::RouteFailed(err.to_string())]
            }
        }
    }

    fn follow_camera(&self) -> CameraView {
        CameraView {
            center: self.position.location,
            bearing: self.position.effective_bearing(),
            zoom: self.options.zoom,
            pitch: self.options.pitch,
        }
    }

    fn begin_request(
        &mut self,
        destination: Coordinate,
        refit_camera: bool,
        on_success: NavMode,
    ) -> RouteQuery {
        let id = self.next_request_id;
        self.next_request_id += 1;

        // A superseded request keeps the original revert mode.
        let on_failure = match self.pending.take() {
            Some(previous) => {
                debug!("superseding route request {}", previous.id);
                previous.on_failure
            }
            None => self.mode,
        };
        self.pending = Some(PendingRequest {
            id,
            refit_camera,
            on_success,
            on_failure,
        });
        self.mode = NavMode::Calculating;

        info!(
            "requesting route {id} to {:.5},{:.5}",
            destination.lat, destination.lon
        );
        RouteQuery {
            request_id: id,
            origin: self.position.location,
            destination,
            profile: self.options.profile.clone(),
            bearing_hint: self.position.bearing,
        }
    }

    /// One tracking tick while navigating.
    fn track(&mut self, effects: &mut Vec<Effect>) {
        let location = self.position.location;
        let (located, last_step) = match &self.route {
            Some(route) => (
                locate_nearest_step(route, self.current_step, location),
                route.steps().len().saturating_sub(1),
            ),
            None => {
                warn!("position update while navigating without a route");
                return;
            }
        };

        let Some(found) = located else {
            self.finish_navigation(effects);
            return;
        };

        if found.is_off_route(self.options.grace_distance_m) {
            warn!(
                "off route at step {}: {:.1} m off, {:.1} m along",
                found.step_index, found.distance_off_route_m, found.distance_along_m
            );
            let Some(destination) = self.target else {
                warn!("off route with no destination, cannot recalculate");
                return;
            };
            let query = self.begin_request(destination, false, NavMode::Navigating);
            effects.push(Effect::RequestRoute(query));
            return;
        }

        self.current_step = found.step_index;
        self.dispatch_instructions(&found, effects);

        if found.step_index == last_step && found.distance_from_step_end_m <= 0.0 {
            self.finish_navigation(effects);
        }
    }

    /// After a recalculated route is applied mid-navigation, find the
    /// vehicle on it from the first step.
    fn relocate_on_new_route(&mut self, effects: &mut Vec<Effect>) {
        let location = self.position.location;
        let located = match &self.route {
            Some(route) => locate_nearest_step(route, 0, location),
            None => None,
        };
        match located {
            Some(found) => {
                self.current_step = found.step_index;
                self.dispatch_instructions(&found, effects);
            }
            None => self.finish_navigation(effects),
        }
    }

    fn dispatch_instructions(&mut self, found: &StepLocation, effects: &mut Vec<Effect>) {
        let Some(route) = self.route.as_mut() else {
            return;
        };
        let Some(step) = route.steps_mut().get_mut(found.step_index) else {
            return;
        };
        evaluate_instructions(step, found.distance_from_step_end_m, &mut |text| {
            effects.push(Effect::Announce(text.to_owned()));
        });
    }

    fn finish_navigation(&mut self, effects: &mut Vec<Effect>) {
        info!("route complete, ending navigation");
        self.mode = NavMode::Idle;
        self.pending = None;
        effects.push(Effect::NavigationEnded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{Leg, Step, VoiceInstruction};

    /// Degrees of longitude per meter along the equator.
    const DEG_PER_M: f64 = 1.0 / 111_194.9266;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate { lat, lon }
    }

    fn meters(east: f64, north: f64) -> Coordinate {
        coord(north * DEG_PER_M, east * DEG_PER_M)
    }

    /// Test route: 100 m east with a "Turn left" instruction due 40 m
    /// before the turn, then 200 m north with an arrival instruction.
    fn test_route(destination_name: &str) -> Route {
        let steps = vec![
            Step {
                geometry: vec![meters(0.0, 0.0), meters(100.0, 0.0)],
                distance_m: 100.0,
                voice_instructions: vec![VoiceInstruction::new(40.0, "Turn left")],
            },
            Step {
                geometry: vec![meters(100.0, 0.0), meters(100.0, 200.0)],
                distance_m: 200.0,
                voice_instructions: vec![VoiceInstruction::new(30.0, "You have arrived")],
            },
        ];
        Route {
            geometry: vec![meters(0.0, 0.0), meters(100.0, 0.0), meters(100.0, 200.0)],
            legs: vec![Leg {
                steps,
                distance_m: 300.0,
                duration_s: 120.0,
            }],
            distance_m: 300.0,
            duration_s: 120.0,
            origin_name: Some("Origin".to_string()),
            destination_name: Some(destination_name.to_string()),
        }
    }

    fn destination() -> Coordinate {
        meters(100.0, 200.0)
    }

    /// Model in `Navigating` on the test route.
    fn navigating_model() -> NavModel {
        let mut model = NavModel::new(NavOptions::default());
        let effects = model.set_target(destination());
        let id = request_id(&effects);
        model.apply_route_response(id, Ok(test_route("Schwedenplatz")));
        model.start_navigation().unwrap();
        model
    }

    fn request_id(effects: &[Effect]) -> u64 {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::RequestRoute(query) => Some(query.request_id),
                _ => None,
            })
            .expect("no RequestRoute effect")
    }

    fn announcements(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Announce(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn set_target_requests_route() {
        let mut model = NavModel::new(NavOptions::default());
        let effects = model.set_target(destination());

        assert_eq!(model.mode(), NavMode::Calculating);
        assert_eq!(effects.len(), 1);
        let Effect::RequestRoute(query) = &effects[0] else {
            panic!("expected RequestRoute, got {:?}", effects[0]);
        };
        assert_eq!(query.request_id, 1);
        assert_eq!(query.profile, DEFAULT_PROFILE);
        assert_eq!(query.origin, Position::default().location);
        assert_eq!(query.destination, destination());
    }

    #[test]
    fn profile_is_forwarded_verbatim() {
        let mut model = NavModel::new(NavOptions::default());
        model.set_profile("cycling");
        let effects = model.set_target(destination());

        let Effect::RequestRoute(query) = &effects[0] else {
            panic!("expected RequestRoute");
        };
        assert_eq!(query.profile, "cycling");
    }

    #[test]
    fn route_response_enters_view_route() {
        let mut model = NavModel::new(NavOptions::default());
        let effects = model.set_target(destination());
        let id = request_id(&effects);

        let effects = model.apply_route_response(id, Ok(test_route("Schwedenplatz")));

        assert_eq!(model.mode(), NavMode::ViewRoute);
        assert!(matches!(effects[0], Effect::RenderRoute(_)));
        assert!(effects.iter().any(|e| matches!(e, Effect::FitBounds(_))));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::SummaryChanged(summary)
                if summary.destination.as_deref() == Some("Schwedenplatz")
        )));
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut model = NavModel::new(NavOptions::default());
        let first = request_id(&model.set_target(meters(500.0, 0.0)));
        let second = request_id(&model.set_target(destination()));

        let effects = model.apply_route_response(first, Ok(test_route("Stale")));
        assert!(effects.is_empty());
        assert_eq!(model.mode(), NavMode::Calculating);
        assert!(model.route().is_none());

        model.apply_route_response(second, Ok(test_route("Fresh")));
        assert_eq!(model.mode(), NavMode::ViewRoute);
        assert_eq!(
            model.route().unwrap().destination_name.as_deref(),
            Some("Fresh")
        );
    }

    #[test]
    fn unsolicited_response_is_discarded() {
        let mut model = NavModel::new(NavOptions::default());
        let effects = model.apply_route_response(7, Ok(test_route("Nobody asked")));
        assert!(effects.is_empty());
        assert_eq!(model.mode(), NavMode::Idle);
        assert!(model.route().is_none());
    }

    #[test]
    fn failure_reverts_to_previous_mode() {
        let mut model = NavModel::new(NavOptions::default());
        let id = request_id(&model.set_target(destination()));
        let effects =
            model.apply_route_response(id, Err(ProviderError::Network("boom".into())));

        assert_eq!(model.mode(), NavMode::Idle);
        assert!(matches!(&effects[0], Effect::RouteFailed(msg) if msg.contains("boom")));

        // With a route on screen, failure keeps it.
        let id = request_id(&model.set_target(destination()));
        model.apply_route_response(id, Ok(test_route("Schwedenplatz")));
        let id = request_id(&model.set_target(meters(900.0, 0.0)));
        model.apply_route_response(id, Err(ProviderError::Timeout));

        assert_eq!(model.mode(), NavMode::ViewRoute);
        assert_eq!(
            model.route().unwrap().destination_name.as_deref(),
            Some("Schwedenplatz")
        );
    }

    #[test]
    fn start_navigation_requires_view_route() {
        let mut model = NavModel::new(NavOptions::default());
        assert!(matches!(
            model.start_navigation(),
            Err(NavError::NotViewingRoute(NavMode::Idle))
        ));

        let id = request_id(&model.set_target(destination()));
        model.apply_route_response(id, Ok(test_route("Schwedenplatz")));
        let effects = model.start_navigation().unwrap();

        assert_eq!(model.mode(), NavMode::Navigating);
        let Effect::FlyTo(view) = &effects[0] else {
            panic!("expected FlyTo");
        };
        assert_eq!(view.zoom, FOLLOW_ZOOM);
        assert_eq!(view.pitch, FOLLOW_PITCH);
    }

    #[test]
    fn idle_position_update_only_draws_marker() {
        let mut model = NavModel::new(NavOptions::default());
        let effects = model.update_position(meters(10.0, 0.0), Some(90.0));

        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::DrawMarker(_)));
        assert_eq!(model.position().bearing, Some(90.0));
    }

    #[test]
    fn bearing_is_kept_when_fix_has_none() {
        let mut model = NavModel::new(NavOptions::default());
        model.update_position(meters(10.0, 0.0), Some(45.0));
        model.update_position(meters(20.0, 0.0), None);
        assert_eq!(model.position().bearing, Some(45.0));
    }

    #[test]
    fn navigating_tick_tracks_and_announces_once() {
        let mut model = navigating_model();

        // 50 m into step 0: instruction due at 40 m remaining, not yet.
        let effects = model.update_position(meters(50.0, 0.0), Some(90.0));
        assert!(matches!(effects[0], Effect::DrawMarker(_)));
        assert!(matches!(effects[1], Effect::FlyTo(_)));
        assert!(announcements(&effects).is_empty());
        assert_eq!(model.current_step(), 0);

        // 70 m in: 30 m remaining, fires.
        let effects = model.update_position(meters(70.0, 0.0), Some(90.0));
        assert_eq!(announcements(&effects), vec!["Turn left"]);

        // Still 70 m in: never fires twice.
        let effects = model.update_position(meters(70.0, 0.0), Some(90.0));
        assert!(announcements(&effects).is_empty());
        assert_eq!(model.mode(), NavMode::Navigating);
    }

    #[test]
    fn advancing_to_next_step_moves_current_index() {
        let mut model = navigating_model();
        model.update_position(meters(50.0, 0.0), None);
        assert_eq!(model.current_step(), 0);

        model.update_position(meters(100.0, 50.0), None);
        assert_eq!(model.current_step(), 1);
    }

    #[test]
    fn drift_triggers_recalculation_without_refit() {
        let mut model = navigating_model();

        // 20 m perpendicular off the first step.
        let effects = model.update_position(meters(50.0, 20.0), Some(90.0));
        assert_eq!(model.mode(), NavMode::Calculating);
        let Some(Effect::RequestRoute(query)) = effects.last() else {
            panic!("expected RequestRoute, got {:?}", effects.last());
        };
        assert_eq!(query.bearing_hint, Some(90.0));
        assert_eq!(query.destination, destination());

        // While recalculating, ticks follow the camera but never track.
        let effects = model.update_position(meters(55.0, 20.0), None);
        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0], Effect::DrawMarker(_)));
        assert!(matches!(effects[1], Effect::FlyTo(_)));

        // The fresh route resumes navigation with a reset step index,
        // no camera refit.
        let effects = model.apply_route_response(query.request_id, Ok(test_route("Fresh")));
        assert_eq!(model.mode(), NavMode::Navigating);
        assert!(!effects.iter().any(|e| matches!(e, Effect::FitBounds(_))));
        assert_eq!(model.current_step(), 0);
    }

    #[test]
    fn within_grace_distance_stays_on_route() {
        let mut model = navigating_model();
        // 14 m perpendicular: inside the 15 m grace margin.
        model.update_position(meters(50.0, 14.0), None);
        assert_eq!(model.mode(), NavMode::Navigating);
    }

    #[test]
    fn custom_grace_distance_applies() {
        let mut model = navigating_model();
        model.set_grace_distance(30.0);
        model.update_position(meters(50.0, 20.0), None);
        assert_eq!(model.mode(), NavMode::Navigating);
    }

    #[test]
    fn new_route_resets_announcements() {
        let mut model = navigating_model();
        let effects = model.update_position(meters(70.0, 0.0), None);
        assert_eq!(announcements(&effects), vec!["Turn left"]);

        // Drift off and accept a recalculated route with identical
        // steps: the instruction is live again.
        model.update_position(meters(50.0, 40.0), None);
        let id = model.next_request_id - 1;
        let mut replacement = test_route("Fresh");
        replacement.steps_mut()[0].voice_instructions[0].mark_announced();
        let effects = model.apply_route_response(id, Ok(replacement));

        // Relocation happens from the drift position (40 m off step 0,
        // so no instruction fires there yet).
        assert!(announcements(&effects).is_empty());
        let route = model.route().unwrap();
        assert!(!route.steps()[0].voice_instructions[0].is_announced());
    }

    #[test]
    fn passing_final_step_end_completes_navigation() {
        let mut model = navigating_model();

        // 10 m past the end of the final step.
        let effects = model.update_position(meters(100.0, 210.0), None);
        assert_eq!(model.mode(), NavMode::Idle);
        assert!(effects.contains(&Effect::NavigationEnded));
        // The arrival instruction still fired on the way out.
        assert_eq!(announcements(&effects), vec!["You have arrived"]);
        // Route is retained for display.
        assert!(model.route().is_some());
    }

    #[test]
    fn initial_calculation_does_not_follow_camera() {
        let mut model = NavModel::new(NavOptions::default());
        model.set_target(destination());

        let effects = model.update_position(meters(10.0, 0.0), None);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::DrawMarker(_)));
    }

    #[test]
    fn ticks_after_completion_only_draw_marker() {
        let mut model = navigating_model();
        model.update_position(meters(100.0, 210.0), None);

        let effects = model.update_position(meters(100.0, 220.0), None);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::DrawMarker(_)));
    }
}
