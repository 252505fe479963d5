//! Async navigation shell.
//!
//! Drives [`NavModel`] on a single logical timeline: host commands and
//! provider responses arrive on one channel and are applied in order,
//! so position handling never races a route response. Route requests
//! run as tokio tasks wrapped in a timeout and are aborted when a
//! newer request supersedes them; the request-id guard in the core
//! drops any stale completion that slips through regardless.

use std::sync::Arc;

use log::{debug, warn};
use tokio::task::JoinHandle;

use crate::geo::{Bounds, Coordinate, Position};
use crate::provider::{ProviderError, RouteProvider, RouteQuery};
use crate::route::{Route, RouteSummary};
use crate::state::{CameraView, Effect, NavModel, NavOptions};

/// Host-implemented rendering and speech seams.
///
/// Every method has an empty default body; an embedding surface
/// overrides only what it renders.
pub trait NavSink: Send {
    fn render_route(&mut self, _geometry: &[Coordinate]) {}
    fn fit_bounds(&mut self, _bounds: Bounds) {}
    fn fly_to(&mut self, _view: CameraView) {}
    fn draw_marker(&mut self, _position: Position) {}
    fn announce(&mut self, _text: &str) {}
    fn summary_changed(&mut self, _summary: &RouteSummary) {}
    fn route_failed(&mut self, _message: &str) {}
    fn navigation_ended(&mut self) {}
}

/// Commands accepted by the navigator loop.
#[derive(Debug)]
pub enum NavCommand {
    SetTarget(Coordinate),
    StartNavigation,
    UpdatePosition {
        location: Coordinate,
        bearing: Option<f64>,
    },
    SetProfile(String),
    SetZoom(f64),
    SetPitch(f64),
    RouteResponse {
        request_id: u64,
        result: Result<Route, ProviderError>,
    },
    Shutdown,
}

/// Clonable command surface handed to the host.
#[derive(Clone)]
pub struct NavHandle {
    tx: flume::Sender<NavCommand>,
}

impl NavHandle {
    pub fn set_target(&self, destination: Coordinate) {
        self.send(NavCommand::SetTarget(destination));
    }

    pub fn start_navigation(&self) {
        self.send(NavCommand::StartNavigation);
    }

    pub fn update_position(&self, location: Coordinate, bearing: Option<f64>) {
        self.send(NavCommand::UpdatePosition { location, bearing });
    }

    pub fn set_profile(&self, profile: impl Into<String>) {
        self.send(NavCommand::SetProfile(profile.into()));
    }

    pub fn set_zoom(&self, zoom: f64) {
        self.send(NavCommand::SetZoom(zoom));
    }

    pub fn set_pitch(&self, pitch: f64) {
        self.send(NavCommand::SetPitch(pitch));
    }

    pub fn shutdown(&self) {
        self.send(NavCommand::Shutdown);
    }

    fn send(&self, command: NavCommand) {
        if self.tx.send(command).is_err() {
            warn!("navigator loop is gone, dropping command");
        }
    }
}

/// The navigation component: state core plus request plumbing.
pub struct Navigator<P: RouteProvider> {
    model: NavModel,
    provider: Arc<P>,
    tx: flume::Sender<NavCommand>,
    rx: flume::Receiver<NavCommand>,
    inflight: Option<JoinHandle<()>>,
}

impl<P: RouteProvider> Navigator<P> {
    pub fn new(provider: P, options: NavOptions) -> (Self, NavHandle) {
        let (tx, rx) = flume::unbounded();
        let handle = NavHandle { tx: tx.clone() };
        let navigator = Self {
            model: NavModel::new(options),
            provider: Arc::new(provider),
            tx,
            rx,
            inflight: None,
        };
        (navigator, handle)
    }

    pub fn model(&self) -> &NavModel {
        &self.model
    }

    /// Consume commands until [`NavHandle::shutdown`] is called,
    /// dispatching effects to the sink as they are produced.
    pub async fn run<S: NavSink>(mut self, mut sink: S) {
        while let Ok(command) = self.rx.recv_async().await {
            if matches!(command, NavCommand::Shutdown) {
                break;
            }
            for effect in self.apply(command) {
                self.perform(effect, &mut sink);
            }
        }
        if let Some(inflight) = self.inflight.take() {
            inflight.abort();
        }
    }

    fn apply(&mut self, command: NavCommand) -> Vec<Effect> {
        match command {
            NavCommand::SetTarget(destination) => self.model.set_target(destination),
            NavCommand::StartNavigation => match self.model.start_navigation() {
                Ok(effects) => effects,
                Err(err) => {
                    warn!("{err}");
                    Vec::new()
                }
            },
            NavCommand::UpdatePosition { location, bearing } => {
                self.model.update_position(location, bearing)
            }
            NavCommand::SetProfile(profile) => {
                self.model.set_profile(profile);
                Vec::new()
            }
            NavCommand::SetZoom(zoom) => {
                self.model.set_zoom(zoom);
                Vec::new()
            }
            NavCommand::SetPitch(pitch) => {
                self.model.set_pitch(pitch);
                Vec::new()
            }
            NavCommand::RouteResponse { request_id, result } => {
                self.model.apply_route_response(request_id, result)
            }
            NavCommand::Shutdown => Vec::new(),
        }
    }

    fn perform<S: NavSink>(&mut self, effect: Effect, sink: &mut S) {
        match effect {
            Effect::RequestRoute(query) => self.spawn_request(query),
            Effect::DrawMarker(position) => sink.draw_marker(position),
            Effect::FlyTo(view) => sink.fly_to(view),
            Effect::RenderRoute(geometry) => sink.render_route(&geometry),
            Effect::FitBounds(bounds) => sink.fit_bounds(bounds),
            Effect::SummaryChanged(summary) => sink.summary_changed(&summary),
            Effect::Announce(text) => sink.announce(&text),
            Effect::RouteFailed(message) => sink.route_failed(&message),
            Effect::NavigationEnded => sink.navigation_ended(),
        }
    }

    fn spawn_request(&mut self, query: RouteQuery) {
        if let Some(previous) = self.inflight.take() {
            debug!("aborting superseded route request task");
            previous.abort();
        }

        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();
        let timeout = self.model.options().request_timeout;
        self.inflight = Some(tokio::spawn(async move {
            let request_id = query.request_id;
            let result =
                match tokio::time::timeout(timeout, provider.request_route(&query)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout),
                };
            let _ = tx.send(NavCommand::RouteResponse { request_id, result });
        }));
    }
}
