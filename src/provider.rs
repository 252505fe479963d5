//! Route provider seam.
//!
//! The directions backend stays a black box behind [`RouteProvider`]:
//! the core hands it a query and consumes the decoded [`Route`] it
//! returns. Hosts plug in their HTTP client of choice.

use async_trait::async_trait;
use thiserror::Error;

use crate::geo::Coordinate;
use crate::route::{Route, RouteParseError};

/// Parameters of one directions request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteQuery {
    /// Monotonically increasing id; the latest issued id is the only
    /// one whose response will be applied.
    pub request_id: u64,
    pub origin: Coordinate,
    pub destination: Coordinate,
    /// Routing profile token, forwarded verbatim to the backend.
    pub profile: String,
    /// Current vehicle heading, when known.
    pub bearing_hint: Option<f64>,
}

/// Errors a provider can surface.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("directions request timed out")]
    Timeout,
    #[error(transparent)]
    Parse(#[from] RouteParseError),
}

/// Asynchronous directions backend.
#[async_trait]
pub trait RouteProvider: Send + Sync + 'static {
    async fn request_route(&self, query: &RouteQuery) -> Result<Route, ProviderError>;
}
