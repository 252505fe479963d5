pub mod geo;
pub mod instructions;
pub mod marker;
pub mod navigator;
pub mod provider;
pub mod route;
pub mod state;
pub mod tracker;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
