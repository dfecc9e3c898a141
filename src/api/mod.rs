//! HTTP API.

pub mod routes;

pub use routes::{AdvanceRequest, ApiState, api_routes, status_for};
