//! Mock control plane for rigger.
//!
//! Serves the resource API that `HttpControlPlane` speaks, backed by memory,
//! with optional bearer token auth and per-resource fault injection.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
