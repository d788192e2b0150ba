//! HTTP adapter around the orchestration engine.
//!
//! # Endpoints
//!
//! - `GET  /health` : Liveness probe
//! - `POST /execute`: Run a prompt against a crew definition

pub mod routes;

pub use routes::{app_router, AppState, ExecuteRequest};
