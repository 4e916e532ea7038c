//! HTTP Surface (§6.1): four endpoints wired to the core pipeline.

pub mod handlers;
pub mod routes;

pub use routes::{build_router, AppState};
