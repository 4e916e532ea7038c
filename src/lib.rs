// Library exports for testing and for the `gatewayd` binary.

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod healing;
pub mod history;
pub mod model_resolution;
pub mod ollama;
pub mod output;
pub mod schema;
pub mod streaming;
pub mod tokens;
pub mod types;
