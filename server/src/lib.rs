//! Estimation server: configuration loading and component wiring.

pub mod app;
pub mod config;

pub use app::{build_state, preload_assets};
pub use config::{CliArgs, ServerConfig};
