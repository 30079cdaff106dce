//! Process host for the Portal URL shortener.
//!
//! Builds the store, cache, allocation and resolution services and the
//! visit pipeline from configuration, and drives the pipeline through
//! start and drain-then-stop.

pub mod cli;
pub mod error;
pub mod shutdown;
pub mod state;
pub mod telemetry;

pub use error::{GatewayError, Result};
pub use state::{AppConfig, AppState};
