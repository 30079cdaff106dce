use portal_core::{CacheError, StorageError};
use portal_visits::PipelineError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failures while bringing the gateway up or down.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("visit pipeline: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("missing setting: {0}")]
    MissingSetting(&'static str),

    #[error("failed to install tracing subscriber: {0}")]
    Telemetry(String),

    #[error("failed to listen for shutdown signals: {0}")]
    Signal(#[source] std::io::Error),

    #[error("visit pipeline did not drain within {0:?}")]
    ShutdownTimeout(Duration),
}
