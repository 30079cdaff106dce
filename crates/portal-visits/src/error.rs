use thiserror::Error;

/// Lifecycle misuse of a [`VisitPipeline`](crate::VisitPipeline).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("visit pipeline is already running")]
    AlreadyRunning,
    #[error("visit pipeline is not running")]
    NotRunning,
    #[error("visit pipeline must be started inside a tokio runtime")]
    NoRuntime,
    #[error("visit worker panicked: {0}")]
    WorkerPanicked(String),
}
