use thiserror::Error;

pub type Result<T> = std::result::Result<T, TestInfraError>;

/// Failure to bring up, or reach, a disposable test service.
#[derive(Debug, Error)]
pub enum TestInfraError {
    /// Docker could not start the container, or its host or mapped port
    /// could not be read back.
    #[error("test container: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    /// The Redis fixture could not open a client connection.
    #[error("redis fixture connection: {0}")]
    Redis(#[from] redis::RedisError),
}
