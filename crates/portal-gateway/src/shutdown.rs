use crate::error::{GatewayError, Result};
use crate::state::AppState;
use portal_core::{Store, UrlCache};
use portal_visits::PipelineStats;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on how long the final visit flush may take.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves on SIGINT, or SIGTERM on unix.
///
/// Fails only when no signal can be listened for at all.
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => first_signal(tokio::signal::ctrl_c(), sigterm.recv()).await,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler, waiting for SIGINT only");
                tokio::signal::ctrl_c().await.map_err(GatewayError::Signal)?;
                Ok("SIGINT received")
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(GatewayError::Signal)?;
        Ok("SIGINT received")
    }
}

/// Waits for whichever of SIGINT and SIGTERM comes first. A failed SIGINT
/// listener leaves SIGTERM as the only way out.
async fn first_signal<I, T>(ctrl_c: I, sigterm: T) -> Result<&'static str>
where
    I: Future<Output = std::io::Result<()>>,
    T: Future<Output = Option<()>>,
{
    tokio::pin!(sigterm);

    let ctrl_c = tokio::select! {
        result = ctrl_c => result,
        _ = &mut sigterm => return Ok("SIGTERM received"),
    };

    match ctrl_c {
        Ok(()) => Ok("SIGINT received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for SIGINT, waiting for SIGTERM only");
            sigterm.await;
            Ok("SIGTERM received")
        }
    }
}

/// Stops the visit pipeline, giving the worker `timeout` to flush.
pub async fn drain<S: Store, C: UrlCache>(
    state: &AppState<S, C>,
    timeout: Duration,
) -> Result<PipelineStats> {
    info!(timeout_secs = timeout.as_secs(), "Draining visit pipeline");
    let stats = tokio::time::timeout(timeout, state.stop_pipeline())
        .await
        .map_err(|_| GatewayError::ShutdownTimeout(timeout))??;

    info!(
        accepted = stats.accepted,
        dropped = stats.dropped,
        flushed = stats.flushed,
        discarded = stats.discarded,
        "Visit pipeline drained"
    );
    Ok(stats)
}
