use crate::cli::LogFormatArg;
use crate::error::{GatewayError, Result};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global `fmt` subscriber, filtered by `RUST_LOG`.
pub fn init_tracing(format: LogFormatArg) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormatArg::Json => builder.json().try_init(),
        LogFormatArg::Pretty => builder.try_init(),
    }
    .map_err(|e| GatewayError::Telemetry(e.to_string()))
}
