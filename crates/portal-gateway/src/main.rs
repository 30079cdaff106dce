use clap::Parser;
use portal_cache::{LayeredCache, MokaUrlCache, RedisUrlCache};
use portal_core::{Store, UrlCache};
use portal_gateway::cli::{
    CacheBackendArg, Cli, StorageBackendArg, POSTGRES_DSN_ENV, REDIS_URL_ENV,
};
use portal_gateway::shutdown::{self, DEFAULT_SHUTDOWN_TIMEOUT};
use portal_gateway::{telemetry, AppState, GatewayError, Result};
use portal_storage::{InMemoryStore, PostgresStore};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format)?;

    info!(storage = %cli.storage, cache = %cli.cache, "Starting portal gateway");

    match cli.storage {
        StorageBackendArg::InMemory => {
            let store = InMemoryStore::with_code_length(cli.code_length_seed());
            with_cache(Arc::new(store), &cli).await?;
        }
        StorageBackendArg::Postgres => {
            let dsn = cli
                .postgres_dsn
                .as_deref()
                .ok_or(GatewayError::MissingSetting(POSTGRES_DSN_ENV))?;
            let store = PostgresStore::connect_with(dsn, cli.postgres_max_connections).await?;
            store.migrate().await?;
            info!(
                max_connections = cli.postgres_max_connections,
                "Connected to Postgres"
            );
            with_cache(Arc::new(store), &cli).await?;
        }
    }

    info!("Portal gateway stopped");
    Ok(())
}

async fn with_cache<S: Store>(store: Arc<S>, cli: &Cli) -> Result<()> {
    match cli.cache {
        CacheBackendArg::Memory => {
            let cache = MokaUrlCache::from(cli.cache_config());
            run(store, cache, cli).await
        }
        CacheBackendArg::Redis => {
            let cache = RedisUrlCache::connect(redis_url(cli)?).await?;
            run(store, cache, cli).await
        }
        CacheBackendArg::Layered => {
            let l2 = RedisUrlCache::connect(redis_url(cli)?).await?;
            let cache = LayeredCache::new(MokaUrlCache::from(cli.cache_config()), l2, cli.cache_ttl());
            run(store, cache, cli).await
        }
    }
}

fn redis_url(cli: &Cli) -> Result<&str> {
    cli.redis_url
        .as_deref()
        .ok_or(GatewayError::MissingSetting(REDIS_URL_ENV))
}

async fn run<S: Store, C: UrlCache>(store: Arc<S>, cache: C, cli: &Cli) -> Result<()> {
    let state = AppState::new(store, cache, cli.app_config());
    state.start_pipeline()?;
    info!("Portal gateway ready");

    let signal = shutdown::wait_for_shutdown_signal().await;
    match &signal {
        Ok(signal) => info!(signal, "Shutting down"),
        Err(e) => error!(error = %e, "Cannot wait for a shutdown signal, shutting down"),
    }

    shutdown::drain(&state, DEFAULT_SHUTDOWN_TIMEOUT).await?;
    signal.map(|_| ())
}
