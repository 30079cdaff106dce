use crate::state::AppConfig;
use clap::{Parser, ValueEnum};
use portal_cache::CacheConfig;
use portal_shortener::AllocationConfig;
use portal_visits::PipelineConfig;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const STORAGE_BACKEND_ENV: &str = "PORTAL_STORAGE_BACKEND";
pub const POSTGRES_DSN_ENV: &str = "PORTAL_POSTGRES_DSN";
pub const POSTGRES_MAX_CONNECTIONS_ENV: &str = "PORTAL_POSTGRES_MAX_CONNECTIONS";
pub const CACHE_BACKEND_ENV: &str = "PORTAL_CACHE_BACKEND";
pub const REDIS_URL_ENV: &str = "PORTAL_REDIS_URL";
pub const CACHE_TTL_SECS_ENV: &str = "PORTAL_CACHE_TTL_SECS";
pub const CACHE_CAPACITY_ENV: &str = "PORTAL_CACHE_CAPACITY";
pub const INITIAL_CODE_LENGTH_ENV: &str = "PORTAL_INITIAL_CODE_LENGTH";
pub const MAX_ATTEMPTS_PER_LENGTH_ENV: &str = "PORTAL_MAX_ATTEMPTS_PER_LENGTH";
pub const LENGTH_STEP_ENV: &str = "PORTAL_LENGTH_STEP";
pub const MAX_TRANSACTION_RETRIES_ENV: &str = "PORTAL_MAX_TRANSACTION_RETRIES";
pub const VISIT_BUFFER_CAPACITY_ENV: &str = "PORTAL_VISIT_BUFFER_CAPACITY";
pub const VISIT_QUEUE_CAPACITY_ENV: &str = "PORTAL_VISIT_QUEUE_CAPACITY";
pub const VISIT_FLUSH_INTERVAL_SECS_ENV: &str = "PORTAL_VISIT_FLUSH_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "PORTAL_LOG_FORMAT";

pub const DEFAULT_POSTGRES_MAX_CONNECTIONS: u32 = 20;
pub const DEFAULT_CACHE_TTL_SECS: u64 = 600;
pub const DEFAULT_CACHE_CAPACITY: u64 = 100_000;
pub const DEFAULT_INITIAL_CODE_LENGTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    /// In-process Moka cache.
    #[value(name = "memory")]
    Memory,
    #[value(name = "redis")]
    Redis,
    /// Moka in front of Redis.
    #[value(name = "layered")]
    Layered,
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::Memory => write!(f, "memory"),
            CacheBackendArg::Redis => write!(f, "redis"),
            CacheBackendArg::Layered => write!(f, "layered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "pretty")]
    Pretty,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Pretty => write!(f, "pretty"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "portal-gateway")]
pub struct Cli {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = POSTGRES_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub postgres_dsn: Option<String>,

    #[arg(
        long,
        env = POSTGRES_MAX_CONNECTIONS_ENV,
        default_value_t = DEFAULT_POSTGRES_MAX_CONNECTIONS
    )]
    pub postgres_max_connections: u32,

    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::Memory
    )]
    pub cache: CacheBackendArg,

    #[arg(
        long,
        env = REDIS_URL_ENV,
        required_if_eq_any([("cache", "redis"), ("cache", "layered")])
    )]
    pub redis_url: Option<String>,

    #[arg(long, env = CACHE_TTL_SECS_ENV, default_value_t = DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = CACHE_CAPACITY_ENV, default_value_t = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: u64,

    /// Starting value of the code length counter. Only used by the in-memory
    /// store; Postgres seeds its own.
    #[arg(
        long,
        env = INITIAL_CODE_LENGTH_ENV,
        default_value_t = DEFAULT_INITIAL_CODE_LENGTH
    )]
    pub initial_code_length: usize,

    #[arg(
        long,
        env = MAX_ATTEMPTS_PER_LENGTH_ENV,
        default_value_t = portal_shortener::DEFAULT_MAX_ATTEMPTS_PER_LENGTH
    )]
    pub max_attempts_per_length: usize,

    #[arg(
        long,
        env = LENGTH_STEP_ENV,
        default_value_t = portal_shortener::DEFAULT_LENGTH_STEP
    )]
    pub length_step: usize,

    /// Re-runs of an allocation aborted by a serialization failure.
    #[arg(
        long,
        env = MAX_TRANSACTION_RETRIES_ENV,
        default_value_t = portal_shortener::DEFAULT_MAX_TRANSACTION_RETRIES
    )]
    pub max_transaction_retries: u32,

    #[arg(
        long,
        env = VISIT_BUFFER_CAPACITY_ENV,
        default_value_t = portal_visits::DEFAULT_BUFFER_CAPACITY
    )]
    pub visit_buffer_capacity: usize,

    #[arg(
        long,
        env = VISIT_QUEUE_CAPACITY_ENV,
        default_value_t = portal_visits::DEFAULT_QUEUE_CAPACITY
    )]
    pub visit_queue_capacity: usize,

    #[arg(long, env = VISIT_FLUSH_INTERVAL_SECS_ENV)]
    pub visit_flush_interval_secs: Option<u64>,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,
}

impl Cli {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Seed of the in-memory code length counter, at least 1.
    pub fn code_length_seed(&self) -> usize {
        self.initial_code_length.max(1)
    }

    pub fn allocation_config(&self) -> AllocationConfig {
        AllocationConfig::builder()
            .max_attempts_per_length(self.max_attempts_per_length)
            .length_step(self.length_step)
            .max_transaction_retries(self.max_transaction_retries)
            .build()
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let config = PipelineConfig::builder()
            .buffer_capacity(self.visit_buffer_capacity.max(1))
            .queue_capacity(self.visit_queue_capacity.max(1));
        match self.visit_flush_interval_secs {
            Some(secs) if secs > 0 => config.flush_interval(Duration::from_secs(secs)).build(),
            _ => config.build(),
        }
    }

    pub fn app_config(&self) -> AppConfig {
        AppConfig::builder()
            .cache_ttl(self.cache_ttl())
            .allocation(self.allocation_config())
            .pipeline(self.pipeline_config())
            .build()
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::builder()
            .max_capacity(self.cache_capacity)
            .max_ttl(self.cache_ttl())
            .build()
    }
}
