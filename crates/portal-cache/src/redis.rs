use async_trait::async_trait;
use portal_core::cache::Result;
use portal_core::{CacheEntry, CacheError, ShortCode, UrlCache};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default key prefix for cached mappings.
pub const DEFAULT_KEY_PREFIX: &str = "portal:url:";

/// A Redis-based implementation of [`UrlCache`].
///
/// The long URL is stored as a plain string value under a prefixed key and
/// expires through Redis' own `EX` handling.
#[derive(Debug, Clone)]
pub struct RedisUrlCache {
    conn: redis::aio::MultiplexedConnection,
    key_prefix: String,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if message.to_ascii_lowercase().contains("timed out") {
        CacheError::Timeout(message)
    } else if err.is_io_error() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

// Redis expiry has one-second resolution here; round up so a sub-second TTL
// still caches instead of being rejected as `EX 0`.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_millis().div_ceil(1000).max(1) as u64
}

// `PTTL` answers -1 for a key without expiry and -2 for a missing key.
fn remaining_from_pttl(pttl: i64) -> Option<Duration> {
    u64::try_from(pttl).ok().map(Duration::from_millis)
}

impl RedisUrlCache {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self::with_prefix(conn, DEFAULT_KEY_PREFIX)
    }

    pub fn with_prefix(
        conn: redis::aio::MultiplexedConnection,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    /// Opens a multiplexed connection to `redis_url`.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Initialization(format!("invalid redis url: {e}")))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| map_redis_error("failed to connect to Redis", e))?;
        Ok(Self::new(conn))
    }

    fn cache_key(&self, code: &ShortCode) -> String {
        format!("{}{}", self.key_prefix, code.as_str())
    }
}

#[async_trait]
impl UrlCache for RedisUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching URL from Redis cache");

        let mut conn = self.conn.clone();
        match conn.get::<_, Option<String>>(&key).await {
            Ok(Some(long_url)) => {
                debug!(code = %code, "Cache hit in Redis");
                Ok(Some(long_url))
            }
            Ok(None) => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Redis error on get");
                Err(map_redis_error("failed to fetch value from Redis", e))
            }
        }
    }

    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        let key = self.cache_key(code);
        trace!(code = %code, "Fetching URL and PTTL from Redis cache");

        let mut conn = self.conn.clone();
        let (long_url, pttl): (Option<String>, i64) = redis::pipe()
            .get(&key)
            .pttl(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(code = %code, error = %e, "Redis error on get");
                map_redis_error("failed to fetch value from Redis", e)
            })?;

        match long_url {
            Some(long_url) => {
                debug!(code = %code, pttl, "Cache hit in Redis");
                Ok(Some(CacheEntry {
                    long_url,
                    remaining_ttl: remaining_from_pttl(pttl),
                }))
            }
            None => {
                trace!(code = %code, "Cache miss in Redis");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, long_url: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            trace!(code = %code, "Skipping Redis write with zero ttl");
            return Ok(());
        }

        let key = self.cache_key(code);
        let mut conn = self.conn.clone();
        match conn
            .set_ex::<_, _, ()>(&key, long_url, ttl_seconds(ttl))
            .await
        {
            Ok(()) => {
                debug!(code = %code, "Cached URL in Redis");
                Ok(())
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Failed to cache URL in Redis");
                Err(map_redis_error("failed to write value to Redis", e))
            }
        }
    }
}
