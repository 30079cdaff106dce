use crate::error::CacheError;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// A cached mapping with the lifetime it has left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub long_url: String,
    /// `None` when the backend cannot tell, or the entry never expires.
    pub remaining_ttl: Option<Duration>,
}

/// A best-effort cache of short code to long URL mappings.
///
/// The cache is never authoritative. Implementations can use Redis,
/// in-memory caches, or a combination of both.
#[async_trait]
pub trait UrlCache: Send + Sync + 'static {
    /// Get the long URL for a code.
    ///
    /// Returns `Ok(None)` if the key is absent or its entry has expired.
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>>;

    /// Like [`get_url`](Self::get_url), but also reports how long the entry
    /// has left. Backends that cannot tell report `remaining_ttl: None`.
    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        Ok(self.get_url(code).await?.map(|long_url| CacheEntry {
            long_url,
            remaining_ttl: None,
        }))
    }

    /// Store the long URL for a code, expiring it after `ttl`.
    async fn set_url(&self, code: &ShortCode, long_url: &str, ttl: Duration) -> Result<()>;
}
