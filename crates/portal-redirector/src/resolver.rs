use portal_core::{ReadRepository, ServiceError, ShortCode, UrlCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default lifetime of a cached mapping.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Resolves short codes through a cache in front of the store of record.
///
/// The cache is an optimization only: read and write failures are logged
/// and the lookup carries on against the store. Misses are not cached, and
/// concurrent misses on the same code each read the store and write the
/// same value back.
#[derive(Debug, Clone)]
pub struct CacheAsideResolver<R, C> {
    repository: Arc<R>,
    cache: C,
    ttl: Duration,
}

impl<R: ReadRepository, C: UrlCache> CacheAsideResolver<R, C> {
    pub fn new(repository: Arc<R>, cache: C, ttl: Duration) -> Self {
        Self {
            repository,
            cache,
            ttl,
        }
    }

    /// Returns a reference to the cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the long URL for `code`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] when the store has no record for the code,
    /// [`ServiceError::Storage`] when the store itself fails.
    pub async fn resolve(&self, code: &ShortCode) -> Result<String, ServiceError> {
        match self.cache.get_url(code).await {
            Ok(Some(long_url)) => {
                debug!(code = %code, "Resolved from cache");
                return Ok(long_url);
            }
            Ok(None) => {
                trace!(code = %code, "Cache miss, reading store");
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Cache read failed, reading store");
            }
        }

        let Some(long_url) = self.repository.get_long_url(code).await? else {
            debug!(code = %code, "Short code not found");
            return Err(ServiceError::NotFound(format!(
                "short code not found: {code}"
            )));
        };

        if let Err(e) = self.cache.set_url(code, &long_url, self.ttl).await {
            warn!(code = %code, error = %e, "Failed to populate cache");
        }

        debug!(code = %code, "Resolved from store");
        Ok(long_url)
    }
}
