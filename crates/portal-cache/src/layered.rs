use async_trait::async_trait;
use portal_core::cache::Result;
use portal_core::{CacheEntry, ShortCode, UrlCache};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A multi-layer cache that composes two cache implementations.
///
/// L1 is typically a fast, local cache ([`MokaUrlCache`](crate::MokaUrlCache))
/// and L2 a shared one ([`RedisUrlCache`](crate::RedisUrlCache)).
///
/// # Operation Strategy
///
/// - **Get**: Try L1 first, on a miss try L2. An L2 hit is backfilled into
///   L1 for whatever lifetime the L2 entry has left, capped at
///   `backfill_ttl`. When L2 cannot tell, `backfill_ttl` is used.
/// - **Set**: Write to L2, then L1, both with the caller's TTL. L1 is
///   written even when L2 fails; the L2 error is still returned.
#[derive(Debug, Clone)]
pub struct LayeredCache<L1, L2> {
    l1: L1,
    l2: L2,
    backfill_ttl: Duration,
}

impl<L1, L2> LayeredCache<L1, L2> {
    pub fn new(l1: L1, l2: L2, backfill_ttl: Duration) -> Self {
        Self {
            l1,
            l2,
            backfill_ttl,
        }
    }

    /// Returns a reference to the L1 cache.
    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    /// Returns a reference to the L2 cache.
    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    /// Consumes the layered cache and returns the inner caches.
    pub fn into_inner(self) -> (L1, L2) {
        (self.l1, self.l2)
    }
}

#[async_trait]
impl<L1, L2> UrlCache for LayeredCache<L1, L2>
where
    L1: UrlCache,
    L2: UrlCache,
{
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>> {
        Ok(self.get_entry(code).await?.map(|entry| entry.long_url))
    }

    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        if let Some(entry) = self.l1.get_entry(code).await? {
            debug!(code = %code, "L1 cache hit");
            return Ok(Some(entry));
        }
        trace!(code = %code, "L1 cache miss, trying L2");

        match self.l2.get_entry(code).await? {
            Some(entry) => {
                let ttl = entry
                    .remaining_ttl
                    .map_or(self.backfill_ttl, |remaining| remaining.min(self.backfill_ttl));
                debug!(code = %code, ttl_ms = ttl.as_millis() as u64, "L2 cache hit, backfilling L1");
                if let Err(e) = self.l1.set_url(code, &entry.long_url, ttl).await {
                    warn!(code = %code, error = %e, "Failed to backfill L1 cache");
                }
                Ok(Some(entry))
            }
            None => {
                trace!(code = %code, "L2 cache miss");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, long_url: &str, ttl: Duration) -> Result<()> {
        let l2 = self.l2.set_url(code, long_url, ttl).await;
        if let Err(e) = &l2 {
            warn!(code = %code, error = %e, "Failed to write L2 cache, writing L1 only");
        }
        self.l1.set_url(code, long_url, ttl).await?;
        l2?;
        debug!(code = %code, "Stored URL in L1 and L2");
        Ok(())
    }
}
