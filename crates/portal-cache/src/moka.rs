use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use portal_core::cache::Result;
use portal_core::{CacheEntry, ShortCode, UrlCache};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Default maximum number of entries.
pub const DEFAULT_MAX_CAPACITY: u64 = 100_000;

#[derive(Debug, Clone)]
struct CachedUrl {
    long_url: String,
    ttl: Duration,
    expires_at: Instant,
}

/// Expires every entry after the TTL it was written with.
struct PerEntryTtl;

impl Expiry<String, CachedUrl> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedUrl,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedUrl,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// An in-process cache backed by Moka.
///
/// Suitable for single-node deployments or as the L1 in front of Redis.
/// Entries are bounded by count and expire individually.
#[derive(Debug, Clone)]
pub struct MokaUrlCache {
    cache: Cache<String, CachedUrl>,
    max_ttl: Option<Duration>,
}

impl MokaUrlCache {
    /// Creates a cache holding at most [`DEFAULT_MAX_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(max_capacity: u64) -> Self {
        CacheConfig::builder().max_capacity(max_capacity).build().into()
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfig::builder()
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MokaUrlCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlCache for MokaUrlCache {
    async fn get_url(&self, code: &ShortCode) -> Result<Option<String>> {
        Ok(self.get_entry(code).await?.map(|entry| entry.long_url))
    }

    async fn get_entry(&self, code: &ShortCode) -> Result<Option<CacheEntry>> {
        match self.cache.get(code.as_str()).await {
            Some(entry) => {
                debug!(code = %code, "Cache hit in Moka");
                Ok(Some(CacheEntry {
                    long_url: entry.long_url,
                    remaining_ttl: Some(entry.expires_at.saturating_duration_since(Instant::now())),
                }))
            }
            None => {
                trace!(code = %code, "Cache miss in Moka");
                Ok(None)
            }
        }
    }

    async fn set_url(&self, code: &ShortCode, long_url: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            trace!(code = %code, "Skipping Moka write with zero ttl");
            return Ok(());
        }

        let ttl = self.max_ttl.map_or(ttl, |max_ttl| ttl.min(max_ttl));
        self.cache
            .insert(
                code.as_str().to_owned(),
                CachedUrl {
                    long_url: long_url.to_owned(),
                    ttl,
                    expires_at: Instant::now() + ttl,
                },
            )
            .await;
        debug!(code = %code, ttl_ms = ttl.as_millis() as u64, "Cached URL in Moka");
        Ok(())
    }
}

/// Configuration for creating a [`MokaUrlCache`].
#[derive(Debug, TypedBuilder)]
pub struct CacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default = DEFAULT_MAX_CAPACITY)]
    max_capacity: u64,
    /// Upper bound on any entry's lifetime, regardless of the TTL it was
    /// written with.
    #[builder(default, setter(strip_option))]
    max_ttl: Option<Duration>,
}

impl From<CacheConfig> for MokaUrlCache {
    fn from(config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        MokaUrlCache {
            cache,
            max_ttl: config.max_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    #[tokio::test]
    async fn cache_get_and_set() {
        let cache = MokaUrlCache::new();
        let c = code("abc123");

        assert!(cache.get_url(&c).await.unwrap().is_none());

        cache.set_url(&c, "https://example.com", TTL).await.unwrap();

        assert_eq!(
            cache.get_url(&c).await.unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = MokaUrlCache::new();
        let c = code("abc123");

        cache.set_url(&c, "https://old.example", TTL).await.unwrap();
        cache.set_url(&c, "https://new.example", TTL).await.unwrap();

        assert_eq!(
            cache.get_url(&c).await.unwrap().as_deref(),
            Some("https://new.example")
        );
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let cache = MokaUrlCache::new();
        let short = code("short");
        let long = code("long");

        cache
            .set_url(&short, "https://a.example", Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .set_url(&long, "https://b.example", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get_url(&short).await.unwrap().is_none());
        assert!(cache.get_url(&long).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn max_ttl_caps_entry_lifetime() {
        let cache: MokaUrlCache = MokaUrlCache::builder()
            .max_capacity(100)
            .max_ttl(Duration::from_millis(50))
            .build()
            .into();
        let c = code("abc123");

        cache.set_url(&c, "https://example.com", TTL).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get_url(&c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn entry_reports_remaining_lifetime() {
        let cache: MokaUrlCache = MokaUrlCache::builder()
            .max_capacity(100)
            .max_ttl(Duration::from_secs(30))
            .build()
            .into();
        let c = code("abc123");

        cache.set_url(&c, "https://example.com", TTL).await.unwrap();

        let entry = cache.get_entry(&c).await.unwrap().unwrap();
        assert_eq!(entry.long_url, "https://example.com");
        let remaining = entry.remaining_ttl.unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(25));
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = MokaUrlCache::new();
        let c = code("abc123");

        cache
            .set_url(&c, "https://example.com", Duration::ZERO)
            .await
            .unwrap();

        assert!(cache.get_url(&c).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_handles_many_entries() {
        let cache = MokaUrlCache::with_capacity(100);

        for i in 0..50 {
            cache
                .set_url(&code(&format!("code{i}")), &format!("https://example{i}"), TTL)
                .await
                .unwrap();
        }

        assert_eq!(
            cache.get_url(&code("code0")).await.unwrap().as_deref(),
            Some("https://example0")
        );
        assert_eq!(
            cache.get_url(&code("code49")).await.unwrap().as_deref(),
            Some("https://example49")
        );
    }
}
