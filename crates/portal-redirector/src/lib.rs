//! Read path: cache-aside resolution of short codes.
//!
//! [`CacheAsideResolver`] consults a [`UrlCache`](portal_core::UrlCache)
//! before the store of record and repopulates the cache on a miss.
//! [`ResolutionService`] adds fire-and-forget visit recording on top.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use portal_cache::MokaUrlCache;
//! use portal_core::ShortCode;
//! use portal_redirector::{CacheAsideResolver, ResolutionService};
//! use portal_storage::InMemoryStore;
//! use portal_visits::{PipelineConfig, VisitPipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let pipeline = VisitPipeline::new(Arc::clone(&store), PipelineConfig::default());
//! pipeline.start()?;
//!
//! let resolver = CacheAsideResolver::new(store, MokaUrlCache::new(), Duration::from_secs(600));
//! let service = ResolutionService::new(resolver, pipeline.recorder());
//!
//! let code = ShortCode::new("abc123")?;
//! let long_url = service.redirect(&code, "203.0.113.7").await?;
//! println!("Redirect to: {long_url}");
//!
//! pipeline.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod resolver;
pub mod service;

pub use resolver::{CacheAsideResolver, DEFAULT_CACHE_TTL};
pub use service::ResolutionService;
