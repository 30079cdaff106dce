//! Cache backends for the resolution path.

pub mod layered;
pub mod moka;
pub mod redis;

pub use layered::LayeredCache;
pub use moka::{CacheConfig, MokaUrlCache};
pub use portal_core::cache::{Result, UrlCache};
pub use portal_core::{CacheEntry, CacheError};
pub use redis::RedisUrlCache;
