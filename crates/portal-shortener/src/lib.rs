//! Write path: collision-safe short code allocation.

pub mod resolver;
pub mod retry;
pub mod service;

pub use resolver::{
    CollisionResolver, ResolvedCode, DEFAULT_LENGTH_STEP, DEFAULT_MAX_ATTEMPTS_PER_LENGTH,
};
pub use service::{AllocationConfig, AllocationService, DEFAULT_MAX_TRANSACTION_RETRIES};
