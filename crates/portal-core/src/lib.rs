//! Core types and traits for the Portal URL shortener.
//!
//! This crate provides the data model, the narrow interfaces the core
//! calls into (store of record, cache backend, input validator) and the
//! error taxonomy shared by the allocation, resolution and visit crates.

pub mod cache;
pub mod error;
pub mod record;
pub mod repository;
pub mod shortcode;
pub mod validator;

pub use cache::{CacheEntry, UrlCache};
pub use error::{
    CacheError, CoreError, FieldViolation, GeneratorError, ServiceError, StorageError,
    ValidationError,
};
pub use record::{ShortUrlRecord, UserId, VisitEvent};
pub use repository::{ReadRepository, Store, StoreTransaction, VisitSink};
pub use shortcode::ShortCode;
pub use validator::{CreateShortUrlParams, DefaultValidator, Validator};
