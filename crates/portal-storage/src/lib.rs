//! Store-of-record implementations.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryStore, InMemoryTransaction};
pub use portal_core::repository::{ReadRepository, Result, Store, StoreTransaction, VisitSink};
pub use portal_core::StorageError;
pub use postgres::{PostgresStore, PostgresTransaction};
