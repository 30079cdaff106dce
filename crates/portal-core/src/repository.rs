use crate::error::StorageError;
use crate::record::{ShortUrlRecord, VisitEvent};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A read-only view of the store of record.
///
/// This is all the resolution path needs, so the redirector only ever
/// depends on this trait.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the long URL for a given short code.
    /// Returns `None` if the code does not exist.
    async fn get_long_url(&self, code: &ShortCode) -> Result<Option<String>>;
}

/// Destination of flushed visit batches.
#[async_trait]
pub trait VisitSink: Send + Sync + 'static {
    /// Persists all events of a batch in one operation.
    async fn insert_visit_batch(&self, visits: &[VisitEvent]) -> Result<()>;
}

/// The transactional store of record.
#[async_trait]
pub trait Store: ReadRepository + VisitSink {
    type Transaction: StoreTransaction;

    /// Opens a transaction. No other transaction may observe or claim a code
    /// checked inside it until it commits or rolls back.
    async fn begin(&self) -> Result<Self::Transaction>;
}

/// A unit of work on the store.
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Checks whether a short code is already taken.
    async fn code_exists(&mut self, code: &ShortCode) -> Result<bool>;

    /// Reads the minimum length for newly generated codes.
    async fn current_code_length(&mut self) -> Result<usize>;

    /// Atomically grows the code-length counter by `step` and returns the new value.
    async fn increment_code_length(&mut self, step: usize) -> Result<usize>;

    /// Inserts a record. Returns `Err(Conflict)` if the code already exists.
    async fn insert_short_url(&mut self, record: &ShortUrlRecord) -> Result<()>;

    async fn commit(self) -> Result<()>;

    async fn rollback(self) -> Result<()>;
}
