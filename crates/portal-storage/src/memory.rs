use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use portal_core::repository::{ReadRepository, Result, Store, StoreTransaction, VisitSink};
use portal_core::{ShortCode, ShortUrlRecord, StorageError, VisitEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Initial value of the code-length counter.
pub const DEFAULT_CODE_LENGTH: usize = 5;

#[derive(Debug)]
struct Inner {
    records: DashMap<String, ShortUrlRecord>,
    code_length: AtomicUsize,
    visits: Mutex<Vec<VisitEvent>>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

/// In-memory store of record.
///
/// Reads go straight to a sharded `DashMap`. Write transactions are
/// serialized: [`begin`](Store::begin) waits for an exclusive write lock that
/// the transaction holds until it commits, rolls back or is dropped. Writes
/// are staged inside the transaction and only become visible on commit.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_code_length(DEFAULT_CODE_LENGTH)
    }

    /// Creates a store whose code-length counter starts at `code_length`.
    pub fn with_code_length(code_length: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: DashMap::new(),
                code_length: AtomicUsize::new(code_length),
                visits: Mutex::new(Vec::new()),
                write_lock: Arc::new(tokio::sync::Mutex::new(())),
            }),
        }
    }

    /// Committed value of the code-length counter.
    pub fn code_length(&self) -> usize {
        self.inner.code_length.load(Ordering::Acquire)
    }

    /// Number of committed short URLs.
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    /// Returns the committed record for a code.
    pub fn record(&self, code: &ShortCode) -> Option<ShortUrlRecord> {
        self.inner
            .records
            .get(code.as_str())
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of every persisted visit, in insertion order.
    pub fn visits(&self) -> Vec<VisitEvent> {
        self.inner.visits.lock().clone()
    }

    pub fn visit_count(&self) -> usize {
        self.inner.visits.lock().len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadRepository for InMemoryStore {
    async fn get_long_url(&self, code: &ShortCode) -> Result<Option<String>> {
        Ok(self
            .inner
            .records
            .get(code.as_str())
            .map(|entry| entry.long_url.clone()))
    }
}

#[async_trait]
impl VisitSink for InMemoryStore {
    async fn insert_visit_batch(&self, visits: &[VisitEvent]) -> Result<()> {
        self.inner.visits.lock().extend_from_slice(visits);
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        let guard = Arc::clone(&self.inner.write_lock).lock_owned().await;

        Ok(InMemoryTransaction {
            store: Arc::clone(&self.inner),
            _guard: guard,
            staged_records: Vec::new(),
            staged_length: None,
        })
    }
}

/// Write transaction on an [`InMemoryStore`].
pub struct InMemoryTransaction {
    store: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
    staged_records: Vec<ShortUrlRecord>,
    staged_length: Option<usize>,
}

impl InMemoryTransaction {
    fn is_staged(&self, code: &ShortCode) -> bool {
        self.staged_records
            .iter()
            .any(|record| record.short_code == *code)
    }
}

impl std::fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("staged_records", &self.staged_records.len())
            .field("staged_length", &self.staged_length)
            .finish()
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn code_exists(&mut self, code: &ShortCode) -> Result<bool> {
        Ok(self.store.records.contains_key(code.as_str()) || self.is_staged(code))
    }

    async fn current_code_length(&mut self) -> Result<usize> {
        Ok(self
            .staged_length
            .unwrap_or_else(|| self.store.code_length.load(Ordering::Acquire)))
    }

    async fn increment_code_length(&mut self, step: usize) -> Result<usize> {
        let current = self.current_code_length().await?;
        let next = current.checked_add(step).ok_or_else(|| {
            StorageError::InvalidData(format!("code length counter overflow: {current} + {step}"))
        })?;
        self.staged_length = Some(next);
        Ok(next)
    }

    async fn insert_short_url(&mut self, record: &ShortUrlRecord) -> Result<()> {
        if self.code_exists(&record.short_code).await? {
            return Err(StorageError::Conflict(record.short_code.to_string()));
        }
        self.staged_records.push(record.clone());
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        // The write lock is still held, so nothing can have claimed a staged
        // code since it was checked.
        if let Some(length) = self.staged_length {
            self.store.code_length.store(length, Ordering::Release);
        }
        for record in self.staged_records {
            self.store
                .records
                .insert(record.short_code.as_str().to_owned(), record);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::Timestamp;
    use portal_core::UserId;
    use std::time::Duration;

    fn code(value: &str) -> ShortCode {
        ShortCode::new_unchecked(value)
    }

    fn record(short_code: &str, long_url: &str) -> ShortUrlRecord {
        ShortUrlRecord {
            owner: UserId::new("alice"),
            long_url: long_url.to_string(),
            short_code: code(short_code),
            created_at: Timestamp::now(),
        }
    }

    #[tokio::test]
    async fn committed_record_is_readable() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_short_url(&record("abc", "https://example.com"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.get_long_url(&code("abc")).await.unwrap().as_deref(),
            Some("https://example.com")
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_code_reads_as_none() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_long_url(&code("nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_short_url(&record("abc", "https://example.com"))
            .await
            .unwrap();
        tx.increment_code_length(1).await.unwrap();

        assert!(tx.code_exists(&code("abc")).await.unwrap());
        assert_eq!(store.get_long_url(&code("abc")).await.unwrap(), None);
        assert_eq!(store.code_length(), DEFAULT_CODE_LENGTH);

        tx.commit().await.unwrap();
        assert_eq!(store.code_length(), DEFAULT_CODE_LENGTH + 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_short_url(&record("abc", "https://example.com"))
                .await
                .unwrap();
            tx.increment_code_length(3).await.unwrap();
        }

        assert!(store.is_empty());
        assert_eq!(store.code_length(), DEFAULT_CODE_LENGTH);

        let tx = store.begin().await.unwrap();
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_short_url(&record("abc", "https://a.example"))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_short_url(&record("abc", "https://b.example"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(ref c) if c == "abc"));
        drop(tx);

        assert_eq!(
            store.get_long_url(&code("abc")).await.unwrap().as_deref(),
            Some("https://a.example")
        );
    }

    #[tokio::test]
    async fn increments_accumulate_within_a_transaction() {
        let store = InMemoryStore::with_code_length(3);
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.increment_code_length(1).await.unwrap(), 4);
        assert_eq!(tx.increment_code_length(2).await.unwrap(), 6);
        assert_eq!(tx.current_code_length().await.unwrap(), 6);
        tx.commit().await.unwrap();
        assert_eq!(store.code_length(), 6);
    }

    #[tokio::test]
    async fn transactions_are_serialized() {
        let store = InMemoryStore::new();
        let first = store.begin().await.unwrap();

        let contender = store.clone();
        let second = tokio::spawn(async move { contender.begin().await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), second)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn visit_batches_are_appended() {
        let store = InMemoryStore::new();
        let batch = vec![
            VisitEvent::new(code("abc"), "10.0.0.1", Timestamp::now()),
            VisitEvent::new(code("abc"), "10.0.0.2", Timestamp::now()),
        ];
        store.insert_visit_batch(&batch).await.unwrap();
        store.insert_visit_batch(&batch[..1]).await.unwrap();

        let visits = store.visits();
        assert_eq!(visits.len(), 3);
        assert_eq!(visits[1].visitor_ip, "10.0.0.2");
        assert_eq!(store.visit_count(), 3);
    }
}
