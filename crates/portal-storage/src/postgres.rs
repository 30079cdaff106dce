use async_trait::async_trait;
use jiff::Timestamp;
use portal_core::repository::{ReadRepository, Result, Store, StoreTransaction, VisitSink};
use portal_core::{ShortCode, ShortUrlRecord, StorageError, UserId, VisitEvent};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

// Postgres caps a statement at 65535 bind parameters and a visit row binds 3.
const VISIT_ROWS_PER_STATEMENT: usize = 10_000;

// SQLSTATE codes for which the whole transaction can be retried.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Postgres implementation of the store of record.
///
/// Allocation transactions run at `SERIALIZABLE` isolation. When two of them
/// race for the same code or for the length counter, Postgres aborts one with
/// a serialization failure, surfaced as [`StorageError::SerializationFailure`]
/// so the caller can retry the whole unit of work.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool of [`DEFAULT_MAX_CONNECTIONS`] connections.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Operation(format!("migration failed: {e}")))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loads a committed record.
    pub async fn find_record(&self, code: &ShortCode) -> Result<Option<ShortUrlRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, i64)>(
            r#"
            SELECT short_code, owner, long_url, created_at
            FROM short_urls
            WHERE short_code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some((short_code, owner, long_url, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(ShortUrlRecord {
            owner: UserId::new(owner),
            long_url,
            short_code: ShortCode::new_unchecked(short_code),
            created_at: timestamp_from_millis(created_at)?,
        }))
    }

    /// Number of visits persisted for a code.
    pub async fn visit_count(&self, code: &ShortCode) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM url_visits
            WHERE short_code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count.max(0) as u64)
    }
}

/// Converts a stored `created_at` / `visited_at` column back to a timestamp.
fn timestamp_from_millis(value: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(value)
        .map_err(|e| StorageError::InvalidData(format!("invalid timestamp '{value}': {e}")))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn is_serialization_failure(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    if is_serialization_failure(&err) {
        return StorageError::SerializationFailure(message);
    }

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn to_column_length(value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StorageError::InvalidData(format!("code length {value} out of range")))
}

fn from_column_length(value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        StorageError::InvalidData(format!("stored code length {value} is negative"))
    })
}

#[async_trait]
impl ReadRepository for PostgresStore {
    async fn get_long_url(&self, code: &ShortCode) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT long_url
            FROM short_urls
            WHERE short_code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl VisitSink for PostgresStore {
    async fn insert_visit_batch(&self, visits: &[VisitEvent]) -> Result<()> {
        if visits.is_empty() {
            return Ok(());
        }

        // One transaction so a batch lands entirely or not at all.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for chunk in visits.chunks(VISIT_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO url_visits (short_code, visitor_ip, visited_at) ");
            builder.push_values(chunk, |mut row, visit| {
                row.push_bind(visit.short_code.as_str())
                    .push_bind(visit.visitor_ip.as_str())
                    .push_bind(visit.visited_at.as_millisecond());
            });

            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(count = visits.len(), "Inserted visit batch");
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<Self::Transaction> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        Ok(PostgresTransaction { tx })
    }
}

/// A `SERIALIZABLE` transaction on a [`PostgresStore`].
///
/// Dropping it without committing returns the connection to the pool and
/// rolls the transaction back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn code_exists(&mut self, code: &ShortCode) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM short_urls WHERE short_code = $1)
            "#,
        )
        .bind(code.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)
    }

    async fn current_code_length(&mut self) -> Result<usize> {
        let length = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT min_length
            FROM short_code_length
            WHERE id = 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::InvalidData("code length counter row is missing".into()))?;

        from_column_length(length)
    }

    async fn increment_code_length(&mut self, step: usize) -> Result<usize> {
        let length = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE short_code_length
            SET min_length = min_length + $1
            WHERE id = 1
            RETURNING min_length
            "#,
        )
        .bind(to_column_length(step)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or_else(|| StorageError::InvalidData("code length counter row is missing".into()))?;

        from_column_length(length)
    }

    async fn insert_short_url(&mut self, record: &ShortUrlRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (short_code, owner, long_url, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.short_code.as_str())
        .bind(record.owner.as_str())
        .bind(record.long_url.as_str())
        .bind(record.created_at.as_millisecond())
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::Conflict(record.short_code.to_string()))
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}
