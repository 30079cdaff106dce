use crate::resolver::{CollisionResolver, DEFAULT_LENGTH_STEP, DEFAULT_MAX_ATTEMPTS_PER_LENGTH};
use crate::retry;
use jiff::Timestamp;
use portal_core::{
    CreateShortUrlParams, DefaultValidator, ServiceError, ShortCode, ShortUrlRecord, Store,
    StoreTransaction, UserId, Validator,
};
use portal_generator::CodeGenerator;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

pub const DEFAULT_MAX_TRANSACTION_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(1);

/// Tuning for [`AllocationService`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct AllocationConfig {
    #[builder(default = DEFAULT_MAX_ATTEMPTS_PER_LENGTH)]
    pub max_attempts_per_length: usize,
    #[builder(default = DEFAULT_LENGTH_STEP)]
    pub length_step: usize,
    /// How many times an allocation is re-run after the store aborts it with
    /// a serialization failure.
    #[builder(default = DEFAULT_MAX_TRANSACTION_RETRIES)]
    pub max_transaction_retries: u32,
    #[builder(default = DEFAULT_RETRY_BASE_DELAY)]
    pub retry_base_delay: Duration,
    #[builder(default = DEFAULT_RETRY_MAX_DELAY)]
    pub retry_max_delay: Duration,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Exposes `CreateShortURL`.
///
/// Each allocation validates its input, then runs collision resolution and
/// the insert in one store transaction. The transaction is rolled back on any
/// failure, and the whole unit of work is retried when the store reports a
/// serialization failure.
pub struct AllocationService<S, G, V = DefaultValidator> {
    store: Arc<S>,
    resolver: CollisionResolver<G>,
    validator: V,
    config: AllocationConfig,
}

impl<S, G, V> AllocationService<S, G, V>
where
    S: Store,
    G: CodeGenerator,
    V: Validator<CreateShortUrlParams>,
{
    pub fn new(store: Arc<S>, generator: G, validator: V, config: AllocationConfig) -> Self {
        let resolver = CollisionResolver::with_limits(
            generator,
            config.max_attempts_per_length,
            config.length_step,
        );
        Self {
            store,
            resolver,
            validator,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Allocates a short code for `params.long_url`, owned by `params.owner`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] when the validator rejects the input
    /// - [`ServiceError::Conflict`] when the preferred code is taken, or an
    ///   insert lost a uniqueness race
    /// - [`ServiceError::Storage`] / [`ServiceError::Generator`] for
    ///   infrastructure faults
    pub async fn create_short_url(
        &self,
        params: CreateShortUrlParams,
    ) -> Result<ShortCode, ServiceError> {
        self.validator.validate(&params)?;

        let preferred = params.preferred().map(ShortCode::new).transpose()?;
        let owner = UserId::new(params.owner);
        let long_url = params.long_url;

        let mut attempt = 0;
        loop {
            match self
                .allocate_once(&owner, &long_url, preferred.as_ref())
                .await
            {
                Err(e) if retry::is_retryable(&e) && attempt < self.config.max_transaction_retries => {
                    attempt += 1;
                    let delay = retry::backoff(
                        attempt,
                        self.config.retry_base_delay,
                        self.config.retry_max_delay,
                    );
                    warn!(
                        owner = %owner,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Allocation transaction aborted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn allocate_once(
        &self,
        owner: &UserId,
        long_url: &str,
        preferred: Option<&ShortCode>,
    ) -> Result<ShortCode, ServiceError> {
        let mut tx = self.store.begin().await?;

        let resolved = match self.resolver.resolve(&mut tx, preferred).await {
            Ok(resolved) => resolved,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        };

        let record = ShortUrlRecord {
            owner: owner.clone(),
            long_url: long_url.to_owned(),
            short_code: resolved.code,
            created_at: Timestamp::now(),
        };

        if let Err(e) = tx.insert_short_url(&record).await {
            rollback(tx).await;
            return Err(e.into());
        }

        tx.commit().await?;

        info!(
            code = %record.short_code,
            owner = %record.owner,
            length_increments = resolved.length_increments,
            "Allocated short code"
        );
        Ok(record.short_code)
    }
}

async fn rollback<T: StoreTransaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to roll back allocation transaction");
    }
}
