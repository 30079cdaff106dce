use portal_core::{ServiceError, ShortCode, StoreTransaction};
use portal_generator::CodeGenerator;
use tracing::{debug, info, trace};

/// Candidates tried at one length before the length grows.
pub const DEFAULT_MAX_ATTEMPTS_PER_LENGTH: usize = 5;

/// Amount the code-length counter grows by when a length is exhausted.
pub const DEFAULT_LENGTH_STEP: usize = 1;

/// Outcome of [`CollisionResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCode {
    /// A code that did not exist in the store when checked.
    pub code: ShortCode,
    /// Length the code was generated at, `None` for a preferred code.
    pub min_length: Option<usize>,
    /// Number of times the shared code-length counter was incremented.
    pub length_increments: usize,
}

/// Finds a short code that is free in the store.
///
/// Every existence check runs on the caller's transaction, so the
/// transaction's isolation keeps the code free until the insert that follows
/// in the same transaction.
#[derive(Debug, Clone)]
pub struct CollisionResolver<G> {
    generator: G,
    max_attempts_per_length: usize,
    length_step: usize,
}

impl<G: CodeGenerator> CollisionResolver<G> {
    pub fn new(generator: G) -> Self {
        Self::with_limits(
            generator,
            DEFAULT_MAX_ATTEMPTS_PER_LENGTH,
            DEFAULT_LENGTH_STEP,
        )
    }

    /// Both limits are raised to at least 1.
    pub fn with_limits(generator: G, max_attempts_per_length: usize, length_step: usize) -> Self {
        Self {
            generator,
            max_attempts_per_length: max_attempts_per_length.max(1),
            length_step: length_step.max(1),
        }
    }

    pub fn max_attempts_per_length(&self) -> usize {
        self.max_attempts_per_length
    }

    pub fn length_step(&self) -> usize {
        self.length_step
    }

    /// Resolves the code to allocate.
    ///
    /// A preferred code is checked exactly once and returned unchanged, or
    /// rejected with [`ServiceError::Conflict`]. Otherwise candidates are
    /// generated at the store's current code length; after
    /// `max_attempts_per_length` collisions the shared counter is incremented
    /// and generation continues at the longer length. The next working length
    /// is the larger of `working + step` and the counter value returned by the
    /// store, so growth made by concurrent writers is never undercut.
    pub async fn resolve<T>(
        &self,
        tx: &mut T,
        preferred: Option<&ShortCode>,
    ) -> Result<ResolvedCode, ServiceError>
    where
        T: StoreTransaction,
    {
        if let Some(code) = preferred {
            if tx.code_exists(code).await? {
                debug!(code = %code, "Preferred code is taken");
                return Err(ServiceError::Conflict(format!(
                    "short code already exists: {code}"
                )));
            }
            return Ok(ResolvedCode {
                code: code.clone(),
                min_length: None,
                length_increments: 0,
            });
        }

        let mut length = tx.current_code_length().await?;
        let mut length_increments = 0;

        loop {
            for attempt in 1..=self.max_attempts_per_length {
                let candidate = self.generator.generate(length)?;
                if !tx.code_exists(&candidate).await? {
                    return Ok(ResolvedCode {
                        code: candidate,
                        min_length: Some(length),
                        length_increments,
                    });
                }
                trace!(code = %candidate, length, attempt, "Candidate collides");
            }

            let counter = tx.increment_code_length(self.length_step).await?;
            length_increments += 1;
            let next = length.saturating_add(self.length_step).max(counter);
            info!(
                exhausted_length = length,
                next_length = next,
                counter,
                "Code length exhausted, growing"
            );
            length = next;
        }
    }
}
