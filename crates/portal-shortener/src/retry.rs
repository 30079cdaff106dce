use portal_core::{ServiceError, StorageError};
use rand::Rng;
use std::time::Duration;

/// Whether the store aborted the transaction in a way that a fresh attempt
/// may get past.
pub fn is_retryable(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::Storage(StorageError::SerializationFailure(_))
    )
}

/// Exponential backoff with up to 25% random jitter, capped at `max`.
///
/// `attempt` starts at 1 for the first retry.
pub fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1 << exponent).min(max);

    let jitter_cap = delay.as_millis() as u64 / 4;
    if jitter_cap == 0 {
        return delay;
    }
    let jitter = rand::rng().random_range(0..=jitter_cap);
    (delay + Duration::from_millis(jitter)).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_serialization_failures_are_retryable() {
        assert!(is_retryable(&ServiceError::Storage(
            StorageError::SerializationFailure("40001".into())
        )));
        assert!(!is_retryable(&ServiceError::Storage(
            StorageError::Unavailable("down".into())
        )));
        assert!(!is_retryable(&ServiceError::Conflict("abc".into())));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(2);

        let first = backoff(1, base, max);
        assert!(first >= base && first <= Duration::from_millis(125));

        let third = backoff(3, base, max);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));

        assert_eq!(backoff(30, base, max), max);
    }
}
