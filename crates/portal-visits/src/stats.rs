use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time visit counters, cumulative over the pipeline's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Visits that entered the intake queue.
    pub accepted: u64,
    /// Visits shed because the queue was full or the pipeline was not running.
    pub dropped: u64,
    /// Visits written to the sink.
    pub flushed: u64,
    /// Visits lost with a batch the sink failed to write.
    pub discarded: u64,
    pub batches_flushed: u64,
    pub batches_discarded: u64,
}

impl PipelineStats {
    /// Accepted visits not yet flushed or discarded.
    pub fn pending(&self) -> u64 {
        self.accepted
            .saturating_sub(self.flushed)
            .saturating_sub(self.discarded)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) accepted: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) flushed: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) batches_flushed: AtomicU64,
    pub(crate) batches_discarded: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            batches_discarded: self.batches_discarded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_flush(&self, batch_size: usize) {
        self.flushed.fetch_add(batch_size as u64, Ordering::Relaxed);
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self, batch_size: usize) {
        self.discarded.fetch_add(batch_size as u64, Ordering::Relaxed);
        self.batches_discarded.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_excludes_settled_visits() {
        let stats = PipelineStats {
            accepted: 10,
            flushed: 6,
            discarded: 3,
            ..Default::default()
        };
        assert_eq!(stats.pending(), 1);
    }
}
