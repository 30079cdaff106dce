use crate::pipeline::PipelineState;
use crate::stats::Counters;
use parking_lot::RwLock;
use portal_core::VisitEvent;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tracing::warn;

// Log the first dropped visit, then every n-th.
const DROP_LOG_EVERY: u64 = 1000;

/// State shared between the pipeline handle, its recorders and the worker.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Intake side of the queue. `None` while the pipeline is not running;
    /// taking it out closes the queue.
    pub(crate) sender: RwLock<Option<Sender<VisitEvent>>>,
    pub(crate) state: AtomicU8,
    pub(crate) counters: Counters,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            sender: RwLock::new(None),
            state: AtomicU8::new(PipelineState::Stopped as u8),
            counters: Counters::default(),
        }
    }

    pub(crate) fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn note_drop(&self, code: &str, reason: &'static str) {
        let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
            warn!(
                code = %code,
                reason,
                dropped_total = dropped,
                "Dropping visit event"
            );
        }
    }
}

/// Producer handle of a [`VisitPipeline`](crate::VisitPipeline).
///
/// Cheap to clone and safe to call from any number of tasks.
#[derive(Debug, Clone)]
pub struct VisitRecorder {
    shared: Arc<Shared>,
}

impl VisitRecorder {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Enqueues a visit without waiting.
    ///
    /// The visit is dropped, and counted in
    /// [`PipelineStats::dropped`](crate::PipelineStats::dropped), when the
    /// queue is full or the pipeline is not running.
    pub fn record(&self, event: VisitEvent) {
        let sender = self.shared.sender.read();
        let Some(sender) = sender.as_ref() else {
            self.shared.note_drop(event.short_code.as_str(), "not running");
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {
                self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(event)) => {
                self.shared.note_drop(event.short_code.as_str(), "queue full");
            }
            Err(TrySendError::Closed(event)) => {
                self.shared.note_drop(event.short_code.as_str(), "queue closed");
            }
        }
    }
}
