use crate::recorder::Shared;
use portal_core::{VisitEvent, VisitSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

/// The single owner of the batch buffer.
///
/// Runs until the intake queue is closed and empty, then flushes whatever is
/// left and returns.
pub(crate) async fn run<S: VisitSink>(
    sink: Arc<S>,
    mut queue: Receiver<VisitEvent>,
    buffer_capacity: usize,
    flush_interval: Option<Duration>,
    shared: Arc<Shared>,
) {
    let mut buffer = Vec::with_capacity(buffer_capacity);
    let mut ticker = flush_interval.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let event = match ticker.as_mut() {
            Some(ticker) => tokio::select! {
                event = queue.recv() => event,
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        flush(sink.as_ref(), &mut buffer, buffer_capacity, &shared).await;
                    }
                    continue;
                }
            },
            None => queue.recv().await,
        };

        let Some(event) = event else {
            break;
        };

        buffer.push(event);
        if buffer.len() >= buffer_capacity {
            flush(sink.as_ref(), &mut buffer, buffer_capacity, &shared).await;
        }
    }

    if !buffer.is_empty() {
        flush(sink.as_ref(), &mut buffer, buffer_capacity, &shared).await;
    }
    debug!("Visit worker drained");
}

async fn flush<S: VisitSink>(
    sink: &S,
    buffer: &mut Vec<VisitEvent>,
    buffer_capacity: usize,
    shared: &Shared,
) {
    let batch = std::mem::replace(buffer, Vec::with_capacity(buffer_capacity));

    match sink.insert_visit_batch(&batch).await {
        Ok(()) => {
            shared.counters.record_flush(batch.len());
            debug!(batch_size = batch.len(), "Flushed visit batch");
        }
        Err(e) => {
            shared.counters.record_discard(batch.len());
            error!(
                batch_size = batch.len(),
                error = %e,
                "Failed to flush visit batch, discarding it"
            );
        }
    }
}
