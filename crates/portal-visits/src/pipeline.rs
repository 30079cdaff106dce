use crate::error::PipelineError;
use crate::recorder::{Shared, VisitRecorder};
use crate::stats::PipelineStats;
use crate::worker;
use parking_lot::Mutex;
use portal_core::VisitSink;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use typed_builder::TypedBuilder;

/// Default number of visits written per batch.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Default bound of the intake queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineConfig {
    /// A batch is flushed as soon as the buffer holds this many visits.
    #[builder(default = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,
    #[builder(default = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
    /// Also flush a partial buffer this often. Off by default.
    #[builder(default, setter(strip_option))]
    pub flush_interval: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Stopped = 0,
    Running = 1,
    /// The queue is closed and the worker is flushing what is left.
    Draining = 2,
}

impl PipelineState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineState::Running,
            2 => PipelineState::Draining,
            _ => PipelineState::Stopped,
        }
    }
}

/// Lifecycle owner of the visit ingestion worker.
///
/// `Stopped -> Running` on [`start`](Self::start),
/// `Running -> Draining -> Stopped` on [`stop`](Self::stop). A stopped
/// pipeline can be started again.
pub struct VisitPipeline<S> {
    sink: Arc<S>,
    config: PipelineConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: VisitSink> VisitPipeline<S> {
    pub fn new(sink: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            sink,
            config,
            shared: Arc::new(Shared::new()),
            worker: Mutex::new(None),
        }
    }

    /// A producer handle. Recorders created before [`start`](Self::start)
    /// become live once the pipeline runs.
    pub fn recorder(&self) -> VisitRecorder {
        VisitRecorder::new(Arc::clone(&self.shared))
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawns the worker on the current tokio runtime.
    pub fn start(&self) -> Result<(), PipelineError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        // Held until the sender and worker are in place, so a concurrent
        // `stop` never sees `Running` without them.
        let mut slot = self.worker.lock();

        self.shared
            .state
            .compare_exchange(
                PipelineState::Stopped as u8,
                PipelineState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let buffer_capacity = self.config.buffer_capacity.max(1);
        let (sender, queue) = mpsc::channel(self.config.queue_capacity.max(1));
        *self.shared.sender.write() = Some(sender);

        *slot = Some(runtime.spawn(worker::run(
            Arc::clone(&self.sink),
            queue,
            buffer_capacity,
            self.config.flush_interval,
            Arc::clone(&self.shared),
        )));

        info!(
            buffer_capacity,
            queue_capacity = self.config.queue_capacity,
            "Visit pipeline started"
        );
        Ok(())
    }

    /// Closes the intake queue and waits until every accepted visit has been
    /// flushed or discarded.
    pub async fn stop(&self) -> Result<PipelineStats, PipelineError> {
        let handle = {
            let mut slot = self.worker.lock();

            self.shared
                .state
                .compare_exchange(
                    PipelineState::Running as u8,
                    PipelineState::Draining as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .map_err(|_| PipelineError::NotRunning)?;

            // Dropping the only sender closes the queue once it is empty.
            drop(self.shared.sender.write().take());
            slot.take()
        };
        info!(pending = self.stats().pending(), "Visit pipeline draining");

        let joined = match handle {
            Some(handle) => handle.await,
            None => Ok(()),
        };

        self.shared
            .state
            .store(PipelineState::Stopped as u8, Ordering::Release);

        joined.map_err(|e| PipelineError::WorkerPanicked(e.to_string()))?;

        let stats = self.stats();
        info!(
            accepted = stats.accepted,
            dropped = stats.dropped,
            flushed = stats.flushed,
            discarded = stats.discarded,
            "Visit pipeline stopped"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jiff::Timestamp;
    use portal_core::repository::Result as StoreResult;
    use portal_core::{ShortCode, StorageError, VisitEvent};
    use tokio::sync::Semaphore;

    fn visit(i: usize) -> VisitEvent {
        VisitEvent::new(
            ShortCode::new_unchecked(format!("code{i}")),
            format!("10.0.0.{}", i % 256),
            Timestamp::now(),
        )
    }

    /// Keeps every batch it receives.
    #[derive(Default)]
    struct RecordingSink {
        batches: parking_lot::Mutex<Vec<Vec<VisitEvent>>>,
    }

    impl RecordingSink {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().iter().map(Vec::len).collect()
        }

        fn stored(&self) -> usize {
            self.batches.lock().iter().map(Vec::len).sum()
        }
    }

    #[async_trait]
    impl VisitSink for RecordingSink {
        async fn insert_visit_batch(&self, visits: &[VisitEvent]) -> StoreResult<()> {
            self.batches.lock().push(visits.to_vec());
            Ok(())
        }
    }

    /// Rejects every batch.
    struct FailingSink;

    #[async_trait]
    impl VisitSink for FailingSink {
        async fn insert_visit_batch(&self, _visits: &[VisitEvent]) -> StoreResult<()> {
            Err(StorageError::Unavailable("database is down".into()))
        }
    }

    /// Holds each batch until a permit is released.
    struct GatedSink {
        gate: Semaphore,
        inner: RecordingSink,
    }

    #[async_trait]
    impl VisitSink for GatedSink {
        async fn insert_visit_batch(&self, visits: &[VisitEvent]) -> StoreResult<()> {
            self.gate
                .acquire()
                .await
                .map_err(|e| StorageError::Operation(e.to_string()))?
                .forget();
            self.inner.insert_visit_batch(visits).await
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    fn config(buffer_capacity: usize, queue_capacity: usize) -> PipelineConfig {
        PipelineConfig::builder()
            .buffer_capacity(buffer_capacity)
            .queue_capacity(queue_capacity)
            .build()
    }

    #[tokio::test]
    async fn full_buffer_is_flushed_as_one_batch() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = VisitPipeline::new(Arc::clone(&sink), config(3, 100));
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();

        for i in 0..7 {
            recorder.record(visit(i));
        }

        wait_until(|| sink.batch_sizes().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.batch_sizes(), vec![3, 3]);
        assert_eq!(pipeline.stats().pending(), 1);

        pipeline.stop().await.unwrap();
        assert_eq!(sink.batch_sizes(), vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn stop_flushes_partial_buffer() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = VisitPipeline::new(Arc::clone(&sink), PipelineConfig::default());
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();

        for i in 0..42 {
            recorder.record(visit(i));
        }

        let stats = pipeline.stop().await.unwrap();

        assert_eq!(sink.batch_sizes(), vec![42]);
        assert_eq!(stats.accepted, 42);
        assert_eq!(stats.flushed, 42);
        assert_eq!(stats.dropped, 0);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn overflow_is_dropped_and_counted() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = VisitPipeline::new(Arc::clone(&sink), config(1, 4));
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();

        // The worker cannot run between these synchronous calls on a
        // current-thread runtime, so only the queue's capacity gets in.
        let recorded = 100;
        for i in 0..recorded {
            recorder.record(visit(i));
        }

        let stats = pipeline.stop().await.unwrap();

        assert_eq!(stats.dropped, 96);
        assert_eq!(stats.accepted, 4);
        assert_eq!(sink.stored() as u64, recorded as u64 - stats.dropped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_lose_nothing_but_drops() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = VisitPipeline::new(Arc::clone(&sink), config(50, 64));
        pipeline.start().unwrap();

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let recorder = pipeline.recorder();
                tokio::spawn(async move {
                    for i in 0..500 {
                        recorder.record(visit(p * 1000 + i));
                        if i % 50 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let stats = pipeline.stop().await.unwrap();

        assert_eq!(stats.accepted + stats.dropped, 4_000);
        assert_eq!(sink.stored() as u64, 4_000 - stats.dropped);
        assert_eq!(stats.pending(), 0);
    }

    #[tokio::test]
    async fn failed_batches_are_discarded() {
        let pipeline = VisitPipeline::new(Arc::new(FailingSink), config(2, 100));
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();

        for i in 0..5 {
            recorder.record(visit(i));
        }

        let stats = pipeline.stop().await.unwrap();

        assert_eq!(stats.discarded, 5);
        assert_eq!(stats.flushed, 0);
        assert_eq!(stats.batches_discarded, 3);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn stop_waits_for_the_drain() {
        let sink = Arc::new(GatedSink {
            gate: Semaphore::new(0),
            inner: RecordingSink::default(),
        });
        let pipeline = Arc::new(VisitPipeline::new(Arc::clone(&sink), config(10, 100)));
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();
        for i in 0..25 {
            recorder.record(visit(i));
        }

        let stopping = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.stop().await })
        };

        wait_until(|| pipeline.state() == PipelineState::Draining).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!stopping.is_finished());
        assert_eq!(sink.inner.stored(), 0);

        sink.gate.add_permits(3);
        let stats = stopping.await.unwrap().unwrap();

        assert_eq!(sink.inner.batch_sizes(), vec![10, 10, 5]);
        assert_eq!(stats.flushed, 25);
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }

    #[tokio::test]
    async fn interval_flushes_partial_buffer() {
        let sink = Arc::new(RecordingSink::default());
        let config = PipelineConfig::builder()
            .flush_interval(Duration::from_millis(20))
            .build();
        let pipeline = VisitPipeline::new(Arc::clone(&sink), config);
        pipeline.start().unwrap();
        let recorder = pipeline.recorder();

        recorder.record(visit(1));
        recorder.record(visit(2));

        wait_until(|| sink.stored() == 2).await;
        assert_eq!(sink.batch_sizes(), vec![2]);

        pipeline.stop().await.unwrap();
        assert_eq!(sink.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn visits_outside_running_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = VisitPipeline::new(Arc::clone(&sink), PipelineConfig::default());
        let recorder = pipeline.recorder();

        recorder.record(visit(0));
        pipeline.start().unwrap();
        recorder.record(visit(1));
        pipeline.stop().await.unwrap();
        recorder.record(visit(2));

        let stats = pipeline.stats();
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(sink.stored(), 1);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let pipeline = VisitPipeline::new(
            Arc::new(RecordingSink::default()),
            PipelineConfig::default(),
        );
        assert_eq!(pipeline.state(), PipelineState::Stopped);
        assert_eq!(pipeline.stop().await, Err(PipelineError::NotRunning));

        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Running);
        assert_eq!(pipeline.start(), Err(PipelineError::AlreadyRunning));

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Stopped);

        pipeline.start().unwrap();
        pipeline.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_start_and_stop_leave_no_live_worker() {
        for round in 0..200 {
            let sink = Arc::new(RecordingSink::default());
            let pipeline = Arc::new(VisitPipeline::new(
                Arc::clone(&sink),
                PipelineConfig::default(),
            ));

            let starter = {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.start() })
            };
            let stopper = {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move { pipeline.stop().await })
            };
            starter.await.unwrap().unwrap();
            let _ = stopper.await.unwrap();

            if pipeline.state() == PipelineState::Running {
                pipeline.stop().await.unwrap();
            }
            assert_eq!(pipeline.state(), PipelineState::Stopped, "round {round}");

            // A stopped pipeline must not accept anything.
            pipeline.recorder().record(visit(round));
            let stats = pipeline.stats();
            assert_eq!(stats.accepted, 0, "round {round}");
            assert_eq!(stats.dropped, 1, "round {round}");
            assert_eq!(sink.stored(), 0, "round {round}");
        }
    }

    #[test]
    fn start_outside_runtime_fails() {
        let pipeline = VisitPipeline::new(
            Arc::new(RecordingSink::default()),
            PipelineConfig::default(),
        );
        assert_eq!(pipeline.start(), Err(PipelineError::NoRuntime));
        assert_eq!(pipeline.state(), PipelineState::Stopped);
    }
}
