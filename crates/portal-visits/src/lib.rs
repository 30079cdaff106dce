//! Asynchronous, bounded, batched visit ingestion.
//!
//! Readers hand visits to a [`VisitRecorder`], which never blocks: when the
//! intake queue is full the visit is dropped and counted. A single worker
//! task owns the batch buffer and writes full batches to a
//! [`VisitSink`](portal_core::VisitSink). [`VisitPipeline::stop`] drains the
//! queue and flushes the remainder before returning.

pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod stats;
mod worker;

pub use error::PipelineError;
pub use pipeline::{
    PipelineConfig, PipelineState, VisitPipeline, DEFAULT_BUFFER_CAPACITY,
    DEFAULT_QUEUE_CAPACITY,
};
pub use recorder::VisitRecorder;
pub use stats::PipelineStats;
