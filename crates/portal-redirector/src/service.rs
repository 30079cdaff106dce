use crate::resolver::CacheAsideResolver;
use jiff::Timestamp;
use portal_core::{ReadRepository, ServiceError, ShortCode, UrlCache, VisitEvent};
use portal_visits::VisitRecorder;
use tracing::trace;

/// Exposes `Resolve` and `RecordVisit`.
///
/// Visit recording never waits and never fails; see [`VisitRecorder::record`].
#[derive(Debug, Clone)]
pub struct ResolutionService<R, C> {
    resolver: CacheAsideResolver<R, C>,
    recorder: VisitRecorder,
}

impl<R: ReadRepository, C: UrlCache> ResolutionService<R, C> {
    pub fn new(resolver: CacheAsideResolver<R, C>, recorder: VisitRecorder) -> Self {
        Self { resolver, recorder }
    }

    pub fn resolver(&self) -> &CacheAsideResolver<R, C> {
        &self.resolver
    }

    /// Looks up the long URL for `code` without recording a visit.
    pub async fn resolve(&self, code: &ShortCode) -> Result<String, ServiceError> {
        self.resolver.resolve(code).await
    }

    /// Hands a visit to the ingestion pipeline.
    pub fn record_visit(&self, code: ShortCode, visitor_ip: impl Into<String>, visited_at: Timestamp) {
        self.recorder
            .record(VisitEvent::new(code, visitor_ip, visited_at));
    }

    /// Resolves `code` and, only when that succeeds, records a visit stamped
    /// with the current time.
    pub async fn redirect(
        &self,
        code: &ShortCode,
        visitor_ip: impl Into<String>,
    ) -> Result<String, ServiceError> {
        let long_url = self.resolve(code).await?;
        self.record_visit(code.clone(), visitor_ip, Timestamp::now());
        trace!(code = %code, "Recorded visit");
        Ok(long_url)
    }
}
