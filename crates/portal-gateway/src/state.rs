use portal_core::{
    CreateShortUrlParams, DefaultValidator, ServiceError, ShortCode, Store, UrlCache,
};
use portal_generator::RandomCodeGenerator;
use portal_redirector::{CacheAsideResolver, ResolutionService, DEFAULT_CACHE_TTL};
use portal_shortener::{AllocationConfig, AllocationService};
use portal_visits::{PipelineConfig, PipelineError, PipelineStats, PipelineState, VisitPipeline};
use std::sync::Arc;
use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, TypedBuilder)]
pub struct AppConfig {
    #[builder(default = DEFAULT_CACHE_TTL)]
    pub cache_ttl: Duration,
    #[builder(default)]
    pub allocation: AllocationConfig,
    #[builder(default)]
    pub pipeline: PipelineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything a transport layer needs: the write path, the read path and
/// the lifecycle hooks of the visit pipeline.
pub struct AppState<S, C> {
    allocation: AllocationService<S, RandomCodeGenerator>,
    resolution: ResolutionService<S, C>,
    pipeline: VisitPipeline<S>,
}

impl<S: Store, C: UrlCache> AppState<S, C> {
    /// Wires the services around one shared store. The pipeline is created
    /// stopped.
    pub fn new(store: Arc<S>, cache: C, config: AppConfig) -> Self {
        let pipeline = VisitPipeline::new(Arc::clone(&store), config.pipeline);
        let resolver = CacheAsideResolver::new(Arc::clone(&store), cache, config.cache_ttl);
        let resolution = ResolutionService::new(resolver, pipeline.recorder());
        let allocation = AllocationService::new(
            store,
            RandomCodeGenerator::new(),
            DefaultValidator,
            config.allocation,
        );

        Self {
            allocation,
            resolution,
            pipeline,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.allocation.store()
    }

    pub async fn create_short_url(
        &self,
        params: CreateShortUrlParams,
    ) -> Result<ShortCode, ServiceError> {
        self.allocation.create_short_url(params).await
    }

    pub async fn resolve(&self, code: &ShortCode) -> Result<String, ServiceError> {
        self.resolution.resolve(code).await
    }

    /// Resolves `code` and records a visit from `visitor_ip` on success.
    pub async fn redirect(
        &self,
        code: &ShortCode,
        visitor_ip: impl Into<String>,
    ) -> Result<String, ServiceError> {
        self.resolution.redirect(code, visitor_ip).await
    }

    pub fn start_pipeline(&self) -> Result<(), PipelineError> {
        self.pipeline.start()
    }

    /// Closes the intake queue and waits for every accepted visit to be
    /// flushed or discarded.
    pub async fn stop_pipeline(&self) -> Result<PipelineStats, PipelineError> {
        self.pipeline.stop().await
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.pipeline.state()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}
