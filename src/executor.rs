use crate::harvest::pipeline::{HarvestPipeline, HarvestReport};
use crate::harvest::traits::{HarvestError, HarvestJob, HarvestSource};
use crate::traits::{PackageStore, TrackingStore};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

/// Runs whole harvest cycles, at most `concurrency_limit` at a time.
pub struct HarvesterExecutor {
    semaphore: Arc<Semaphore>,
}

impl HarvesterExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    #[instrument(skip(self, pipeline, job), fields(job = %job.id, source = %job.source.name))]
    pub async fn execute<S, T, P>(
        &self,
        pipeline: &HarvestPipeline<S, T, P>,
        job: &HarvestJob,
    ) -> Result<HarvestReport, HarvestError>
    where
        S: HarvestSource,
        T: TrackingStore,
        P: PackageStore,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| HarvestError::Cancelled(format!("Semaphore error: {}", e)))?;

        info!("Starting harvest for source: {}", job.source.name);
        let result = pipeline.run(job).await;
        info!("Finished harvest for source: {}", job.source.name);
        result
    }

    /// Runs one job per pipeline, reports in input order.
    pub async fn execute_all<S, T, P>(
        &self,
        jobs: &[(Arc<HarvestPipeline<S, T, P>>, HarvestJob)],
    ) -> Vec<Result<HarvestReport, HarvestError>>
    where
        S: HarvestSource,
        T: TrackingStore,
        P: PackageStore,
    {
        join_all(
            jobs.iter()
                .map(|(pipeline, job)| self.execute(pipeline.as_ref(), job)),
        )
        .await
    }
}
