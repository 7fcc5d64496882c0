//! Bounded worker pool pulling jobs off the submission queue.

use crate::job::ExportJob;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// Default number of export pipelines allowed to run in parallel.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Depth of the submission queue. Submitters only block once this many jobs
/// are waiting, independent of worker saturation.
pub const SUBMIT_QUEUE_DEPTH: usize = 1024;

/// Runs one job to completion. Implementations must swallow per-job failures;
/// no error may cross from one job to another.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: Arc<ExportJob>);
}

/// Dispatch loop: admit a queued job whenever fewer than `concurrency` jobs
/// are running. The loop itself blocks on a free slot, so spawned tasks never
/// exceed the bound and already-queued submissions never fail due to
/// saturation. Returns once the submission channel closes.
pub async fn run_export_jobs<E>(
    concurrency: usize,
    mut jobs: mpsc::Receiver<Arc<ExportJob>>,
    executor: Arc<E>,
) where
    E: JobExecutor + 'static,
{
    let slots = Arc::new(Semaphore::new(concurrency.max(1)));

    while let Some(job) = jobs.recv().await {
        let permit = match Arc::clone(&slots).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed; treat it as shutdown anyway.
            Err(_) => break,
        };

        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            let _permit = permit;
            executor.execute(job).await;
        });
    }
}
