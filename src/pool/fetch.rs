//! Bounded fetch pipeline.
//!
//! Materializes a large remote point collection locally without unbounded
//! concurrent load on the backend: one page request per offset, dispatched
//! through a semaphore capped at the worker count. Pages complete in
//! arbitrary order; they are re-sorted by offset before concatenation so
//! record indices reproduce across runs. Any page failure is fatal for the
//! whole pipeline, with no retry and no partial result.

use crate::backend::{Backend, PointsExpr};
use crate::models::{FetchConfig, PointRecord, Result, SbaeError};
use crate::pool::ProgressSink;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Bounded worker pool for paging point collections.
pub struct FetchPool {
    backend: Arc<dyn Backend>,
    /// Max concurrent page fetches
    workers: usize,
    /// Backend page cap (requests above this are rejected server-side)
    page_cap: u64,
    semaphore: Arc<Semaphore>,
}

impl FetchPool {
    pub fn new(backend: Arc<dyn Backend>, workers: usize, page_cap: u64) -> Self {
        let workers = workers.max(1);
        Self {
            backend,
            workers,
            page_cap: page_cap.max(1),
            semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn from_config(backend: Arc<dyn Backend>, config: &FetchConfig) -> Self {
        Self::new(backend, config.workers, config.page_cap)
    }

    /// Page size for a collection of `total` records.
    ///
    /// min(total / workers, page_cap), clamped to at least 1 so collections
    /// smaller than the worker count still fetch.
    pub fn batch_size(&self, total: u64) -> u64 {
        (total / self.workers as u64).min(self.page_cap).max(1)
    }

    /// Offset sequence 0, batch, 2·batch, … covering [0, total).
    pub fn offsets(total: u64, batch_size: u64) -> Vec<u64> {
        (0..total).step_by(batch_size as usize).collect()
    }

    /// Fetch all `total` records of a point collection.
    ///
    /// Progress is emitted as completed_tasks / total_tasks after each page
    /// completes, with a forced terminal emission of exactly 1.0.
    pub async fn fetch_all(
        &self,
        points: &PointsExpr,
        total: u64,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<PointRecord>> {
        if total == 0 {
            progress.update(1.0);
            return Ok(Vec::new());
        }

        let batch_size = self.batch_size(total);
        let offsets = Self::offsets(total, batch_size);
        let total_tasks = offsets.len();

        info!(
            total = total,
            workers = self.workers,
            batch_size = batch_size,
            tasks = total_tasks,
            "Starting bounded fetch"
        );

        let mut tasks: JoinSet<Result<(u64, Vec<PointRecord>)>> = JoinSet::new();
        for offset in offsets {
            let backend = Arc::clone(&self.backend);
            let points = points.clone();
            let semaphore = Arc::clone(&self.semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SbaeError::Internal("fetch semaphore closed".to_string()))?;
                let page = backend.page_features(&points, batch_size, offset).await?;
                debug!(offset = offset, records = page.len(), "Page fetched");
                Ok((offset, page))
            });
        }

        // Collect in completion order; a single failure aborts everything
        let mut pages: Vec<(u64, Vec<PointRecord>)> = Vec::with_capacity(total_tasks);
        let mut last_emitted = 0.0_f64;
        while let Some(joined) = tasks.join_next().await {
            let page = joined
                .map_err(|e| SbaeError::Internal(format!("fetch task panicked: {e}")))??;
            pages.push(page);
            last_emitted = pages.len() as f64 / total_tasks as f64;
            progress.update(last_emitted);
        }
        if last_emitted != 1.0 {
            progress.update(1.0);
        }

        // Normalize: completion order is arbitrary, offset order is not
        pages.sort_by_key(|(offset, _)| *offset);
        let mut records: Vec<PointRecord> = pages.into_iter().flat_map(|(_, p)| p).collect();
        for (index, record) in records.iter_mut().enumerate() {
            record.plot_id = index as u64;
        }

        Ok(records)
    }
}
