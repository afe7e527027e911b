//! Multi-resolution area simulator.
//!
//! Repeats the grid→sample→reduce pipeline at eight resolution variants and
//! runs the exhaustive ground-truth reduction alongside them: nine tasks in
//! a pool sized to the task count, so all of them run in parallel. Results
//! are collected keyed by task tag on the coordinating task; completion
//! order never matters. Any task failure is fatal for the whole simulation.

use crate::backend::Backend;
use crate::design::Designer;
use crate::models::{CategoryAreas, RasterRef, Result, SbaeError, SimulationOutcome, TaskTag};
use crate::pool::ProgressSink;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Resolution multipliers applied to the base grid size.
pub const RESOLUTION_MULTIPLIERS: [u32; 8] = [1, 2, 3, 4, 5, 10, 20, 50];

/// Runs the multi-resolution simulation against a categorical raster.
pub struct Simulator {
    designer: Designer,
    raster: RasterRef,
}

impl Simulator {
    pub fn new(designer: Designer, raster: RasterRef) -> Self {
        Self { designer, raster }
    }

    pub fn designer(&self) -> &Designer {
        &self.designer
    }

    pub fn raster(&self) -> &RasterRef {
        &self.raster
    }

    /// Grid sizes tested for a base size.
    pub fn resolutions(base_grid_size: u32) -> Vec<u32> {
        RESOLUTION_MULTIPLIERS
            .iter()
            .map(|m| base_grid_size * m)
            .collect()
    }

    /// Run the full simulation: eight resolution passes plus ground truth.
    pub async fn simulate(
        self: &Arc<Self>,
        base_grid_size: u32,
        progress: &dyn ProgressSink,
    ) -> Result<SimulationOutcome> {
        // Surface parameter errors before anything is dispatched
        self.designer.shape()?;
        self.designer.method()?;

        let backend = Arc::clone(self.designer.backend());
        let scale = backend.nominal_scale(&self.raster).await?;

        let mut tags: Vec<TaskTag> = Self::resolutions(base_grid_size)
            .into_iter()
            .map(TaskTag::Resolution)
            .collect();
        tags.push(TaskTag::RealArea);
        let total_tasks = tags.len();

        info!(
            base_grid_size = base_grid_size,
            raster = %self.raster.asset_id,
            scale = scale,
            tasks = total_tasks,
            "Starting multi-resolution simulation"
        );

        // One permit per task: the pool is sized to run everything at once
        let semaphore = Arc::new(Semaphore::new(total_tasks));
        let mut tasks: JoinSet<Result<(TaskTag, CategoryAreas)>> = JoinSet::new();

        for tag in tags {
            let simulator = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SbaeError::Internal("simulation semaphore closed".to_string()))?;
                let areas = match tag {
                    TaskTag::Resolution(grid_size) => {
                        simulator.simulated_area(grid_size, scale).await?
                    }
                    TaskTag::RealArea => simulator.real_area(scale).await?,
                };
                debug!(task = %tag, categories = areas.len(), "Simulation task complete");
                Ok((tag, areas))
            });
        }

        // Keyed collection on the coordinating task; completion order is free
        let mut results: BTreeMap<TaskTag, CategoryAreas> = BTreeMap::new();
        let mut last_emitted = 0.0_f64;
        while let Some(joined) = tasks.join_next().await {
            let (tag, areas) = joined
                .map_err(|e| SbaeError::Internal(format!("simulation task panicked: {e}")))??;
            results.insert(tag, areas);
            last_emitted = results.len() as f64 / total_tasks as f64;
            progress.update(last_emitted);
        }
        if last_emitted != 1.0 {
            progress.update(1.0);
        }

        let real = results
            .remove(&TaskTag::RealArea)
            .ok_or_else(|| SbaeError::Internal("real-area task produced no result".to_string()))?;

        let simulated = results
            .into_iter()
            .map(|(tag, areas)| match tag {
                TaskTag::Resolution(size) => Ok((size, areas)),
                TaskTag::RealArea => Err(SbaeError::Internal(
                    "duplicate real-area result".to_string(),
                )),
            })
            .collect::<Result<BTreeMap<u32, CategoryAreas>>>()?;

        Ok(SimulationOutcome { real, simulated })
    }

    /// Area a survey at this resolution would report: sample the grid, mask
    /// the raster to sampled pixels, reduce by category.
    async fn simulated_area(&self, grid_size: u32, scale: f64) -> Result<CategoryAreas> {
        let backend = self.designer.backend();
        let grid = self.designer.build_grid(grid_size)?;
        let points = self.designer.build_points(&grid)?;
        let density = backend.rasterize_density(&points, scale)?;

        backend
            .reduce_area_by_category(&self.raster, self.designer.aoi(), scale, Some(&density))
            .await
    }

    /// Ground truth: exhaustive reduction with no sampling.
    async fn real_area(&self, scale: f64) -> Result<CategoryAreas> {
        self.designer
            .backend()
            .reduce_area_by_category(&self.raster, self.designer.aoi(), scale, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryRaster};
    use crate::models::{Aoi, DesignConfig};
    use crate::pool::NullProgress;
    use geo::{polygon, MultiPolygon};

    fn simulator(method: &str, raster_id: &str) -> Arc<Simulator> {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1000.0, y: 0.0),
            (x: 1000.0, y: 1000.0),
            (x: 0.0, y: 1000.0),
        ];
        let aoi = Aoi::new("block", MultiPolygon(vec![poly])).unwrap();
        let backend = MemoryBackend::new().with_raster(
            "split",
            MemoryRaster::new(20.0, |x, _| if x < 500.0 { 1.0 } else { 2.0 }),
        );
        let params = DesignConfig {
            shape: Some("square".to_string()),
            method: Some(method.to_string()),
            grid_size: 100,
            n_points: 1,
            seed: 42,
            crs: "EPSG:3857".to_string(),
        };
        let designer = Designer::new(Arc::new(backend), aoi, params);
        Arc::new(Simulator::new(designer, RasterRef::new(raster_id)))
    }

    #[test]
    fn eight_resolutions_are_derived_from_the_base_size() {
        assert_eq!(
            Simulator::resolutions(100),
            vec![100, 200, 300, 400, 500, 1000, 2000, 5000]
        );
    }

    #[tokio::test]
    async fn outcome_has_one_table_per_resolution_plus_ground_truth() {
        let simulator = simulator("systematic", "split");
        let outcome = simulator.simulate(100, &NullProgress).await.unwrap();

        assert_eq!(outcome.simulated.len(), RESOLUTION_MULTIPLIERS.len());
        for resolution in Simulator::resolutions(100) {
            assert!(outcome.simulated.contains_key(&resolution));
        }
        assert!(!outcome.real.is_empty());
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_area_tables() {
        let simulator = simulator("random", "split");
        let first = simulator.simulate(100, &NullProgress).await.unwrap();
        let second = simulator.simulate(100, &NullProgress).await.unwrap();

        assert_eq!(first.real, second.real);
        assert_eq!(first.simulated, second.simulated);
    }

    #[tokio::test]
    async fn finer_grids_cover_at_least_as_much_as_their_tables_report() {
        let simulator = simulator("systematic", "split");
        let outcome = simulator.simulate(100, &NullProgress).await.unwrap();

        // Sampled coverage can never exceed the exhaustive total
        let real_total = outcome.real.total();
        for areas in outcome.simulated.values() {
            assert!(areas.total() <= real_total + 1e-9);
        }
    }

    #[tokio::test]
    async fn missing_raster_fails_the_whole_simulation() {
        let simulator = simulator("systematic", "missing");
        let result = simulator.simulate(100, &NullProgress).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unset_method_fails_before_dispatch() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
        ];
        let aoi = Aoi::new("block", MultiPolygon(vec![poly])).unwrap();
        let params = DesignConfig {
            shape: Some("square".to_string()),
            method: None,
            ..DesignConfig::default()
        };
        let designer = Designer::new(Arc::new(MemoryBackend::new()), aoi, params);
        let simulator = Arc::new(Simulator::new(designer, RasterRef::new("any")));

        let result = simulator.simulate(100, &NullProgress).await;
        assert!(matches!(result, Err(SbaeError::MissingParameter("method"))));
    }
}
