//! Simulation pipeline.
//!
//! Flow: AOI + raster + config → multi-resolution simulation → error
//! aggregation → error-table CSV.

use crate::backend::Backend;
use crate::design::Designer;
use crate::export;
use crate::models::{Aoi, Config, RasterRef, Result, SbaeError};
use crate::pool::Simulator;
use crate::stats::{self, ErrorTable};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Report of one simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub run_id: String,
    pub aoi: String,
    pub raster: String,
    pub base_grid_size: u32,
    pub resolutions: Vec<u32>,
    pub categories: usize,
    pub real_total_ha: f64,
    pub output: PathBuf,
    pub runtime_secs: f64,
}

/// Runs the multi-resolution simulation and aggregates the error curve.
pub struct SimulationPipeline {
    simulator: Arc<Simulator>,
    config: Config,
}

impl SimulationPipeline {
    pub fn new(config: Config, backend: Arc<dyn Backend>, aoi: Aoi, raster: RasterRef) -> Self {
        let designer = Designer::new(backend, aoi, config.design.clone());
        Self {
            simulator: Arc::new(Simulator::new(designer, raster)),
            config,
        }
    }

    /// Run the full simulation pipeline, returning the report and table.
    pub async fn run(&self) -> Result<(SimulationReport, ErrorTable)> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let base_grid_size = self.config.design.grid_size;
        let aoi_name = self.simulator.designer().aoi().name().to_string();

        info!(
            run_id = %run_id,
            aoi = %aoi_name,
            base_grid_size = base_grid_size,
            "Starting simulation pipeline"
        );

        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}% {msg}")
                .map_err(|e| SbaeError::Internal(format!("progress template: {e}")))?
                .progress_chars("##-"),
        );
        bar.set_message("simulating resolutions");

        let bar_sink = bar.clone();
        let sink = move |fraction: f64| {
            bar_sink.set_position((fraction * 100.0).round() as u64);
        };

        let outcome = self.simulator.simulate(base_grid_size, &sink).await?;
        bar.finish_with_message("aggregating");

        let table = stats::error_table(&outcome, self.config.simulation.zero_area_policy)?;
        let output = export::write_error_table_csv(&self.config.output.dir, &aoi_name, &table)?;

        let report = SimulationReport {
            run_id,
            aoi: aoi_name,
            raster: self.simulator.raster().asset_id.clone(),
            base_grid_size,
            resolutions: Simulator::resolutions(base_grid_size),
            categories: table.categories().count(),
            real_total_ha: outcome.real.total(),
            output,
            runtime_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            run_id = %report.run_id,
            categories = report.categories,
            real_total_ha = format!("{:.1}", report.real_total_ha),
            output = ?report.output,
            runtime_secs = format!("{:.1}", report.runtime_secs),
            "Simulation pipeline complete"
        );

        Ok((report, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryRaster};
    use crate::models::{CategoryKey, DesignConfig, OutputConfig};
    use geo::{polygon, MultiPolygon};
    use tempfile::TempDir;

    fn pipeline(dir: &TempDir) -> SimulationPipeline {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 1000.0, y: 0.0),
            (x: 1000.0, y: 1000.0),
            (x: 0.0, y: 1000.0),
        ];
        let aoi = Aoi::new("patch", MultiPolygon(vec![poly])).unwrap();
        let backend = MemoryBackend::new().with_raster(
            "split",
            MemoryRaster::new(20.0, |x, _| if x < 500.0 { 1.0 } else { 2.0 }),
        );
        let config = Config {
            design: DesignConfig {
                shape: Some("square".to_string()),
                method: Some("systematic".to_string()),
                grid_size: 100,
                n_points: 1,
                seed: 3,
                crs: "EPSG:3857".to_string(),
            },
            output: OutputConfig {
                dir: dir.path().to_path_buf(),
            },
            ..Config::default()
        };
        SimulationPipeline::new(config, Arc::new(backend), aoi, RasterRef::new("split"))
    }

    #[tokio::test]
    async fn simulation_run_exports_an_error_curve() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let (report, table) = pipeline.run().await.unwrap();
        assert_eq!(report.resolutions.len(), 8);
        assert_eq!(report.categories, 2);
        assert!(report.real_total_ha > 0.0);

        for category in ["1", "2"] {
            for resolution in &report.resolutions {
                assert!(
                    table
                        .get(&CategoryKey::from(category), *resolution)
                        .is_some(),
                    "missing entry for {category} at {resolution}"
                );
            }
        }

        let content = std::fs::read_to_string(&report.output).unwrap();
        assert!(content.starts_with("category,"));
        assert_eq!(content.lines().count(), 3);
    }
}
