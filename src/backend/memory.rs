//! Deterministic in-process backend.
//!
//! Materializes grids, sample points, and grouped reductions locally so
//! offline runs and the test suite exercise the full pipeline without a
//! remote service. Coordinates are treated as already being in the target
//! CRS (planar meters); grid cells cover the AOI bounding box and are kept
//! when they intersect the AOI polygon. Cell indices are row-major over
//! that cover (backend-defined, as the contract allows).
//!
//! Random sampling derives each cell's seed as (cell_index + 1) × global
//! seed, so runs reproduce exactly while cells stay decorrelated. A global
//! seed of zero collapses every per-cell seed to zero; the designer warns
//! about it upstream.

use crate::backend::{
    Backend, DensityExpr, HealthCheckResult, HealthStatus, GridExpr, PointsExpr,
};
use crate::models::{
    Aoi, BackendError, CategoryAreas, CategoryKey, PointRecord, RasterRef, Result, SamplingMethod,
    SbaeError,
};
use async_trait::async_trait;
use geo::{BoundingRect, Contains, Coord, Intersects, Point, Rect};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Synthetic categorical raster: a pixel scale plus a classification
/// function over planar coordinates.
pub struct MemoryRaster {
    pixel_scale: f64,
    classify: Box<dyn Fn(f64, f64) -> f64 + Send + Sync>,
}

impl MemoryRaster {
    pub fn new(
        pixel_scale: f64,
        classify: impl Fn(f64, f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            pixel_scale,
            classify: Box::new(classify),
        }
    }

    pub fn pixel_scale(&self) -> f64 {
        self.pixel_scale
    }
}

/// In-process backend for offline runs and tests.
pub struct MemoryBackend {
    name: String,
    rasters: HashMap<String, MemoryRaster>,
    /// Artificial per-offset page latency, for exercising completion order
    page_delays: HashMap<u64, Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            name: "memory".to_string(),
            rasters: HashMap::new(),
            page_delays: HashMap::new(),
        }
    }

    /// Register a synthetic raster under an asset id.
    pub fn with_raster(mut self, asset_id: impl Into<String>, raster: MemoryRaster) -> Self {
        self.rasters.insert(asset_id.into(), raster);
        self
    }

    /// Backend with a two-class demo raster under asset id "demo":
    /// category 1 west of the AOI bbox midline, category 2 east of it.
    pub fn with_demo_raster() -> Self {
        Self::new().with_raster(
            "demo",
            MemoryRaster::new(30.0, |x, _y| if x.rem_euclid(2000.0) < 1000.0 { 1.0 } else { 2.0 }),
        )
    }

    /// Delay a specific page fetch (testing aid).
    pub fn with_page_delay(mut self, offset: u64, delay: Duration) -> Self {
        self.page_delays.insert(offset, delay);
        self
    }

    fn bounds(aoi: &Aoi) -> Result<Rect<f64>> {
        aoi.geometry()
            .bounding_rect()
            .ok_or_else(|| SbaeError::Internal("AOI has no bounding rect".to_string()))
    }

    /// Materialize the grid cells covering the AOI, row-major.
    fn grid_cells(grid: &GridExpr) -> Result<Vec<Rect<f64>>> {
        let bounds = Self::bounds(&grid.aoi)?;
        let size = grid.cell_size;
        let cols = ((bounds.width() / size).ceil() as u64).max(1);
        let rows = ((bounds.height() / size).ceil() as u64).max(1);

        let mut cells = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let min = Coord {
                    x: bounds.min().x + col as f64 * size,
                    y: bounds.min().y + row as f64 * size,
                };
                let max = Coord {
                    x: min.x + size,
                    y: min.y + size,
                };
                let cell = Rect::new(min, max);
                if grid.aoi.geometry().intersects(&cell.to_polygon()) {
                    cells.push(cell);
                }
            }
        }
        Ok(cells)
    }

    /// Number of cells the grid materializes to (testing and reporting aid).
    pub fn cell_count(&self, grid: &GridExpr) -> Result<u64> {
        Ok(Self::grid_cells(grid)?.len() as u64)
    }

    /// Materialize the full point collection in cell order.
    fn materialize_points(points: &PointsExpr) -> Result<Vec<PointRecord>> {
        let cells = Self::grid_cells(&points.grid)?;
        let mut records = Vec::new();

        for (cell_index, cell) in cells.iter().enumerate() {
            let cell_index = cell_index as u64;
            match points.method {
                SamplingMethod::Systematic => {
                    let center = cell.center();
                    records.push(PointRecord {
                        plot_id: 0,
                        lon: center.x,
                        lat: center.y,
                        cell_index,
                        seed_offset: None,
                        attributes: serde_json::Value::Null,
                    });
                }
                SamplingMethod::Random => {
                    let cell_seed = (cell_index + 1).wrapping_mul(points.seed);
                    let mut rng = ChaCha8Rng::seed_from_u64(cell_seed);
                    for _ in 0..points.n_points {
                        let x = rng.gen_range(cell.min().x..cell.max().x);
                        let y = rng.gen_range(cell.min().y..cell.max().y);
                        records.push(PointRecord {
                            plot_id: 0,
                            lon: x,
                            lat: y,
                            cell_index,
                            seed_offset: Some(cell_seed),
                            attributes: serde_json::Value::Null,
                        });
                    }
                }
            }
        }

        Ok(records)
    }

    fn raster(&self, raster: &RasterRef) -> Result<&MemoryRaster> {
        self.rasters
            .get(&raster.asset_id)
            .ok_or_else(|| BackendError::AssetNotFound(raster.asset_id.clone()).into())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count_features(&self, points: &PointsExpr) -> Result<u64> {
        let cells = Self::grid_cells(&points.grid)?.len() as u64;
        Ok(cells * points.points_per_cell())
    }

    async fn page_features(
        &self,
        points: &PointsExpr,
        batch_size: u64,
        offset: u64,
    ) -> Result<Vec<PointRecord>> {
        if let Some(delay) = self.page_delays.get(&offset) {
            tokio::time::sleep(*delay).await;
        }

        let all = Self::materialize_points(points)?;
        let start = (offset as usize).min(all.len());
        let end = (offset as usize + batch_size as usize).min(all.len());
        Ok(all[start..end].to_vec())
    }

    async fn nominal_scale(&self, raster: &RasterRef) -> Result<f64> {
        Ok(self.raster(raster)?.pixel_scale)
    }

    async fn reduce_area_by_category(
        &self,
        raster: &RasterRef,
        aoi: &Aoi,
        scale: f64,
        mask: Option<&DensityExpr>,
    ) -> Result<CategoryAreas> {
        let memory_raster = self.raster(raster)?;
        let bounds = Self::bounds(aoi)?;

        // Pixels containing at least one sample point, keyed by (col, row)
        let masked_pixels: Option<HashSet<(i64, i64)>> = match mask {
            Some(density) => {
                let sample = Self::materialize_points(&density.points)?;
                Some(
                    sample
                        .iter()
                        .map(|p| {
                            (
                                ((p.lon - bounds.min().x) / scale).floor() as i64,
                                ((p.lat - bounds.min().y) / scale).floor() as i64,
                            )
                        })
                        .collect(),
                )
            }
            None => None,
        };

        let cols = ((bounds.width() / scale).ceil() as i64).max(1);
        let rows = ((bounds.height() / scale).ceil() as i64).max(1);
        let pixel_area_ha = scale * scale / 1.0e4;

        let mut sums: BTreeMap<CategoryKey, f64> = BTreeMap::new();
        for row in 0..rows {
            for col in 0..cols {
                if let Some(masked) = &masked_pixels {
                    if !masked.contains(&(col, row)) {
                        continue;
                    }
                }

                let x = bounds.min().x + (col as f64 + 0.5) * scale;
                let y = bounds.min().y + (row as f64 + 0.5) * scale;
                if !aoi.geometry().contains(&Point::new(x, y)) {
                    continue;
                }

                let category = (memory_raster.classify)(x, y);
                *sums.entry(CategoryKey::from_raw(category)).or_insert(0.0) += pixel_area_ha;
            }
        }

        let mut areas = CategoryAreas::new();
        for (key, area) in sums {
            areas.insert(key, area);
        }
        Ok(areas)
    }

    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            endpoint: self.name.clone(),
            status: HealthStatus::Healthy,
            latency_ms: Some(0),
            error: None,
        }
    }
}
