//! Geospatial compute backend: the injected client/context seam.
//!
//! The backend is the crate's single collaborator for heavy computation.
//! Its contract has two phases:
//!
//! - **build** (sync): assemble a lazy expression locally; pure, fails only
//!   on malformed input
//! - **evaluate** (async): count, page, or reduce an expression; these are
//!   the blocking, rate-limited, fallible operations
//!
//! Two implementations ship: [`HttpBackend`] for the remote service and
//! [`MemoryBackend`], a deterministic in-process stand-in for offline runs
//! and tests. [`BackendRegistry`] maps endpoint names to shared instances.

mod expression;
mod http;
mod memory;
mod rate_limiter;
mod registry;

pub use expression::{DensityExpr, GridExpr, PointsExpr};
pub use http::HttpBackend;
pub use memory::{MemoryBackend, MemoryRaster};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use registry::BackendRegistry;

use crate::models::{
    Aoi, CategoryAreas, Crs, GridShape, PointRecord, RasterRef, Result, SamplingMethod,
};
use async_trait::async_trait;

/// Compute backend contract.
///
/// Evaluate operations may block for a long time server-side; callers
/// dispatch them through bounded pools, never in unbounded fan-out. Any
/// evaluate failure is fatal for the batch that issued it, so
/// implementations must not retry internally.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Endpoint name (for logging).
    fn name(&self) -> &str;

    /// Build a grid tiling expression over the AOI.
    fn create_grid(
        &self,
        aoi: &Aoi,
        shape: GridShape,
        cell_size: f64,
        crs: &Crs,
    ) -> Result<GridExpr> {
        GridExpr::build(aoi, shape, cell_size, crs)
    }

    /// Build a sample-point expression over a grid.
    fn create_points(
        &self,
        grid: &GridExpr,
        method: SamplingMethod,
        seed: u64,
        n_points: u32,
    ) -> Result<PointsExpr> {
        PointsExpr::build(grid, method, seed, n_points)
    }

    /// Build a point-density raster expression at the given pixel scale.
    fn rasterize_density(&self, points: &PointsExpr, scale: f64) -> Result<DensityExpr> {
        DensityExpr::build(points, scale)
    }

    /// Evaluate the total number of features a point expression yields.
    async fn count_features(&self, points: &PointsExpr) -> Result<u64>;

    /// Evaluate one page of up to `batch_size` records starting at `offset`.
    async fn page_features(
        &self,
        points: &PointsExpr,
        batch_size: u64,
        offset: u64,
    ) -> Result<Vec<PointRecord>>;

    /// Native pixel scale of a raster asset, in meters.
    async fn nominal_scale(&self, raster: &RasterRef) -> Result<f64>;

    /// Grouped sum of pixel area (hectares) by category over the AOI.
    ///
    /// With `mask` set, only pixels containing at least one sample point of
    /// the density expression contribute; without it, the reduction is
    /// exhaustive (the ground truth).
    async fn reduce_area_by_category(
        &self,
        raster: &RasterRef,
        aoi: &Aoi,
        scale: f64,
        mask: Option<&DensityExpr>,
    ) -> Result<CategoryAreas>;

    /// Probe the endpoint.
    async fn health_check(&self) -> HealthCheckResult;
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Endpoint name
    pub endpoint: String,
    /// Health status
    pub status: HealthStatus,
    /// Latency in milliseconds (if reachable)
    pub latency_ms: Option<u64>,
    /// Error message (if unhealthy or unreachable)
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Endpoint is responding normally
    Healthy,
    /// Endpoint is responding but with errors
    Unhealthy,
    /// Endpoint is not reachable
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}
