//! Designer: resolves user parameters into grid and sampling expressions.
//!
//! Validation happens here, before any backend call: a missing shape or
//! method is `MissingParameter`, an unknown one is `UnsupportedShape` /
//! `UnsupportedMethod`, and an empty AOI never gets this far (rejected at
//! construction). The designer is also re-invoked by the simulator with
//! varying grid sizes, so the grid size is an argument rather than state.

use crate::backend::{Backend, GridExpr, PointsExpr};
use crate::models::{Aoi, Crs, DesignConfig, GridShape, Result, SamplingMethod};
use std::sync::Arc;
use tracing::warn;

pub struct Designer {
    backend: Arc<dyn Backend>,
    aoi: Aoi,
    params: DesignConfig,
}

impl Designer {
    pub fn new(backend: Arc<dyn Backend>, aoi: Aoi, params: DesignConfig) -> Self {
        Self {
            backend,
            aoi,
            params,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn aoi(&self) -> &Aoi {
        &self.aoi
    }

    pub fn params(&self) -> &DesignConfig {
        &self.params
    }

    /// Resolve the configured shape, or fail before touching the backend.
    pub fn shape(&self) -> Result<GridShape> {
        GridShape::parse(self.params.shape.as_deref())
    }

    /// Resolve the configured method, or fail before touching the backend.
    pub fn method(&self) -> Result<SamplingMethod> {
        SamplingMethod::parse(self.params.method.as_deref())
    }

    /// Build the grid expression at the given cell size.
    pub fn build_grid(&self, grid_size: u32) -> Result<GridExpr> {
        let shape = self.shape()?;
        self.backend.create_grid(
            &self.aoi,
            shape,
            f64::from(grid_size),
            &Crs(self.params.crs.clone()),
        )
    }

    /// Build the sample-point expression over a grid.
    pub fn build_points(&self, grid: &GridExpr) -> Result<PointsExpr> {
        let method = self.method()?;

        if method == SamplingMethod::Random && self.params.seed == 0 {
            // Every per-cell seed becomes 0: identical randomness across cells
            warn!(
                aoi = self.aoi.name(),
                "seed is 0, random samples will be correlated across cells"
            );
        }

        self.backend
            .create_points(grid, method, self.params.seed, self.params.n_points)
    }

    /// Expected sample count for a grid of `cell_count` cells.
    pub fn expected_points(&self, cell_count: u64) -> Result<u64> {
        Ok(match self.method()? {
            SamplingMethod::Systematic => cell_count,
            SamplingMethod::Random => cell_count * u64::from(self.params.n_points),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::SbaeError;
    use geo::{polygon, MultiPolygon};

    fn test_designer(shape: Option<&str>, method: Option<&str>) -> Designer {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 400.0, y: 0.0),
            (x: 400.0, y: 400.0),
            (x: 0.0, y: 400.0),
        ];
        let aoi = Aoi::new("block", MultiPolygon(vec![poly])).unwrap();
        let params = DesignConfig {
            shape: shape.map(String::from),
            method: method.map(String::from),
            grid_size: 100,
            n_points: 2,
            seed: 42,
            crs: "EPSG:3857".to_string(),
        };
        Designer::new(Arc::new(MemoryBackend::new()), aoi, params)
    }

    #[test]
    fn unset_shape_fails_before_backend() {
        let designer = test_designer(None, Some("systematic"));
        assert!(matches!(
            designer.build_grid(100),
            Err(SbaeError::MissingParameter("shape"))
        ));
    }

    #[test]
    fn unset_method_fails_before_backend() {
        let designer = test_designer(Some("square"), None);
        let grid = designer.build_grid(100).unwrap();
        assert!(matches!(
            designer.build_points(&grid),
            Err(SbaeError::MissingParameter("method"))
        ));
    }

    #[test]
    fn unsupported_shape_is_rejected() {
        let designer = test_designer(Some("hexagonal"), Some("systematic"));
        assert!(matches!(
            designer.build_grid(100),
            Err(SbaeError::UnsupportedShape(_))
        ));
    }

    #[test]
    fn expected_points_follows_method() {
        let systematic = test_designer(Some("square"), Some("systematic"));
        assert_eq!(systematic.expected_points(16).unwrap(), 16);

        let random = test_designer(Some("square"), Some("random"));
        assert_eq!(random.expected_points(16).unwrap(), 32);
    }
}
