//! Lazy server-side expressions.
//!
//! Building an expression is local, pure, and fails only on malformed input.
//! Nothing here touches the network: materialization happens when an
//! expression is handed to one of the [`Backend`](crate::backend::Backend)
//! evaluate operations, which are the only suspension points in the crate.

use crate::models::{Aoi, Crs, GridShape, Result, SamplingMethod, SbaeError};
use serde::{Deserialize, Serialize};

/// A regular tiling of the AOI at a given cell size, in the target CRS.
///
/// Cell indices 0..N-1 are assigned by the backend; their order is
/// backend-defined and not guaranteed stable across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridExpr {
    pub aoi: Aoi,
    pub shape: GridShape,
    pub cell_size: f64,
    pub crs: Crs,
}

impl GridExpr {
    pub fn build(aoi: &Aoi, shape: GridShape, cell_size: f64, crs: &Crs) -> Result<Self> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(SbaeError::InvalidInput(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        Ok(Self {
            aoi: aoi.clone(),
            shape,
            cell_size,
            crs: crs.clone(),
        })
    }
}

/// Sample points drawn over a grid under one of the two strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsExpr {
    pub grid: GridExpr,
    pub method: SamplingMethod,
    pub seed: u64,
    pub n_points: u32,
}

impl PointsExpr {
    pub fn build(grid: &GridExpr, method: SamplingMethod, seed: u64, n_points: u32) -> Result<Self> {
        if n_points == 0 {
            return Err(SbaeError::InvalidInput(
                "n_points must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            grid: grid.clone(),
            method,
            seed,
            n_points,
        })
    }

    /// Points produced per cell under this expression's strategy.
    pub fn points_per_cell(&self) -> u64 {
        match self.method {
            SamplingMethod::Systematic => 1,
            SamplingMethod::Random => u64::from(self.n_points),
        }
    }
}

/// Sample-point density rasterized at a pixel scale, masked to pixels
/// containing at least one point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityExpr {
    pub points: PointsExpr,
    pub scale: f64,
}

impl DensityExpr {
    pub fn build(points: &PointsExpr, scale: f64) -> Result<Self> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(SbaeError::InvalidInput(format!(
                "raster scale must be positive, got {scale}"
            )));
        }
        Ok(Self {
            points: points.clone(),
            scale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn test_aoi() -> Aoi {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
        ];
        Aoi::new("test", MultiPolygon(vec![poly])).unwrap()
    }

    #[test]
    fn grid_rejects_nonpositive_cell_size() {
        let aoi = test_aoi();
        assert!(GridExpr::build(&aoi, GridShape::Square, 0.0, &Crs::default()).is_err());
        assert!(GridExpr::build(&aoi, GridShape::Square, -10.0, &Crs::default()).is_err());
        assert!(GridExpr::build(&aoi, GridShape::Square, 10.0, &Crs::default()).is_ok());
    }

    #[test]
    fn points_per_cell_follows_method() {
        let aoi = test_aoi();
        let grid = GridExpr::build(&aoi, GridShape::Square, 10.0, &Crs::default()).unwrap();

        let systematic = PointsExpr::build(&grid, SamplingMethod::Systematic, 1, 5).unwrap();
        assert_eq!(systematic.points_per_cell(), 1);

        let random = PointsExpr::build(&grid, SamplingMethod::Random, 1, 5).unwrap();
        assert_eq!(random.points_per_cell(), 5);
    }

    #[test]
    fn zero_points_per_cell_is_rejected() {
        let aoi = test_aoi();
        let grid = GridExpr::build(&aoi, GridShape::Square, 10.0, &Crs::default()).unwrap();
        assert!(PointsExpr::build(&grid, SamplingMethod::Random, 1, 0).is_err());
    }
}
