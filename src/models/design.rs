//! Core types for the sampling design: AOI, CRS, grid shape, method, and
//! the point records materialized from the backend.

use crate::models::{Result, SbaeError};
use chrono::{DateTime, Utc};
use geo::{Area, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Area of interest: the boundary polygon constraining all operations.
///
/// Externally owned, read-only input. Construction fails with `NoAoi` when
/// the geometry is missing or empty so the failure surfaces before any
/// backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aoi {
    name: String,
    geometry: MultiPolygon<f64>,
}

impl Aoi {
    /// Wrap a polygon geometry, rejecting empty input.
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Result<Self> {
        if geometry.0.is_empty() || geometry.unsigned_area() == 0.0 {
            return Err(SbaeError::NoAoi);
        }
        Ok(Self {
            name: name.into(),
            geometry,
        })
    }

    /// Parse an AOI from GeoJSON text. Polygon and MultiPolygon features are
    /// collected; anything else is ignored.
    pub fn from_geojson_str(name: impl Into<String>, raw: &str) -> Result<Self> {
        let parsed: geojson::GeoJson = raw
            .parse()
            .map_err(|e| SbaeError::InvalidInput(format!("invalid GeoJSON: {e}")))?;

        let collection: geo::GeometryCollection<f64> = geojson::quick_collection(&parsed)
            .map_err(|e| SbaeError::InvalidInput(format!("unsupported GeoJSON geometry: {e}")))?;

        let mut polygons = Vec::new();
        for geometry in collection {
            match geometry {
                geo::Geometry::Polygon(p) => polygons.push(p),
                geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
                _ => {}
            }
        }

        Self::new(name, MultiPolygon(polygons))
    }

    /// Load an AOI from a GeoJSON file; the file stem becomes the AOI name.
    pub fn from_geojson_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SbaeError::io(format!("reading AOI file {path:?}"), e))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("aoi")
            .to_string();
        Self::from_geojson_str(name, &raw)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }
}

/// Coordinate reference system identifier (e.g. "EPSG:3857").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Crs(pub String);

impl Default for Crs {
    fn default() -> Self {
        Self("EPSG:3857".to_string())
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Crs {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Grid cell shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridShape {
    Square,
}

impl GridShape {
    /// Resolve a config value into a shape.
    ///
    /// `None` means the user never set one (`MissingParameter`); an unknown
    /// value is rejected outright rather than silently falling back.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Err(SbaeError::MissingParameter("shape")),
            Some("square") => Ok(Self::Square),
            Some(other) => Err(SbaeError::UnsupportedShape(other.to_string())),
        }
    }
}

impl std::fmt::Display for GridShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Square => write!(f, "square"),
        }
    }
}

/// Sampling strategy within each grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMethod {
    /// One point per cell: the cell centroid. Fully deterministic.
    Systematic,
    /// `n_points` per cell with a per-cell derived seed.
    Random,
}

impl SamplingMethod {
    /// Resolve a config value into a method (see [`GridShape::parse`]).
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Err(SbaeError::MissingParameter("method")),
            Some("systematic") => Ok(Self::Systematic),
            Some("random") => Ok(Self::Random),
            Some(other) => Err(SbaeError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl std::fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Systematic => write!(f, "systematic"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// One materialized sample point.
///
/// `plot_id` is assigned locally after pages are re-sorted by offset, so it
/// is stable across runs for identical design inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointRecord {
    /// Stable index within the design
    pub plot_id: u64,

    /// Longitude / easting in the output CRS
    pub lon: f64,

    /// Latitude / northing in the output CRS
    pub lat: f64,

    /// Index of the owning grid cell
    pub cell_index: u64,

    /// Derived per-cell seed (random method only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_offset: Option<u64>,

    /// Backend attributes passed through to export
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attributes: serde_json::Value,
}

/// Design metadata attached to exports and reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignSummary {
    pub aoi: String,
    pub shape: GridShape,
    pub method: SamplingMethod,
    pub grid_size: u32,
    pub n_points: u32,
    pub seed: u64,
    pub crs: Crs,
    pub total_points: u64,
    pub created_at: DateTime<Utc>,
}
