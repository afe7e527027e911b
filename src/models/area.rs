//! Area-by-category tables and simulation task identity.
//!
//! Grouped reductions come back from the backend as raw (value, area) pairs;
//! they are validated here, at the response boundary, before anything
//! numeric consumes them.

use crate::models::error::BackendError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical encoding of a raw category value.
///
/// Tables produced at different resolutions may carry the same class as
/// `4`, `4.0` or `4.00`; encoding through [`CategoryKey::from_raw`] makes
/// them join on one key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryKey(String);

impl CategoryKey {
    /// Canonicalize a raw numeric class value.
    pub fn from_raw(value: f64) -> Self {
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            Self(format!("{}", value as i64))
        } else {
            Self(format!("{value}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CategoryKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Area by category in hectares, ordered by canonical key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryAreas(BTreeMap<CategoryKey, f64>);

impl CategoryAreas {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Validate raw grouped-reduction pairs from the backend.
    ///
    /// Rejects non-finite values and duplicate keys; a grouped sum can
    /// produce neither, so either one means the response is corrupt.
    pub fn from_pairs(pairs: Vec<(f64, f64)>) -> Result<Self, BackendError> {
        let mut map = BTreeMap::new();
        for (raw_category, area) in pairs {
            if !raw_category.is_finite() {
                return Err(BackendError::InvalidResponse(format!(
                    "non-finite category value: {raw_category}"
                )));
            }
            if !area.is_finite() || area < 0.0 {
                return Err(BackendError::InvalidResponse(format!(
                    "invalid area {area} for category {raw_category}"
                )));
            }
            let key = CategoryKey::from_raw(raw_category);
            if map.insert(key.clone(), area).is_some() {
                return Err(BackendError::InvalidResponse(format!(
                    "duplicate category key '{key}' in grouped reduction"
                )));
            }
        }
        Ok(Self(map))
    }

    pub fn insert(&mut self, key: CategoryKey, area_ha: f64) {
        self.0.insert(key, area_ha);
    }

    /// Area for a category; absent entries are 0, not missing.
    pub fn area(&self, key: &CategoryKey) -> f64 {
        self.0.get(key).copied().unwrap_or(0.0)
    }

    /// Total area across all categories.
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &CategoryKey> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CategoryKey, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Identity of one simulation task.
///
/// A tagged variant rather than a string sentinel, so the result map can
/// never confuse a resolution with the ground-truth pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTag {
    /// Simulated pass at the given grid size in meters
    Resolution(u32),
    /// Exhaustive ground-truth pass over the full raster
    RealArea,
}

impl std::fmt::Display for TaskTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution(size) => write!(f, "{size}m"),
            Self::RealArea => write!(f, "real_area"),
        }
    }
}

/// Reference to a classified raster on the backend; opaque except for the
/// band carrying the category values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterRef {
    /// Backend asset identifier
    pub asset_id: String,

    /// Band holding the class labels
    #[serde(default = "default_band")]
    pub band: String,
}

fn default_band() -> String {
    "category".to_string()
}

impl RasterRef {
    pub fn new(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            band: default_band(),
        }
    }
}

/// Outcome of a full multi-resolution simulation: one table per resolution
/// plus the ground truth. Built once per invocation, never mutated after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Exhaustive area by category (no sampling)
    pub real: CategoryAreas,

    /// Simulated area by category, keyed by grid size in meters
    pub simulated: BTreeMap<u32, CategoryAreas>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_key_canonicalizes_integral_floats() {
        assert_eq!(CategoryKey::from_raw(4.0), CategoryKey::from_raw(4.00));
        assert_eq!(CategoryKey::from_raw(4.0).as_str(), "4");
        assert_eq!(CategoryKey::from_raw(-2.0).as_str(), "-2");
        assert_eq!(CategoryKey::from_raw(1.5).as_str(), "1.5");
    }

    #[test]
    fn from_pairs_rejects_duplicates() {
        let err = CategoryAreas::from_pairs(vec![(1.0, 10.0), (1.0, 20.0)]).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn from_pairs_rejects_negative_area() {
        let err = CategoryAreas::from_pairs(vec![(1.0, -3.0)]).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn absent_category_reads_as_zero() {
        let areas = CategoryAreas::from_pairs(vec![(1.0, 10.0)]).unwrap();
        assert_eq!(areas.area(&CategoryKey::from_raw(2.0)), 0.0);
        assert_eq!(areas.total(), 10.0);
    }

    #[test]
    fn task_tags_are_distinct_map_keys() {
        let mut map = BTreeMap::new();
        map.insert(TaskTag::Resolution(1000), 1);
        map.insert(TaskTag::Resolution(2000), 2);
        map.insert(TaskTag::RealArea, 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map[&TaskTag::RealArea], 3);
    }
}
