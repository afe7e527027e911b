//! Error aggregation: turns raw area tables into a per-category,
//! per-resolution relative error curve.
//!
//! All arithmetic here is local and synchronous. The estimator under test
//! is the "implied real area": each resolution's per-category proportions
//! rescaled by the total real area, which conserves mass by construction
//! (the implied areas of one resolution always sum to the real total).

use crate::models::{CategoryAreas, CategoryKey, Result, SbaeError, SimulationOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Policy for categories whose real area is zero.
///
/// The error ratio divides by the real area, so a zero-area category has no
/// defined error. The choice is explicit; silently coercing to 0 or
/// infinity is never acceptable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroAreaPolicy {
    /// Record the entry as NaN (default; keeps the table shape for plotting)
    #[default]
    Mask,
    /// Omit the entry entirely
    Skip,
    /// Fail the aggregation with `UndefinedErrorRatio`
    Fail,
}

/// Relative percent error per category per resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorTable(BTreeMap<CategoryKey, BTreeMap<u32, f64>>);

impl ErrorTable {
    /// Error for a category at a resolution, if recorded.
    pub fn get(&self, category: &CategoryKey, resolution: u32) -> Option<f64> {
        self.0.get(category)?.get(&resolution).copied()
    }

    pub fn categories(&self) -> impl Iterator<Item = &CategoryKey> {
        self.0.keys()
    }

    /// Union of resolutions across all rows.
    pub fn resolutions(&self) -> BTreeSet<u32> {
        self.0
            .values()
            .flat_map(|row| row.keys().copied())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CategoryKey, &BTreeMap<u32, f64>)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Implied real area per category: the resolution's proportions rescaled by
/// the real-area total. Absent categories count as zero area, and an empty
/// simulated table implies zero everywhere.
pub fn implied_real_areas(
    simulated: &CategoryAreas,
    categories: &BTreeSet<CategoryKey>,
    real_total: f64,
) -> BTreeMap<CategoryKey, f64> {
    let simulated_total = simulated.total();
    categories
        .iter()
        .map(|category| {
            let proportion = if simulated_total > 0.0 {
                simulated.area(category) / simulated_total
            } else {
                0.0
            };
            (category.clone(), proportion * real_total)
        })
        .collect()
}

/// Compute the error table for a simulation outcome.
///
/// For each resolution: normalize the simulated table into proportions,
/// rescale by the total real area, take the absolute difference from the
/// real area, and express it as a percentage of the real area.
pub fn error_table(outcome: &SimulationOutcome, policy: ZeroAreaPolicy) -> Result<ErrorTable> {
    // Union of category keys across every input table
    let mut categories: BTreeSet<CategoryKey> = outcome.real.keys().cloned().collect();
    for table in outcome.simulated.values() {
        categories.extend(table.keys().cloned());
    }

    let real_total = outcome.real.total();
    let mut rows: BTreeMap<CategoryKey, BTreeMap<u32, f64>> = BTreeMap::new();

    for (&resolution, simulated) in &outcome.simulated {
        let implied = implied_real_areas(simulated, &categories, real_total);

        for category in &categories {
            let real_area = outcome.real.area(category);
            let percent_error = if real_area == 0.0 {
                match policy {
                    ZeroAreaPolicy::Mask => f64::NAN,
                    ZeroAreaPolicy::Skip => continue,
                    ZeroAreaPolicy::Fail => {
                        return Err(SbaeError::UndefinedErrorRatio {
                            category: category.clone(),
                        })
                    }
                }
            } else {
                let diff = (implied[category] - real_area).abs();
                diff / real_area * 100.0
            };

            rows.entry(category.clone())
                .or_default()
                .insert(resolution, percent_error);
        }
    }

    Ok(ErrorTable(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas(pairs: &[(&str, f64)]) -> CategoryAreas {
        let mut table = CategoryAreas::new();
        for (key, area) in pairs {
            table.insert(CategoryKey::from(*key), *area);
        }
        table
    }

    fn outcome(real: CategoryAreas, simulated: Vec<(u32, CategoryAreas)>) -> SimulationOutcome {
        SimulationOutcome {
            real,
            simulated: simulated.into_iter().collect(),
        }
    }

    #[test]
    fn two_even_categories_off_by_two_hectares_err_four_percent() {
        // Real: A=50ha, B=50ha. Simulated: A=48ha, B=52ha. Expected: 4% each.
        let outcome = outcome(
            areas(&[("A", 50.0), ("B", 50.0)]),
            vec![(1000, areas(&[("A", 48.0), ("B", 52.0)]))],
        );

        let table = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();
        let a = table.get(&CategoryKey::from("A"), 1000).unwrap();
        let b = table.get(&CategoryKey::from("B"), 1000).unwrap();
        assert!((a - 4.0).abs() < 1e-9, "A error was {a}");
        assert!((b - 4.0).abs() < 1e-9, "B error was {b}");
    }

    #[test]
    fn implied_areas_conserve_the_real_total() {
        let real = areas(&[("1", 120.0), ("2", 60.0), ("3", 20.0)]);
        let simulated = areas(&[("1", 80.0), ("2", 15.0), ("3", 5.0)]);
        let categories: BTreeSet<CategoryKey> = real.keys().cloned().collect();

        let implied = implied_real_areas(&simulated, &categories, real.total());
        let implied_total: f64 = implied.values().sum();
        assert!((implied_total - real.total()).abs() < 1e-9);
    }

    #[test]
    fn categories_absent_from_a_table_count_as_zero() {
        // Category "2" never sampled at this resolution: implied 0, error 100%
        let outcome = outcome(
            areas(&[("1", 80.0), ("2", 20.0)]),
            vec![(500, areas(&[("1", 40.0)]))],
        );

        let table = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();
        let missing = table.get(&CategoryKey::from("2"), 500).unwrap();
        assert!((missing - 100.0).abs() < 1e-9);
        // And category 1 absorbs the whole implied total: |100 - 80| / 80
        let present = table.get(&CategoryKey::from("1"), 500).unwrap();
        assert!((present - 25.0).abs() < 1e-9);
    }

    #[test]
    fn category_union_spans_simulated_only_categories() {
        // Category "9" appears only in a simulated table, with real area 0
        let outcome = outcome(
            areas(&[("1", 50.0)]),
            vec![(500, areas(&[("1", 30.0), ("9", 10.0)]))],
        );

        let masked = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();
        assert!(masked
            .get(&CategoryKey::from("9"), 500)
            .unwrap()
            .is_nan());

        let skipped = error_table(&outcome, ZeroAreaPolicy::Skip).unwrap();
        assert!(skipped.get(&CategoryKey::from("9"), 500).is_none());

        let failed = error_table(&outcome, ZeroAreaPolicy::Fail);
        assert!(matches!(
            failed,
            Err(SbaeError::UndefinedErrorRatio { .. })
        ));
    }

    #[test]
    fn empty_simulated_table_reads_as_total_undercoverage() {
        let outcome = outcome(
            areas(&[("1", 50.0), ("2", 50.0)]),
            vec![(5000, CategoryAreas::new())],
        );

        let table = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();
        assert!((table.get(&CategoryKey::from("1"), 5000).unwrap() - 100.0).abs() < 1e-9);
        assert!((table.get(&CategoryKey::from("2"), 5000).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn every_resolution_gets_a_column() {
        let real = areas(&[("1", 60.0), ("2", 40.0)]);
        let outcome = outcome(
            real,
            vec![
                (100, areas(&[("1", 55.0), ("2", 45.0)])),
                (200, areas(&[("1", 70.0), ("2", 30.0)])),
            ],
        );

        let table = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();
        assert_eq!(table.resolutions().len(), 2);
        for category in ["1", "2"] {
            for resolution in [100, 200] {
                assert!(table.get(&CategoryKey::from(category), resolution).is_some());
            }
        }
    }
}
