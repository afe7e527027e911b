//! File export for finalized designs and error tables.
//!
//! Output names are stamped with the design metadata so repeated runs of
//! the same design overwrite their own files and nothing else:
//! `{aoi}_{method}_{shape}_grid{size}m_crs{crs}[_seed{seed}].csv`, grouped
//! in one folder per AOI.

use crate::models::{DesignSummary, PointRecord, Result, SamplingMethod, SbaeError};
use crate::stats::ErrorTable;
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Stamped file name for a design, without directory.
pub fn design_filename(summary: &DesignSummary, ext: &str) -> String {
    let crs = summary.crs.to_string().replace(':', "");
    let mut name = format!(
        "{}_{}_{}_grid{}m_crs{}",
        summary.aoi, summary.method, summary.shape, summary.grid_size, crs
    );
    if summary.method == SamplingMethod::Random {
        name.push_str(&format!("_seed{}", summary.seed));
    }
    format!("{name}{ext}")
}

fn aoi_folder(dir: &Path, aoi: &str) -> Result<PathBuf> {
    let folder = dir.join(aoi);
    create_dir_all(&folder)
        .map_err(|e| SbaeError::io(format!("creating output folder {folder:?}"), e))?;
    Ok(folder)
}

/// Write fetched point records as CSV.
///
/// PLOTID, LAT, LON lead the columns (the order downstream survey tools
/// expect), followed by the design attributes.
pub fn write_points_csv(
    dir: &Path,
    summary: &DesignSummary,
    records: &[PointRecord],
) -> Result<PathBuf> {
    let folder = aoi_folder(dir, &summary.aoi)?;
    let path = folder.join(design_filename(summary, ".csv"));

    let file = File::create(&path).map_err(|e| SbaeError::io("creating points file", e))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "PLOTID,LAT,LON,cell_index,seed_offset")
        .map_err(|e| SbaeError::io("writing points header", e))?;

    for record in records {
        let seed_offset = record
            .seed_offset
            .map(|s| s.to_string())
            .unwrap_or_default();
        writeln!(
            writer,
            "{},{},{},{},{}",
            record.plot_id, record.lat, record.lon, record.cell_index, seed_offset
        )
        .map_err(|e| SbaeError::io("writing points row", e))?;
    }

    writer
        .flush()
        .map_err(|e| SbaeError::io("flushing points file", e))?;
    Ok(path)
}

/// Write an error table as CSV: one row per category, one column per
/// resolution. Masked (NaN) entries render as empty cells.
pub fn write_error_table_csv(dir: &Path, aoi: &str, table: &ErrorTable) -> Result<PathBuf> {
    let folder = aoi_folder(dir, aoi)?;
    let path = folder.join(format!("{aoi}_sbae_error.csv"));

    let file = File::create(&path).map_err(|e| SbaeError::io("creating error table file", e))?;
    let mut writer = BufWriter::new(file);

    let resolutions = table.resolutions();
    let header = std::iter::once("category".to_string())
        .chain(resolutions.iter().map(|r| format!("{r}m")))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{header}").map_err(|e| SbaeError::io("writing error table header", e))?;

    for (category, row) in table.iter() {
        let mut fields = vec![category.to_string()];
        for resolution in &resolutions {
            let field = match row.get(resolution) {
                Some(value) if value.is_nan() => String::new(),
                Some(value) => format!("{value:.4}"),
                None => String::new(),
            };
            fields.push(field);
        }
        writeln!(writer, "{}", fields.join(","))
            .map_err(|e| SbaeError::io("writing error table row", e))?;
    }

    writer
        .flush()
        .map_err(|e| SbaeError::io("flushing error table file", e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryAreas, CategoryKey, Crs, GridShape, SimulationOutcome};
    use crate::stats::{error_table, ZeroAreaPolicy};
    use chrono::Utc;
    use tempfile::TempDir;

    fn summary(method: SamplingMethod) -> DesignSummary {
        DesignSummary {
            aoi: "block".to_string(),
            shape: GridShape::Square,
            method,
            grid_size: 1000,
            n_points: 2,
            seed: 7,
            crs: Crs::default(),
            total_points: 4,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn filenames_stamp_the_design_metadata() {
        assert_eq!(
            design_filename(&summary(SamplingMethod::Systematic), ".csv"),
            "block_systematic_square_grid1000m_crsEPSG3857.csv"
        );
        // Random designs also stamp the seed
        assert_eq!(
            design_filename(&summary(SamplingMethod::Random), ".csv"),
            "block_random_square_grid1000m_crsEPSG3857_seed7.csv"
        );
    }

    #[test]
    fn points_csv_leads_with_plotid_lat_lon() {
        let dir = TempDir::new().unwrap();
        let records = vec![
            PointRecord {
                plot_id: 0,
                lon: 10.5,
                lat: 20.5,
                cell_index: 0,
                seed_offset: Some(7),
                attributes: serde_json::Value::Null,
            },
            PointRecord {
                plot_id: 1,
                lon: 11.5,
                lat: 21.5,
                cell_index: 1,
                seed_offset: None,
                attributes: serde_json::Value::Null,
            },
        ];

        let path =
            write_points_csv(dir.path(), &summary(SamplingMethod::Random), &records).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "PLOTID,LAT,LON,cell_index,seed_offset");
        assert_eq!(lines.next().unwrap(), "0,20.5,10.5,0,7");
        assert_eq!(lines.next().unwrap(), "1,21.5,11.5,1,");
    }

    #[test]
    fn error_table_csv_renders_masked_entries_empty() {
        let mut real = CategoryAreas::new();
        real.insert(CategoryKey::from("1"), 50.0);
        let mut simulated = CategoryAreas::new();
        simulated.insert(CategoryKey::from("1"), 30.0);
        simulated.insert(CategoryKey::from("9"), 10.0);

        let outcome = SimulationOutcome {
            real,
            simulated: [(500_u32, simulated)].into_iter().collect(),
        };
        let table = error_table(&outcome, ZeroAreaPolicy::Mask).unwrap();

        let dir = TempDir::new().unwrap();
        let path = write_error_table_csv(dir.path(), "block", &table).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "category,500m");
        // implied area for category 1: 0.75 x 50 = 37.5, so |37.5 - 50| / 50 = 25%
        assert_eq!(lines.next().unwrap(), "1,25.0000");
        // Category 9 has zero real area: masked to an empty cell
        assert_eq!(lines.next().unwrap(), "9,");
    }
}
