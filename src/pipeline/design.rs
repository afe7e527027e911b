//! Design pipeline.
//!
//! Flow: AOI + config → sample design → bounded fetch → point records → CSV.

use crate::backend::Backend;
use crate::design::{DesignSession, Designer};
use crate::export;
use crate::models::{Aoi, Config, DesignSummary, Result, SbaeError};
use crate::pool::FetchPool;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Report of one design run.
#[derive(Debug, Clone, Serialize)]
pub struct DesignReport {
    pub run_id: String,
    pub summary: DesignSummary,
    pub fetched_records: usize,
    pub output: PathBuf,
    pub runtime_secs: f64,
}

/// Builds a sample design, materializes its points, and exports them.
pub struct DesignPipeline {
    session: DesignSession,
    fetch_pool: FetchPool,
    config: Config,
}

impl DesignPipeline {
    pub fn new(config: Config, backend: Arc<dyn Backend>, aoi: Aoi) -> Self {
        let designer = Designer::new(Arc::clone(&backend), aoi, config.design.clone());
        let fetch_pool = FetchPool::from_config(backend, &config.fetch);
        Self {
            session: DesignSession::new(designer),
            fetch_pool,
            config,
        }
    }

    pub fn session(&self) -> &DesignSession {
        &self.session
    }

    /// Run the full design pipeline.
    pub async fn run(&self) -> Result<DesignReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let params = self.session.designer().params().clone();
        let aoi_name = self.session.designer().aoi().name().to_string();

        info!(
            run_id = %run_id,
            aoi = %aoi_name,
            grid_size = params.grid_size,
            workers = self.config.fetch.workers,
            "Starting design pipeline"
        );

        let design = self.session.rebuild(params.grid_size).await?;

        // Fetch progress bar rendered here, never inside the pool
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len}% {msg}")
                .map_err(|e| SbaeError::Internal(format!("progress template: {e}")))?
                .progress_chars("##-"),
        );
        bar.set_message("fetching points");

        let bar_sink = bar.clone();
        let sink = move |fraction: f64| {
            bar_sink.set_position((fraction * 100.0).round() as u64);
        };

        let records = self
            .fetch_pool
            .fetch_all(&design.points, design.total_points, &sink)
            .await?;

        bar.finish_with_message(format!("{} records", records.len()));

        let summary = DesignSummary {
            aoi: aoi_name,
            shape: self.session.designer().shape()?,
            method: self.session.designer().method()?,
            grid_size: params.grid_size,
            n_points: params.n_points,
            seed: params.seed,
            crs: crate::models::Crs(params.crs.clone()),
            total_points: design.total_points,
            created_at: Utc::now(),
        };

        let output = export::write_points_csv(&self.config.output.dir, &summary, &records)?;

        let report = DesignReport {
            run_id,
            summary,
            fetched_records: records.len(),
            output,
            runtime_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            run_id = %report.run_id,
            records = report.fetched_records,
            output = ?report.output,
            runtime_secs = format!("{:.1}", report.runtime_secs),
            "Design pipeline complete"
        );

        Ok(report)
    }
}
