//! sbae CLI - Sample-based area estimation over a geospatial compute backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sbae::models::{Aoi, Config, RasterRef};
use sbae::{BackendRegistry, DesignPipeline, SimulationPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sbae")]
#[command(version)]
#[command(about = "Sampling designs and multi-resolution area-error simulation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Named endpoint to use instead of the default backend
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Run against the in-process backend (no network, demo raster)
    #[arg(long, global = true)]
    offline: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sampling design, fetch its points, export them as CSV
    Design {
        /// Path to the AOI GeoJSON file
        #[arg(short, long)]
        aoi: PathBuf,
    },

    /// Simulate area estimation error across resolutions
    Simulate {
        /// Path to the AOI GeoJSON file
        #[arg(short, long)]
        aoi: PathBuf,

        /// Categorical raster asset id on the backend ("demo" when offline)
        #[arg(short, long)]
        raster: String,
    },

    /// Validate configuration file and backend reachability
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# sbae configuration file

[backend]
kind = "http"                     # or "memory" for offline runs
base_url = "https://compute.sbae.dev/v1"
# api_key = "sk-..."              # or use the SBAE_API_KEY env var
timeout_secs = 300
min_request_interval_ms = 0

[design]
shape = "square"
method = "systematic"             # or "random"
grid_size = 1000                  # meters
n_points = 1                      # per cell, random method only
seed = 42
crs = "EPSG:3857"

[fetch]
workers = 4
page_cap = 5000

[simulation]
zero_area_policy = "mask"         # mask | skip | fail

[output]
dir = "output"
"#;
    println!("{example}");
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if cli.offline {
        config.backend.kind = "memory".to_string();
    }
    Ok(config)
}

fn select_backend(
    registry: &BackendRegistry,
    endpoint: Option<&str>,
) -> Result<Arc<dyn sbae::Backend>> {
    match endpoint {
        Some(name) => registry
            .get(name)
            .cloned()
            .with_context(|| format!("Endpoint '{name}' is not configured")),
        None => Ok(Arc::clone(registry.default_backend())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match &cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli)?;

            if config.backend.kind == "http" {
                config
                    .resolve_api_key()
                    .context("Failed to resolve API key")?;
            }

            let registry = BackendRegistry::from_config(&config)?;
            let (healthy, total, unhealthy) = registry.health_check_summary().await;

            info!("Configuration is valid");
            info!("  Backend kind: {}", config.backend.kind);
            info!("  Endpoints healthy: {healthy}/{total}");
            if !unhealthy.is_empty() {
                info!("  Unhealthy: {}", unhealthy.join(", "));
            }
            info!(
                "  Design: {} / {} at {}m",
                config.design.shape.as_deref().unwrap_or("<unset>"),
                config.design.method.as_deref().unwrap_or("<unset>"),
                config.design.grid_size
            );
            info!("  Fetch workers: {}", config.fetch.workers);
            return Ok(());
        }

        Commands::Design { aoi } => {
            let config = load_config(&cli)?;
            let registry = BackendRegistry::from_config(&config)?;
            let backend = select_backend(&registry, cli.endpoint.as_deref())?;

            let aoi = Aoi::from_geojson_file(aoi)?;
            let pipeline = DesignPipeline::new(config, backend, aoi);
            let report = pipeline.run().await?;

            println!("\n=== Design Complete ===");
            println!("AOI:         {}", report.summary.aoi);
            println!("Method:      {}", report.summary.method);
            println!("Grid size:   {}m", report.summary.grid_size);
            println!("Points:      {}", report.summary.total_points);
            println!("Fetched:     {}", report.fetched_records);
            println!("Runtime:     {:.1}s", report.runtime_secs);
            println!("Output:      {:?}", report.output);
        }

        Commands::Simulate { aoi, raster } => {
            let config = load_config(&cli)?;
            let registry = BackendRegistry::from_config(&config)?;
            let backend = select_backend(&registry, cli.endpoint.as_deref())?;

            let aoi = Aoi::from_geojson_file(aoi)?;
            let pipeline =
                SimulationPipeline::new(config, backend, aoi, RasterRef::new(raster.clone()));
            let (report, _table) = pipeline.run().await?;

            println!("\n=== Simulation Complete ===");
            println!("AOI:         {}", report.aoi);
            println!("Raster:      {}", report.raster);
            println!(
                "Resolutions: {}",
                report
                    .resolutions
                    .iter()
                    .map(|r| format!("{r}m"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("Categories:  {}", report.categories);
            println!("Real area:   {:.1} ha", report.real_total_ha);
            println!("Runtime:     {:.1}s", report.runtime_secs);
            println!("Output:      {:?}", report.output);
        }
    }

    Ok(())
}
