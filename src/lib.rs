//! sbae - Design-based accuracy assessment of classified land-cover maps.
//!
//! ## Architecture
//!
//! sbae builds a spatial sampling design over an area of interest and
//! quantifies how sample-based area estimates deviate from the exhaustively
//! computed area across a range of sampling resolutions:
//!
//! - **Design**: Grid + sampling expressions built locally, materialized by
//!   the compute backend
//! - **Fetch Pool**: Bounded concurrent paging of large point collections
//! - **Simulation Pool**: The grid→sample→reduce pipeline repeated at eight
//!   resolutions alongside one ground-truth pass
//! - **Stats**: Per-category relative error as a function of resolution
//!
//! ## Backend model
//!
//! All heavy computation happens on a remote geospatial compute service.
//! Building an expression (grid, points, density raster) is local and cheap;
//! evaluating one (counting, paging, reducing) is an explicit, blocking,
//! fallible call on the [`backend::Backend`] trait. An in-process
//! deterministic backend backs offline runs and the test suite.

pub mod backend;
pub mod design;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod stats;

// Re-exports for convenience
pub use backend::{Backend, BackendRegistry, HttpBackend, MemoryBackend, RateLimiter};
pub use design::{DesignSession, DesignState, Designer, SampleDesign};
pub use models::{Aoi, CategoryAreas, CategoryKey, Config, Result, SbaeError, TaskTag};
pub use pipeline::{DesignPipeline, SimulationPipeline};
pub use pool::{FetchPool, Simulator};
pub use stats::{error_table, ErrorTable, ZeroAreaPolicy};

/// Version of the sbae library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
