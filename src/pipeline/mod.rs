//! End-to-end pipelines orchestrating the pools.

mod design;
mod simulate;

pub use design::{DesignPipeline, DesignReport};
pub use simulate::{SimulationPipeline, SimulationReport};
