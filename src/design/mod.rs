//! Sampling design: grid generation, point sampling, and lifecycle.

mod grid;
mod sample;

pub use grid::Designer;
pub use sample::{DesignSession, DesignState, SampleDesign};
