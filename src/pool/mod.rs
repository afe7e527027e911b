//! Bounded worker pools.
//!
//! Two independent pools exist: the fetch pool (paging a large point
//! collection) and the simulation pool (one task per resolution variant
//! plus the ground truth). Both dispatch through a semaphore, tolerate
//! arbitrary completion order, and key their results by page offset or by
//! task tag, so no ordering assumption ever leaks into a result.

mod fetch;
mod simulate;

pub use fetch::FetchPool;
pub use simulate::{Simulator, RESOLUTION_MULTIPLIERS};

/// Receiver for pipeline progress.
///
/// Values are fractions in [0, 1], non-decreasing, terminating at exactly
/// 1.0. The core never renders progress; callers adapt this to a bar, a
/// log line, or nothing.
pub trait ProgressSink: Send + Sync {
    fn update(&self, fraction: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn update(&self, fraction: f64) {
        self(fraction)
    }
}

/// Sink that discards progress.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _fraction: f64) {}
}
