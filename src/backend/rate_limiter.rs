//! Request pacing for the compute backend.
//!
//! The backend rate-limits evaluate calls. The limiter spaces dispatches and
//! honors server backoff hints, but it never re-issues a failed request:
//! a 429 only delays the *next* caller, while the failed evaluation stays
//! fatal for the batch that issued it.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pacing state for a single operation kind (page, reduce, count, …).
#[derive(Debug)]
pub struct OperationState {
    /// Last dispatch time, for minimum-interval spacing
    pub last_dispatch: Option<Instant>,
    /// Backoff until this time (set by a 429 or a retry-after hint)
    pub backoff_until: Option<Instant>,
    /// Consecutive 429 responses
    pub consecutive_429s: u32,
    /// Last update time
    pub last_updated: Instant,
}

impl Default for OperationState {
    fn default() -> Self {
        Self {
            last_dispatch: None,
            backoff_until: None,
            consecutive_429s: 0,
            last_updated: Instant::now(),
        }
    }
}

impl OperationState {
    /// Time to wait before the next dispatch may proceed.
    pub fn wait_time(&self, min_interval: Duration) -> Duration {
        let now = Instant::now();
        let mut max_wait = Duration::ZERO;

        if let Some(backoff_until) = self.backoff_until.filter(|&t| t > now) {
            max_wait = max_wait.max(backoff_until - now);
        }

        if min_interval > Duration::ZERO {
            if let Some(last) = self.last_dispatch {
                let next_allowed = last + min_interval;
                if next_allowed > now {
                    max_wait = max_wait.max(next_allowed - now);
                }
            }
        }

        max_wait
    }

    /// Record a 429 response and extend backoff for subsequent dispatches.
    pub fn record_429(&mut self, retry_after_secs: Option<f64>) {
        self.consecutive_429s += 1;
        let backoff_secs = retry_after_secs
            .unwrap_or_else(|| (2.0_f64).powi(self.consecutive_429s as i32).min(60.0));
        self.backoff_until = Some(Instant::now() + Duration::from_secs_f64(backoff_secs));
        warn!(
            consecutive_429s = self.consecutive_429s,
            backoff_secs = backoff_secs,
            "Rate limited (429), pacing subsequent requests"
        );
    }

    /// Record a successful response.
    pub fn record_success(&mut self) {
        if self.consecutive_429s > 0 {
            self.consecutive_429s = 0;
            self.backoff_until = None;
        }
    }
}

/// Pacing rate limiter keyed by operation kind.
#[derive(Debug)]
pub struct RateLimiter {
    /// Per-operation pacing state
    states: DashMap<String, OperationState>,
    /// Minimum spacing between dispatches of the same operation
    min_interval: Duration,
    /// Global stats
    total_requests: AtomicU64,
    total_429s: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RateLimiter {
    /// Create a rate limiter with the given minimum dispatch interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            states: DashMap::new(),
            min_interval,
            total_requests: AtomicU64::new(0),
            total_429s: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    /// Wait if necessary before dispatching the given operation.
    ///
    /// Returns the duration waited.
    pub async fn wait_if_needed(&self, operation: &str) -> Duration {
        let wait_time = {
            let state = self.states.entry(operation.to_string()).or_default();
            state.wait_time(self.min_interval)
        };

        if wait_time > Duration::ZERO {
            debug!(
                operation = operation,
                wait_ms = wait_time.as_millis(),
                "Waiting for rate limit"
            );
            self.total_wait_ms
                .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);
            tokio::time::sleep(wait_time).await;
        }

        // Stamp the dispatch after any wait so spacing measures actual sends
        let mut state = self.states.entry(operation.to_string()).or_default();
        state.last_dispatch = Some(Instant::now());

        wait_time
    }

    /// Record a response for an operation.
    pub fn record_request(&self, operation: &str, status: u16, retry_after_secs: Option<f64>) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let mut state = self.states.entry(operation.to_string()).or_default();
        state.last_updated = Instant::now();

        if status == 429 {
            self.total_429s.fetch_add(1, Ordering::Relaxed);
            state.record_429(retry_after_secs);
        } else if status < 400 {
            state.record_success();
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> RateLimiterStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_429s = self.total_429s.load(Ordering::Relaxed);
        let total_wait_ms = self.total_wait_ms.load(Ordering::Relaxed);

        RateLimiterStats {
            total_requests,
            total_429s,
            total_wait_secs: total_wait_ms as f64 / 1000.0,
            rate_limit_ratio: if total_requests > 0 {
                total_429s as f64 / total_requests as f64
            } else {
                0.0
            },
            operations_tracked: self.states.len(),
        }
    }
}

/// Rate limiter statistics.
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub total_429s: u64,
    pub total_wait_secs: f64,
    pub rate_limit_ratio: f64,
    pub operations_tracked: usize,
}
