//! # Engine configuration.
//!
//! Provides [`Config`] centralized settings for the crawl engine.
//!
//! ## Sentinel values
//! - `timeout = 0s` → no per-crawl timeout
//! - `monitor_interval = 0s` → liveness monitor disabled

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Global configuration for one [`Engine`](crate::Engine).
///
/// Defines:
/// - **Pool size**: number of workers (fixed for the engine lifetime)
/// - **Wait cadence**: idle backoff, pause re-check, drain re-check
/// - **Shutdown behavior**: join rounds and grace before aborting workers
/// - **Liveness**: stall threshold and monitor period
/// - **Event system**: bus capacity
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sprinkling sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers (must be at least 1).
    pub workers: usize,

    /// Delay between polls of an empty queue.
    ///
    /// The attempt number passed to [`BackoffPolicy::next`] is the count of consecutive
    /// empty polls; it resets once a task is taken. Submissions wake idle workers early.
    pub idle_backoff: BackoffPolicy,

    /// Upper bound between pause re-checks (state changes wake workers early).
    pub pause_interval: Duration,

    /// Upper bound between queue-empty re-checks during graceful shutdown.
    pub drain_interval: Duration,

    /// Length of one join round during forced shutdown.
    ///
    /// After each round, surviving workers are logged and interrupted again.
    pub join_timeout: Duration,

    /// Total time forced shutdown waits for workers before aborting them.
    pub grace: Duration,

    /// Per-crawl timeout.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = the execute hook is cancelled and reported as `CrawlError::Timeout`
    pub timeout: Duration,

    /// Time without starting a crawl after which a worker is reported as possibly blocked.
    pub stall_threshold: Duration,

    /// Period of the liveness monitor (`0s` = disabled).
    pub monitor_interval: Duration,

    /// Capacity of the event bus ring buffer (min 1; clamped by Bus).
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the per-crawl timeout as an `Option`.
    #[inline]
    pub fn crawl_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the monitor period as an `Option` (`None` = monitor disabled).
    #[inline]
    pub fn monitor_period(&self) -> Option<Duration> {
        if self.monitor_interval == Duration::ZERO {
            None
        } else {
            Some(self.monitor_interval)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a copy with the given worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `workers = 4`
    /// - `idle_backoff = 100ms constant`
    /// - `pause_interval = 1s`, `drain_interval = 250ms`
    /// - `join_timeout = 1s`, `grace = 60s`
    /// - `timeout = 0s` (no timeout)
    /// - `stall_threshold = 5min`, `monitor_interval = 60s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 4,
            idle_backoff: BackoffPolicy::default(),
            pause_interval: Duration::from_secs(1),
            drain_interval: Duration::from_millis(250),
            join_timeout: Duration::from_secs(1),
            grace: Duration::from_secs(60),
            timeout: Duration::ZERO,
            stall_threshold: Duration::from_secs(5 * 60),
            monitor_interval: Duration::from_secs(60),
            bus_capacity: 1024,
        }
    }
}
