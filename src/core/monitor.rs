//! # Liveness monitor.
//!
//! Periodic, read-only diagnostics over the worker pool:
//!
//! ```text
//! every monitor_interval:
//!   ├─► parking_lot deadlock detector (feature "deadlock_detection")
//!   │      └─ per cycle: error! thread ids + backtraces, publish DeadlockDetected
//!   ├─► debug! summary: every worker's time since its last crawl start
//!   └─► for each worker:
//!          now - last_active > stall_threshold ?
//!             ├─ inside a crawl: error! worker, idle time, in-flight key
//!             └─ otherwise:      warn!  worker, idle time
//!             publish WorkerStalled (reason "in_crawl" | "idle")
//! ```
//!
//! Idle workers are reported too: a worker parked on an external source or stuck in a
//! pause wait looks exactly like that from the outside.
//!
//! The monitor never pauses, stops or restarts anything.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::worker::{WorkerRecord, WorkerStatus};
use crate::events::{Bus, Event, EventKind};

pub(crate) struct LivenessMonitor {
    records: Vec<Arc<WorkerRecord>>,
    threshold: Duration,
    bus: Bus,
}

impl LivenessMonitor {
    pub(crate) fn new(records: Vec<Arc<WorkerRecord>>, threshold: Duration, bus: Bus) -> Self {
        Self {
            records,
            threshold,
            bus,
        }
    }

    /// Workers whose last crawl started longer than the threshold ago, busy or not.
    pub(crate) fn stalled(&self, now: Instant) -> Vec<WorkerStatus> {
        self.records
            .iter()
            .map(|r| r.status(now))
            .filter(|s| s.idle_for > self.threshold)
            .collect()
    }

    /// One diagnostic pass.
    pub(crate) fn tick(&self) {
        check_deadlocks(&self.bus);

        let now = Instant::now();
        let summary: Vec<(usize, u64)> = self
            .records
            .iter()
            .map(|r| (r.id(), r.idle_for(now).as_millis() as u64))
            .collect();
        debug!(workers = ?summary, "liveness: (worker, ms since last crawl start)");

        for status in self.stalled(now) {
            let idle_ms = status.idle_for.as_millis() as u64;
            let mut ev = Event::new(EventKind::WorkerStalled)
                .with_worker(status.id)
                .with_elapsed(status.idle_for);
            match status.current {
                Some(key) => {
                    error!(worker = status.id, idle_ms, key = &*key, "worker possibly blocked in crawl");
                    ev = ev.with_task(key).with_reason("in_crawl");
                }
                None => {
                    warn!(worker = status.id, idle_ms, working = status.working, "worker idle past threshold");
                    ev = ev.with_reason("idle");
                }
            }
            self.bus.publish(ev);
        }
    }

    /// Ticks every `period` until `token` is cancelled.
    pub(crate) async fn run(self: Arc<Self>, period: Duration, token: CancellationToken) {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(period_ms = period.as_millis() as u64, "liveness monitor started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }
        debug!("liveness monitor stopped");
    }
}

#[cfg(feature = "deadlock_detection")]
fn check_deadlocks(bus: &Bus) {
    let cycles = parking_lot::deadlock::check_deadlock();
    for (i, threads) in cycles.iter().enumerate() {
        let ids: Vec<String> = threads.iter().map(|t| format!("{:?}", t.thread_id())).collect();
        for t in threads {
            error!(
                cycle = i,
                thread = ?t.thread_id(),
                backtrace = ?t.backtrace(),
                "deadlocked thread"
            );
        }
        bus.publish(Event::new(EventKind::DeadlockDetected).with_reason(ids.join(",")));
    }
}

#[cfg(not(feature = "deadlock_detection"))]
fn check_deadlocks(_bus: &Bus) {}
