//! # Runtime events emitted by the engine, workers and monitor.
//!
//! [`EventKind`] groups events into:
//! - **Task events**: one crawl (starting, skipped, completed, failed, timeout, hook failure)
//! - **Lifecycle events**: pause/resume and both shutdown protocols
//! - **Worker events**: worker exit, stall and deadlock diagnostics
//! - **Subscriber events**: fan-out overflow and panics
//!
//! [`Event`] carries the optional metadata (task key, worker id, priority, elapsed time).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use crawlvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_task("https://example.com/")
//!     .with_worker(3)
//!     .with_priority(2)
//!     .with_elapsed(Duration::from_millis(40))
//!     .with_reason("connection reset");
//!
//! assert_eq!(ev.task.as_deref(), Some("https://example.com/"));
//! assert_eq!(ev.worker, Some(3));
//! assert_eq!(ev.elapsed_ms, Some(40));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventKind {
    // === Task events ===
    /// A worker is about to run the crawl hook.
    ///
    /// Sets: `task`, `worker`, `priority`.
    TaskStarting,

    /// The before-crawl hook vetoed the task; it is dropped, not requeued.
    ///
    /// Sets: `task`, `worker`, `priority`.
    TaskSkipped,

    /// The crawl hook returned a result.
    ///
    /// Sets: `task`, `worker`, `priority`, `elapsed_ms`.
    TaskCompleted,

    /// The crawl hook failed (error, panic or cancellation).
    ///
    /// Sets: `task`, `worker`, `priority`, `elapsed_ms`, `reason`.
    TaskFailed,

    /// The crawl hook exceeded `Config::timeout`.
    ///
    /// Sets: `task`, `worker`, `timeout_ms`.
    TimeoutHit,

    /// A before/after/error hook failed or panicked; the worker keeps going.
    ///
    /// Sets: `task`, `worker`, `reason`.
    HookFailed,

    /// An external message could not be converted into a task.
    ///
    /// Sets: `worker`, `reason`.
    ConversionFailed,

    // === Lifecycle events ===
    /// Engine moved from running to paused.
    Paused,

    /// Engine moved from paused to running.
    Resumed,

    /// Graceful shutdown started; queued work will still be crawled.
    DrainRequested,

    /// Forced shutdown started; queued work is discarded.
    ///
    /// Sets: `reason` (number of discarded tasks).
    CancelRequested,

    /// Every worker has exited.
    AllStopped,

    /// Forced shutdown gave up waiting and aborted the remaining workers.
    ///
    /// Sets: `reason` (ids of the aborted workers).
    GraceExceeded,

    // === Worker events ===
    /// A worker loop returned.
    ///
    /// Sets: `worker`.
    WorkerExited,

    /// A worker has not started a crawl for longer than `Config::stall_threshold`.
    ///
    /// Sets: `worker`, `elapsed_ms` (idle time), `task` (in-flight key, if any).
    WorkerStalled,

    /// The parking_lot deadlock detector found a cycle.
    ///
    /// Sets: `reason` (thread ids).
    DeadlockDetected,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason`.
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic message).
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Task key (or subscriber name for subscriber events).
    pub task: Option<Arc<str>>,
    /// Worker id.
    pub worker: Option<usize>,
    /// Task priority at the time of the event.
    pub priority: Option<i64>,
    /// Elapsed wall time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Configured crawl timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            worker: None,
            priority: None,
            elapsed_ms: None,
            timeout_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    #[inline]
    pub fn with_worker(mut self, id: usize) -> Self {
        self.worker = Some(id);
        self
    }

    #[inline]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(d.as_millis().min(u128::from(u64::MAX)) as u64);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// True for per-task events (`TaskStarting` through `HookFailed`).
    pub fn is_task_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::TaskStarting
                | EventKind::TaskSkipped
                | EventKind::TaskCompleted
                | EventKind::TaskFailed
                | EventKind::TimeoutHit
                | EventKind::HookFailed
        )
    }
}
